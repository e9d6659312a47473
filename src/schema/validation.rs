// Rule engine shared by per-step and full-record validation.
// Requiredness comes from rules::required_fields_for, so it always reflects
// the latest flag values. One message per field: a field's own constraints
// stop at the first failure, refinements run afterwards and overwrite.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

use super::{Constraint, FieldSpec, FormSchema};
use crate::models::{FieldKind, Record};
use crate::rules;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Field-keyed error set, kept in the order fields were first reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// Record `message` for `field`, replacing any earlier message.
    pub fn set(&mut self, field: &str, message: &str) {
        match self.errors.iter_mut().find(|e| e.field == field) {
            Some(existing) => existing.message = message.to_string(),
            None => self.errors.push(FieldError {
                field: field.to_string(),
                message: message.to_string(),
            }),
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.errors.iter()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().map(|e| e.field.as_str())
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.errors.retain(|e| keep(&e.field));
    }
}

/// A record that passed full validation against its schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRecord(Record);

impl ValidatedRecord {
    pub fn record(&self) -> &Record {
        &self.0
    }

    pub fn into_inner(self) -> Record {
        self.0
    }
}

/// Validate every field plus all refinements.
pub fn validate(record: &Record, schema: &FormSchema) -> Result<ValidatedRecord, ValidationErrors> {
    let errors = check(record, schema, |_| true);
    if errors.is_empty() {
        Ok(ValidatedRecord(record.clone()))
    } else {
        Err(errors)
    }
}

/// Validate only `fields`. Refinement errors on other fields are dropped.
pub fn validate_fields(
    record: &Record,
    schema: &FormSchema,
    fields: &[&str],
) -> Result<(), ValidationErrors> {
    let errors = check(record, schema, |name| fields.iter().any(|f| *f == name));
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check(record: &Record, schema: &FormSchema, include: impl Fn(&str) -> bool) -> ValidationErrors {
    let required: BTreeSet<&str> = rules::required_fields_for(record, schema);
    let mut errors = ValidationErrors::default();

    for spec in schema.fields.iter().filter(|spec| include(spec.name)) {
        if let Some(message) = check_field(spec, record, required.contains(spec.name)) {
            errors.set(spec.name, message);
        }
    }

    for refinement in schema.refinements {
        let mut found = ValidationErrors::default();
        (refinement.check)(record, &mut found);
        for error in found.iter().filter(|e| include(&e.field)) {
            errors.set(&error.field, &error.message);
        }
    }

    errors
}

fn check_field(spec: &FieldSpec, record: &Record, required: bool) -> Option<&'static str> {
    if spec.kind == FieldKind::Flag {
        return None;
    }

    let value = record.text(spec.name).trim();
    if value.is_empty() {
        return required.then_some(spec.missing);
    }

    spec.constraints
        .iter()
        .find(|c| !satisfies(c, spec.kind, value))
        .map(constraint_message)
}

fn satisfies(constraint: &Constraint, kind: FieldKind, value: &str) -> bool {
    match constraint {
        Constraint::MinLen { len, .. } => value.chars().count() >= *len,
        Constraint::Digits { len, .. } => {
            value.len() == *len && value.bytes().all(|b| b.is_ascii_digit())
        }
        Constraint::OneOf { .. } => match kind {
            FieldKind::Enumeration(options) => options.iter().any(|opt| *opt == value),
            _ => true,
        },
        Constraint::Date { .. } => NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok(),
        Constraint::Email { .. } => EMAIL.is_match(value),
        Constraint::Matches { check, .. } => check(value),
    }
}

fn constraint_message(constraint: &Constraint) -> &'static str {
    match constraint {
        Constraint::MinLen { message, .. }
        | Constraint::Digits { message, .. }
        | Constraint::OneOf { message }
        | Constraint::Date { message }
        | Constraint::Email { message }
        | Constraint::Matches { message, .. } => *message,
    }
}
