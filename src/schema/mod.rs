//! Form schemas: the rule table for each entity kind.
//!
//! One static `FormSchema` per entity. Each field declares its kind, the
//! wizard step it belongs to and its base constraints; flag groups add
//! conditional requiredness and refinements add cross-field checks. The
//! same table drives per-step and full-record validation.

#[cfg(test)]
pub(crate) mod fixtures;
mod patient;
mod profile;
pub mod validation;

pub use patient::PATIENT_SCHEMA;
pub use profile::PROFILE_SCHEMA;
pub use validation::{validate, validate_fields, FieldError, ValidatedRecord, ValidationErrors};

use chrono::NaiveDate;

use crate::models::{EntityKind, FieldKind, Record};
use crate::rules::FlagGroup;

/// Base constraint on a non-empty value. Checked in declaration order;
/// the first failure is the field's message.
#[derive(Debug, Clone, Copy)]
pub enum Constraint {
    /// At least `len` characters.
    MinLen { len: usize, message: &'static str },
    /// Exactly `len` ASCII digits.
    Digits { len: usize, message: &'static str },
    /// Member of the field's enumeration options.
    OneOf { message: &'static str },
    /// Parses as an ISO calendar date.
    Date { message: &'static str },
    Email { message: &'static str },
    /// Arbitrary single-value predicate.
    Matches {
        check: fn(&str) -> bool,
        message: &'static str,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    /// Wizard step that gates on this field.
    pub step: &'static str,
    /// Base requiredness; flag groups can add more at runtime.
    pub required: bool,
    /// Message when a required field is blank.
    pub missing: &'static str,
    pub constraints: &'static [Constraint],
}

/// Cross-field check over the whole record. Reported errors overwrite
/// base-rule errors for the same field.
#[derive(Debug, Clone, Copy)]
pub struct Refinement {
    pub name: &'static str,
    pub check: fn(&Record, &mut ValidationErrors),
}

/// Where the enrichment client writes a resolved address.
#[derive(Debug, Clone, Copy)]
pub struct AddressFields {
    pub postal_code: &'static str,
    pub street: &'static str,
    pub neighborhood: &'static str,
    pub city: &'static str,
    pub region: &'static str,
}

#[derive(Debug)]
pub struct FormSchema {
    pub entity: EntityKind,
    pub fields: &'static [FieldSpec],
    pub flag_groups: &'static [FlagGroup],
    pub refinements: &'static [Refinement],
    /// Wizard steps in order.
    pub steps: &'static [&'static str],
    pub address: AddressFields,
    /// Field shown in the record picker.
    pub display_field: &'static str,
    pub birth_date_field: Option<&'static str>,
    /// Initial flag values for a blank form.
    pub flag_defaults: &'static [(&'static str, bool)],
}

impl FormSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }

    pub fn fields_in_step<'a>(&'a self, step: &'a str) -> impl Iterator<Item = &'a FieldSpec> + 'a {
        self.fields.iter().filter(move |spec| spec.step == step)
    }

    /// Every field at its empty value, flags at their defaults.
    pub fn blank_record(&self) -> Record {
        let mut record = Record::new(self.entity);
        for spec in self.fields {
            record.set(spec.name, spec.kind.empty_value());
        }
        for (flag, value) in self.flag_defaults {
            record.set(flag, *value);
        }
        record
    }

    pub fn for_entity(entity: EntityKind) -> &'static FormSchema {
        match entity {
            EntityKind::Patient => &PATIENT_SCHEMA,
            EntityKind::Profile => &PROFILE_SCHEMA,
        }
    }
}

// ─── Shared predicates ────────────────────────────────────────────────────────

/// Two-letter federative unit code (`SP`, `rj`).
pub(crate) fn is_state_code(value: &str) -> bool {
    value.chars().count() == 2 && value.chars().all(|c| c.is_ascii_alphabetic())
}

/// Birth dates in the future are rejected. Unparseable dates are left to
/// the base `Date` constraint.
pub(crate) fn birth_date_in_past(record: &Record, field: &str, errors: &mut ValidationErrors) {
    let today = chrono::Local::now().date_naive();
    if let Ok(birth) = NaiveDate::parse_from_str(record.text(field), "%Y-%m-%d") {
        if birth > today {
            errors.set(field, "Birth date cannot be in the future");
        }
    }
}
