use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::enums::EntityKind;
use super::field::FieldValue;

/// One person being entered or edited: a patient or a professional profile.
///
/// `id` is `None` until the store has assigned one. Field names are the
/// persisted column names; there is no translation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub entity: EntityKind,
    pub id: Option<String>,
    pub owner: Option<String>,
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(entity: EntityKind) -> Self {
        Self {
            entity,
            id: None,
            owner: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Text value of a field, `""` when absent or not text.
    pub fn text(&self, field: &str) -> &str {
        self.fields
            .get(field)
            .and_then(FieldValue::as_text)
            .unwrap_or("")
    }

    /// Flag value of a field, `false` when absent or not a flag.
    pub fn flag(&self, field: &str) -> bool {
        self.fields
            .get(field)
            .and_then(FieldValue::as_flag)
            .unwrap_or(false)
    }

    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) {
        self.fields.insert(field.to_string(), value.into());
    }

    /// Reset a text field to empty.
    pub fn clear(&mut self, field: &str) {
        self.fields
            .insert(field.to_string(), FieldValue::Text(String::new()));
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Picker entry for the record list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: String,
    pub name: String,
}

/// Whole years between `birth` and `today`; `None` for a future birth date.
pub fn age_in_years(birth: NaiveDate, today: NaiveDate) -> Option<u32> {
    if birth > today {
        return None;
    }
    let mut years = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    u32::try_from(years).ok()
}
