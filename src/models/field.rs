use serde::{Deserialize, Serialize};

/// Semantic kind of a form field. Drives normalization, display masks,
/// load-time defaults and which constraints make sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Email,
    /// Closed set of stored spellings.
    Enumeration(&'static [&'static str]),
    /// Boolean flag; may gate other fields (see `rules::FlagGroup`).
    Flag,
    /// Calendar date, canonical `YYYY-MM-DD`.
    Date,
    /// Brazilian taxpayer id, 11 digits.
    Cpf,
    /// Area code + number, up to 11 digits.
    Phone,
    /// CEP, 8 digits.
    PostalCode,
}

impl FieldKind {
    /// Value a bound input gets when nothing is stored for it.
    pub fn empty_value(&self) -> FieldValue {
        match self {
            FieldKind::Flag => FieldValue::Flag(false),
            _ => FieldValue::Text(String::new()),
        }
    }

    /// Number of digits kept by the canonical form, for digit-only kinds.
    pub fn max_digits(&self) -> Option<usize> {
        match self {
            FieldKind::Cpf => Some(crate::normalize::CPF_DIGITS),
            FieldKind::Phone => Some(crate::normalize::PHONE_DIGITS),
            FieldKind::PostalCode => Some(crate::normalize::POSTAL_CODE_DIGITS),
            _ => None,
        }
    }
}

/// One stored field value. Serialized untagged so the persisted document
/// reads as plain JSON (`"pac_name": "Ana"`, `"pac_has_resp": true`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Text(String),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Flag(_) => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            FieldValue::Flag(b) => Some(*b),
            FieldValue::Text(_) => None,
        }
    }

    /// Empty text counts as blank; flags never do.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::Flag(_) => false,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Flag(value)
    }
}
