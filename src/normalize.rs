//! Input normalization and display masks.
//!
//! `normalize` turns whatever the user typed into the canonical value that is
//! validated and stored. `format` turns a canonical value back into the
//! masked text shown in the input. The pair is idempotent:
//! `normalize(format(normalize(x))) == normalize(x)` for every kind.

use chrono::NaiveDate;

use crate::models::{FieldKind, FieldValue};

pub const CPF_DIGITS: usize = 11;
pub const PHONE_DIGITS: usize = 11;
pub const POSTAL_CODE_DIGITS: usize = 8;

const CPF_MASK: &str = "###.###.###-##";
const PHONE_MASK: &str = "## #####-####";
const POSTAL_CODE_MASK: &str = "#####-###";

const ISO_DATE: &str = "%Y-%m-%d";
const DISPLAY_DATE: &str = "%d/%m/%Y";

const TRUTHY: &[&str] = &["true", "1", "sim", "s", "yes", "y", "on"];

/// Canonicalize raw input for a field of the given kind.
pub fn normalize(raw: &str, kind: FieldKind) -> FieldValue {
    match kind {
        FieldKind::Flag => FieldValue::Flag(parse_flag(raw)),
        FieldKind::Cpf | FieldKind::Phone | FieldKind::PostalCode => {
            let max = kind.max_digits().unwrap_or(usize::MAX);
            FieldValue::Text(digits_only(raw, max))
        }
        FieldKind::Date => FieldValue::Text(normalize_date(raw)),
        FieldKind::Enumeration(options) => FieldValue::Text(match_option(raw, options)),
        FieldKind::Text | FieldKind::Email => FieldValue::Text(raw.trim().to_string()),
    }
}

/// Display text for a canonical value. Never feeds back into storage.
pub fn format(value: &FieldValue, kind: FieldKind) -> String {
    let text = match value {
        FieldValue::Flag(b) => return b.to_string(),
        FieldValue::Text(s) => s.as_str(),
    };

    match kind {
        FieldKind::Cpf => apply_mask(text, CPF_MASK),
        FieldKind::Phone => apply_mask(text, PHONE_MASK),
        FieldKind::PostalCode => apply_mask(text, POSTAL_CODE_MASK),
        FieldKind::Date => NaiveDate::parse_from_str(text, ISO_DATE)
            .map(|d| d.format(DISPLAY_DATE).to_string())
            .unwrap_or_else(|_| text.to_string()),
        _ => text.to_string(),
    }
}

/// A postal code is eligible for enrichment only once it is exactly 8 digits.
pub fn is_complete_postal_code(value: &str) -> bool {
    value.len() == POSTAL_CODE_DIGITS && value.bytes().all(|b| b.is_ascii_digit())
}

/// Keep ASCII digits, at most `max` of them.
pub fn digits_only(raw: &str, max: usize) -> String {
    raw.chars().filter(char::is_ascii_digit).take(max).collect()
}

fn parse_flag(raw: &str) -> bool {
    let lower = raw.trim().to_lowercase();
    TRUTHY.iter().any(|t| *t == lower)
}

/// ISO or `DD/MM/YYYY` become ISO. Anything else is kept (trimmed) so
/// validation can report it.
fn normalize_date(raw: &str) -> String {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, ISO_DATE)
        .or_else(|_| NaiveDate::parse_from_str(trimmed, DISPLAY_DATE))
        .map(|d| d.format(ISO_DATE).to_string())
        .unwrap_or_else(|_| trimmed.to_string())
}

fn match_option(raw: &str, options: &[&str]) -> String {
    let trimmed = raw.trim();
    let lower = trimmed.to_lowercase();
    options
        .iter()
        .find(|opt| opt.to_lowercase() == lower)
        .map(|opt| opt.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Progressive mask: `#` consumes one digit; separators are only emitted
/// while digits remain, so partial input never ends in a separator.
fn apply_mask(digits: &str, mask: &str) -> String {
    let mut out = String::with_capacity(mask.len());
    let mut remaining = digits.chars().peekable();
    for slot in mask.chars() {
        if remaining.peek().is_none() {
            break;
        }
        if slot == '#' {
            if let Some(d) = remaining.next() {
                out.push(d);
            }
        } else {
            out.push(slot);
        }
    }
    // Overflow beyond the mask is appended unmasked rather than dropped.
    out.extend(remaining);
    out
}
