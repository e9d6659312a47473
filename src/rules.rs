//! Conditional requiredness driven by flag fields.
//!
//! A `FlagGroup` ties a boolean field to the fields that only matter in one
//! of its states. The evaluator answers "what is mandatory right now" and
//! applies the reset side effect when a flag moves a group out of scope.

use std::collections::BTreeSet;

use crate::models::Record;
use crate::schema::FormSchema;

/// Fields that become mandatory while `flag == required_when`.
#[derive(Debug, Clone, Copy)]
pub struct FlagGroup {
    pub flag: &'static str,
    pub required_when: bool,
    pub fields: &'static [&'static str],
}

impl FlagGroup {
    /// Whether the group's fields currently apply to the record.
    pub fn applies(&self, record: &Record) -> bool {
        record.flag(self.flag) == self.required_when
    }
}

/// Exact set of fields that are mandatory for the record as it stands.
pub fn required_fields_for(record: &Record, schema: &FormSchema) -> BTreeSet<&'static str> {
    let mut required: BTreeSet<&'static str> = schema
        .fields
        .iter()
        .filter(|spec| spec.required)
        .map(|spec| spec.name)
        .collect();

    for group in schema.flag_groups.iter().filter(|g| g.applies(record)) {
        required.extend(group.fields.iter().copied());
    }

    required
}

/// Set a flag and reset every field of a group it just switched off.
///
/// Returns the cleared field names. Switching a group back on restores
/// nothing; the user has to enter the values again.
pub fn apply_flag_change(
    record: &mut Record,
    schema: &FormSchema,
    flag: &str,
    value: bool,
) -> Vec<&'static str> {
    let groups: Vec<&FlagGroup> = schema
        .flag_groups
        .iter()
        .filter(|g| g.flag == flag)
        .collect();
    let was_applying: Vec<bool> = groups.iter().map(|g| g.applies(record)).collect();

    record.set(flag, value);

    let mut cleared = Vec::new();
    for (group, was) in groups.iter().zip(was_applying) {
        if was && !group.applies(record) {
            for field in group.fields {
                record.clear(field);
                cleared.push(*field);
            }
        }
    }

    if !cleared.is_empty() {
        tracing::debug!(flag, cleared = cleared.len(), "Flag switched group off; fields reset");
    }

    cleared
}
