//! Persistence reconciler: the boundary between live records and the store.
//!
//! `save` picks insert or update from the record's identity. `hydrate` is the
//! single load-boundary function: whatever the store holds, the record that
//! comes out has every schema field set to a value of the right kind.
//!
//! There is no optimistic concurrency. A later save unconditionally
//! overwrites an earlier one (last write wins).

use serde_json::{Map, Value};

use crate::db::{DatabaseError, RecordStore, StoredRecord};
use crate::error::FormError;
use crate::models::{FieldKind, FieldValue, Record, RecordSummary};
use crate::normalize;
use crate::schema::{FormSchema, ValidatedRecord};

pub struct Reconciler<S> {
    store: S,
    schema: &'static FormSchema,
}

impl<S: RecordStore> Reconciler<S> {
    pub fn new(store: S, schema: &'static FormSchema) -> Self {
        Self { store, schema }
    }

    pub fn schema(&self) -> &'static FormSchema {
        self.schema
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Update when the record already has an id, insert otherwise.
    /// Returns the id the record is stored under.
    pub async fn save(&self, validated: &ValidatedRecord) -> Result<String, FormError> {
        let record = validated.record();
        let entity = self.schema.entity;
        let document = to_document(record, self.schema);

        match &record.id {
            Some(id) => {
                // A vanished row is a failed save, not a lookup miss.
                self.store
                    .update(entity, id, &document)
                    .await
                    .map_err(|e| match e {
                        DatabaseError::NotFound { .. } => FormError::Persistence(e.to_string()),
                        e => FormError::from(e),
                    })?;
                tracing::info!(entity = %entity, id = %id, "Record saved (update)");
                Ok(id.clone())
            }
            None => {
                let id = self
                    .store
                    .insert(entity, record.owner.as_deref(), &document)
                    .await?;
                tracing::info!(entity = %entity, id = %id, "Record saved (insert)");
                Ok(id)
            }
        }
    }

    pub async fn load(&self, id: &str) -> Result<Record, FormError> {
        let entity = self.schema.entity;
        match self.store.fetch(entity, id).await? {
            Some(stored) => Ok(hydrate(stored, self.schema)),
            None => {
                tracing::warn!(entity = %entity, id = %id, "Record not found");
                Err(FormError::NotFound(format!("{entity} {id}")))
            }
        }
    }

    /// The record owned by `owner`, if one exists.
    pub async fn load_for_owner(&self, owner: &str) -> Result<Option<Record>, FormError> {
        let stored = self.store.find_by_owner(self.schema.entity, owner).await?;
        Ok(stored.map(|s| hydrate(s, self.schema)))
    }

    /// Picker entries ordered by display name.
    pub async fn list(&self) -> Result<Vec<RecordSummary>, FormError> {
        let display = self.schema.display_field;
        let mut summaries: Vec<RecordSummary> = self
            .store
            .list(self.schema.entity)
            .await?
            .into_iter()
            .map(|stored| RecordSummary {
                name: stored
                    .data
                    .get(display)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
                id: stored.id,
            })
            .collect();

        summaries.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(summaries)
    }
}

/// Store document for a record: schema fields only, flags as JSON booleans.
pub fn to_document(record: &Record, schema: &FormSchema) -> Map<String, Value> {
    schema
        .fields
        .iter()
        .map(|spec| {
            let value = match spec.kind {
                FieldKind::Flag => Value::Bool(record.flag(spec.name)),
                _ => Value::String(record.text(spec.name).to_string()),
            };
            (spec.name.to_string(), value)
        })
        .collect()
}

/// Turn a stored document into a fully populated record.
///
/// Absent and null fields take their kind's empty value. Numbers stored in
/// text fields become text; a flag holding anything but a boolean is false.
/// Keys the schema does not know are dropped.
pub fn hydrate(stored: StoredRecord, schema: &FormSchema) -> Record {
    let mut record = Record::new(schema.entity);
    record.id = Some(stored.id);
    record.owner = stored.owner;

    for spec in schema.fields {
        let value = match (spec.kind, stored.data.get(spec.name)) {
            (FieldKind::Flag, Some(Value::Bool(flag))) => FieldValue::Flag(*flag),
            (FieldKind::Flag, _) => FieldValue::Flag(false),
            (kind, Some(Value::String(text))) => normalize::normalize(text, kind),
            (kind, Some(Value::Number(n))) => normalize::normalize(&n.to_string(), kind),
            (kind, _) => kind.empty_value(),
        };
        record.set(spec.name, value);
    }

    let dropped = stored
        .data
        .keys()
        .filter(|key| schema.field(key).is_none())
        .count();
    if dropped > 0 {
        tracing::debug!(entity = %schema.entity, dropped, "Ignored unknown stored fields");
    }

    record
}
