//! Repository layer: record-scoped database operations.
//!
//! Free functions over a borrowed `Connection`, plus the async
//! `RecordStore` seam the reconciler talks to.

mod record;

pub use record::*;

use serde_json::{Map, Value};

use super::DatabaseError;
use crate::models::EntityKind;

/// Persistence operations the form engine needs. Ids are assigned by the
/// store on insert and are opaque to callers.
#[allow(async_fn_in_trait)]
pub trait RecordStore {
    async fn list(&self, entity: EntityKind) -> Result<Vec<StoredRecord>, DatabaseError>;
    async fn fetch(&self, entity: EntityKind, id: &str) -> Result<Option<StoredRecord>, DatabaseError>;
    async fn find_by_owner(
        &self,
        entity: EntityKind,
        owner: &str,
    ) -> Result<Option<StoredRecord>, DatabaseError>;
    /// Returns the new id.
    async fn insert(
        &self,
        entity: EntityKind,
        owner: Option<&str>,
        data: &Map<String, Value>,
    ) -> Result<String, DatabaseError>;
    async fn update(
        &self,
        entity: EntityKind,
        id: &str,
        data: &Map<String, Value>,
    ) -> Result<(), DatabaseError>;
}
