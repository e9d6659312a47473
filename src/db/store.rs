//! `RecordStore` backed by a single SQLite connection.

use std::path::Path;

use rusqlite::Connection;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::repository::{self, RecordStore, StoredRecord};
use super::{sqlite, DatabaseError};
use crate::models::EntityKind;

pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn: Mutex::new(conn) }
    }

    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::new(sqlite::open_database(path)?))
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::new(sqlite::open_memory_database()?))
    }
}

impl RecordStore for SqliteRecordStore {
    async fn list(&self, entity: EntityKind) -> Result<Vec<StoredRecord>, DatabaseError> {
        let conn = self.conn.lock().await;
        repository::list_records(&conn, entity)
    }

    async fn fetch(&self, entity: EntityKind, id: &str) -> Result<Option<StoredRecord>, DatabaseError> {
        let conn = self.conn.lock().await;
        repository::get_record(&conn, entity, id)
    }

    async fn find_by_owner(
        &self,
        entity: EntityKind,
        owner: &str,
    ) -> Result<Option<StoredRecord>, DatabaseError> {
        let conn = self.conn.lock().await;
        repository::find_record_by_owner(&conn, entity, owner)
    }

    async fn insert(
        &self,
        entity: EntityKind,
        owner: Option<&str>,
        data: &Map<String, Value>,
    ) -> Result<String, DatabaseError> {
        let conn = self.conn.lock().await;
        let id = repository::insert_record(&conn, entity, owner, data)?;
        tracing::info!(entity = %entity, id = %id, "Record inserted");
        Ok(id)
    }

    async fn update(
        &self,
        entity: EntityKind,
        id: &str,
        data: &Map<String, Value>,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn.lock().await;
        repository::update_record(&conn, entity, id, data)?;
        tracing::info!(entity = %entity, id = %id, "Record updated");
        Ok(())
    }
}
