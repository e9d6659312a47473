pub mod repository;
pub mod sqlite;
pub mod store;

pub use repository::*;
pub use sqlite::*;
pub use store::SqliteRecordStore;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("Database file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record document is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DatabaseError {
    /// Lock contention rather than a bad request; worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DatabaseError::Sqlite(e)
                if matches!(
                    e.sqlite_error_code(),
                    Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
                )
        )
    }
}
