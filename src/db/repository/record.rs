use std::str::FromStr;

use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::EntityKind;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One row of the `records` table with its JSON document decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: String,
    pub entity: EntityKind,
    pub owner: Option<String>,
    pub data: Map<String, Value>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

fn now() -> String {
    Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string()
}

fn encode(data: &Map<String, Value>) -> Result<String, DatabaseError> {
    Ok(serde_json::to_string(data)?)
}

pub fn insert_record(
    conn: &Connection,
    entity: EntityKind,
    owner: Option<&str>,
    data: &Map<String, Value>,
) -> Result<String, DatabaseError> {
    let id = Uuid::new_v4().to_string();
    let stamp = now();
    conn.execute(
        "INSERT INTO records (id, entity, owner_id, data, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![id, entity.as_str(), owner, encode(data)?, stamp],
    )
    .map_err(|e| match e.sqlite_error_code() {
        Some(rusqlite::ErrorCode::ConstraintViolation) => DatabaseError::ConstraintViolation(
            format!("{} already exists for this owner", entity.as_str()),
        ),
        _ => DatabaseError::Sqlite(e),
    })?;
    Ok(id)
}

/// Replace the document of an existing record. The owner never changes.
pub fn update_record(
    conn: &Connection,
    entity: EntityKind,
    id: &str,
    data: &Map<String, Value>,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE records SET data = ?3, updated_at = ?4 WHERE id = ?1 AND entity = ?2",
        params![id, entity.as_str(), encode(data)?, now()],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: entity.as_str().into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn get_record(
    conn: &Connection,
    entity: EntityKind,
    id: &str,
) -> Result<Option<StoredRecord>, DatabaseError> {
    query_one(
        conn,
        "SELECT id, entity, owner_id, data, created_at, updated_at
         FROM records WHERE id = ?1 AND entity = ?2",
        id,
        entity,
    )
}

pub fn find_record_by_owner(
    conn: &Connection,
    entity: EntityKind,
    owner: &str,
) -> Result<Option<StoredRecord>, DatabaseError> {
    query_one(
        conn,
        "SELECT id, entity, owner_id, data, created_at, updated_at
         FROM records WHERE owner_id = ?1 AND entity = ?2
         ORDER BY created_at LIMIT 1",
        owner,
        entity,
    )
}

/// All records of one kind, oldest first.
pub fn list_records(conn: &Connection, entity: EntityKind) -> Result<Vec<StoredRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, entity, owner_id, data, created_at, updated_at
         FROM records WHERE entity = ?1 ORDER BY created_at, id",
    )?;
    let rows = stmt.query_map(params![entity.as_str()], read_row)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(record_from_row(row?)?);
    }
    Ok(records)
}

// ─── Row mapping ──────────────────────────────────────────────────────────────

struct RecordRow {
    id: String,
    entity: String,
    owner: Option<String>,
    data: String,
    created_at: String,
    updated_at: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        id: row.get(0)?,
        entity: row.get(1)?,
        owner: row.get(2)?,
        data: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn query_one(
    conn: &Connection,
    sql: &str,
    key: &str,
    entity: EntityKind,
) -> Result<Option<StoredRecord>, DatabaseError> {
    let result = conn.query_row(sql, params![key, entity.as_str()], read_row);
    match result {
        Ok(row) => Ok(Some(record_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn record_from_row(row: RecordRow) -> Result<StoredRecord, DatabaseError> {
    let data = match serde_json::from_str::<Value>(&row.data)? {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(DatabaseError::ConstraintViolation(format!(
                "record {} holds a non-object document ({})",
                row.id,
                json_kind(&other)
            )))
        }
    };

    Ok(StoredRecord {
        entity: EntityKind::from_str(&row.entity)?,
        owner: row.owner,
        data,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
        id: row.id,
    })
}

fn parse_timestamp(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .unwrap_or_default()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
