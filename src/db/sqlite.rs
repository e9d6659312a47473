use std::path::Path;

use rusqlite::Connection;

use super::DatabaseError;

/// Open a SQLite connection to the given path and run migrations.
/// Parent directories are created on first use.
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    tracing::debug!(path = %path.display(), "Database opened");
    Ok(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA foreign_keys=ON;
         PRAGMA busy_timeout=2000;"
    )?;
    Ok(())
}

/// One schema step. Each script records its own version in `schema_version`.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "records",
    sql: include_str!("../../resources/migrations/001_initial.sql"),
}];

/// Newest schema this build knows how to read.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Apply every migration newer than the database, each in its own
/// transaction. A database written by a newer build is refused.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let applied = schema_version(conn)?;
    if applied > latest_version() {
        return Err(DatabaseError::MigrationFailed {
            version: applied,
            reason: format!("database is newer than supported v{}", latest_version()),
        });
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        tracing::info!(version = migration.version, name = migration.name, "Applying migration");
        let failed = |e: rusqlite::Error| DatabaseError::MigrationFailed {
            version: migration.version,
            reason: e.to_string(),
        };
        let tx = conn.unchecked_transaction().map_err(failed)?;
        tx.execute_batch(migration.sql).map_err(failed)?;
        tx.commit().map_err(failed)?;
    }

    Ok(())
}

/// Version recorded in `schema_version`, or 0 for a fresh file.
pub fn schema_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let tracked: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !tracked {
        return Ok(0);
    }
    let version: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}

/// User tables in the database, sorted by name.
pub fn table_names(conn: &Connection) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}
