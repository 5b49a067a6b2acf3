//! Schema migrations for the local mirror
//!
//! Migrations are applied in order, each in its own transaction together
//! with the version bump, so a crash never leaves a half-applied step.

use rusqlite::{Connection, OptionalExtension};

use crate::storage::StorageError;

/// One schema step: the version it produces and the SQL that gets there
struct Migration {
    version: i32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "key-value mirror table",
    // One row per (collection, owner); value is the JSON list of records
    sql: "CREATE TABLE IF NOT EXISTS mirror (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
}];

/// Latest version this build knows how to produce
fn latest_version() -> i32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Bring the schema up to date
///
/// Fails if the database was written by a newer build.
pub fn initialize_database(conn: &mut Connection) -> Result<(), StorageError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        [],
    )?;

    let current = current_version(conn)?;
    if current > latest_version() {
        return Err(StorageError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current,
            latest_version()
        )));
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)?;
        tx.execute("DELETE FROM schema_version", [])?;
        tx.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [migration.version],
        )?;
        tx.commit()?;

        tracing::info!(
            "Applied migration v{}: {}",
            migration.version,
            migration.description
        );
    }

    Ok(())
}

/// Version recorded in the database, 0 for a fresh file
fn current_version(conn: &Connection) -> Result<i32, StorageError> {
    let version = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i32>>(0)
        })
        .optional()?
        .flatten();

    Ok(version.unwrap_or(0))
}
