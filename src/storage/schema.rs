//! Database schema and migrations.
//!
//! Migrations are plain SQL files embedded at compile time and applied in
//! version order, each inside its own transaction.

use rusqlite::Connection;

use crate::error::{Result, UpkeepError};

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("../../migrations/001_applications.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("../../migrations/002_maintenance.sql"),
    },
];

/// Latest schema version known to this build.
pub const LATEST_VERSION: i32 = 2;

/// Run schema migrations.
///
/// Returns the latest schema version applied.
///
/// # Errors
/// Returns an error if creating the migrations table, reading the schema version,
/// or applying any migration fails.
pub fn run_migrations(conn: &mut Connection) -> Result<i32> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|e| storage_error("enable foreign keys", &e))?;

    ensure_schema_migrations_table(conn)?;

    let mut current_version = get_schema_version(conn)?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            apply_migration(conn, migration)?;
            tracing::debug!(version = migration.version, "Applied migration");
            current_version = migration.version;
        }
    }

    Ok(current_version)
}

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: i32,
    sql: &'static str,
}

fn storage_error(context: &str, err: &rusqlite::Error) -> UpkeepError {
    UpkeepError::Storage(format!("{context}: {err}"))
}

fn ensure_schema_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (\
            version INTEGER PRIMARY KEY,\
            applied_at TEXT DEFAULT (datetime('now'))\
        );",
    )
    .map_err(|e| storage_error("create schema_migrations", &e))
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    let version: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .map_err(|e| storage_error("read schema version", &e))?;

    Ok(version.unwrap_or(0))
}

fn apply_migration(conn: &mut Connection, migration: &Migration) -> Result<()> {
    let tx = conn
        .transaction()
        .map_err(|e| storage_error("begin migration", &e))?;

    tx.execute_batch(migration.sql)
        .map_err(|e| storage_error(&format!("apply migration {}", migration.version), &e))?;

    tx.execute(
        "INSERT INTO schema_migrations (version) VALUES (?1)",
        [migration.version],
    )
    .map_err(|e| storage_error(&format!("record migration {}", migration.version), &e))?;

    tx.commit()
        .map_err(|e| storage_error(&format!("commit migration {}", migration.version), &e))
}
