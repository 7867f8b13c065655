//! Versioned schema migrations, tracked in `schema_version`.

mod v001_change_groups;
mod v002_conflicts_and_rules;
mod v003_session_state;

use rusqlite::{params, Connection, OptionalExtension};

use tandem_core::errors::{StorageError, TandemResult};

use crate::to_storage_err;

type MigrationFn = fn(&Connection) -> TandemResult<()>;

const MIGRATIONS: &[(u32, MigrationFn)] = &[
    (1, v001_change_groups::migrate),
    (2, v002_conflicts_and_rules::migrate),
    (3, v003_session_state::migrate),
];

/// Latest schema version.
pub const LATEST_VERSION: u32 = 3;

/// Apply every migration newer than the recorded schema version.
pub fn run_migrations(conn: &Connection) -> TandemResult<u32> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    let current = current_version(conn)?;
    for (version, migrate) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| to_storage_err(format!("migration v{version:03} begin: {e}")))?;
        migrate(&tx).map_err(|e| StorageError::MigrationFailed {
            version: *version,
            reason: e.to_string(),
        })?;
        tx.execute("INSERT INTO schema_version (version) VALUES (?1)", params![version])
            .map_err(|e| StorageError::MigrationFailed {
                version: *version,
                reason: e.to_string(),
            })?;
        tx.commit().map_err(|e| StorageError::MigrationFailed {
            version: *version,
            reason: e.to_string(),
        })?;
    }
    Ok(LATEST_VERSION.max(current))
}

/// Highest applied version, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> TandemResult<u32> {
    let version: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?
        .flatten();
    Ok(version.unwrap_or(0))
}
