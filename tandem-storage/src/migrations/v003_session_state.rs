//! v003: session groups, pipeline state, checkpoints, high-water marks and
//! conversion history.

use rusqlite::Connection;

use tandem_core::errors::TandemResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> TandemResult<()> {
    tracing::info!("v003: creating session state tables");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS session_groups (
            id             TEXT PRIMARY KEY,
            name           TEXT NOT NULL,
            frequency      TEXT NOT NULL,
            interval_secs  INTEGER,
            sessions       TEXT NOT NULL DEFAULT '[]',
            state          TEXT NOT NULL DEFAULT 'initialized',
            pipeline_state TEXT NOT NULL DEFAULT 'default',
            updated_at     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS session_checkpoints (
            session_id    TEXT PRIMARY KEY,
            phase         TEXT NOT NULL,
            direction     TEXT NOT NULL,
            last_group_id INTEGER,
            updated_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS high_water_marks (
            session_id TEXT NOT NULL,
            source_id  TEXT NOT NULL,
            value      TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (session_id, source_id)
        );

        CREATE TABLE IF NOT EXISTS conversion_history (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id       TEXT NOT NULL,
            source_id        TEXT NOT NULL,
            source_change_id TEXT NOT NULL,
            target_source_id TEXT NOT NULL,
            target_change_id TEXT NOT NULL,
            items            TEXT NOT NULL DEFAULT '[]',
            recorded_at      TEXT NOT NULL,
            UNIQUE (source_id, source_change_id)
        );

        CREATE INDEX IF NOT EXISTS idx_conversion_target
            ON conversion_history(target_source_id, target_change_id);
        CREATE INDEX IF NOT EXISTS idx_conversion_session ON conversion_history(session_id);
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    Ok(())
}
