//! v001: change groups and their ordered actions.

use rusqlite::Connection;

use tandem_core::errors::TandemResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> TandemResult<()> {
    tracing::info!("v001: creating change group tables");

    conn.execute_batch(
        "
        -- AUTOINCREMENT keeps ids monotonic across purges, so id order is FIFO.
        CREATE TABLE IF NOT EXISTS change_groups (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id        TEXT NOT NULL,
            name             TEXT NOT NULL,
            owner            TEXT NOT NULL DEFAULT '',
            status           TEXT NOT NULL DEFAULT 'pending',
            contains_backlog INTEGER NOT NULL DEFAULT 0,
            created_at       TEXT NOT NULL,
            updated_at       TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_groups_source_status ON change_groups(source_id, status, id);
        CREATE INDEX IF NOT EXISTS idx_groups_source_name ON change_groups(source_id, name);

        CREATE TABLE IF NOT EXISTS change_actions (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id    INTEGER NOT NULL,
            seq         INTEGER NOT NULL,
            kind        TEXT NOT NULL,
            path        TEXT NOT NULL,
            from_path   TEXT,
            version     TEXT NOT NULL DEFAULT '',
            item_type   TEXT NOT NULL DEFAULT '',
            source_item TEXT,
            state       TEXT NOT NULL DEFAULT 'active',
            FOREIGN KEY (group_id) REFERENCES change_groups(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_actions_group_seq ON change_actions(group_id, seq);
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    Ok(())
}
