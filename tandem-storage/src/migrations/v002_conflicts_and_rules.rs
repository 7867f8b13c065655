//! v002: migration conflicts, conflict-to-group links, resolution rules.

use rusqlite::Connection;

use tandem_core::errors::TandemResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> TandemResult<()> {
    tracing::info!("v002: creating conflict and rule tables");

    conn.execute_batch(
        "
        -- Conflicts outlive purged groups, so no foreign key to change_groups.
        CREATE TABLE IF NOT EXISTS migration_conflicts (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            conflict_type    TEXT NOT NULL,
            status           TEXT NOT NULL DEFAULT 'unresolved',
            scope_id         TEXT NOT NULL,
            source_id        TEXT NOT NULL,
            scope_hint       TEXT NOT NULL,
            details          TEXT NOT NULL DEFAULT '',
            change_group_id  INTEGER,
            action_id        INTEGER,
            conflict_count   INTEGER NOT NULL DEFAULT 1,
            retry_count      INTEGER NOT NULL DEFAULT 0,
            resolved_by_rule TEXT,
            created_at       TEXT NOT NULL,
            resolved_at      TEXT
        );

        -- At most one open conflict per (scope, type, hint).
        CREATE UNIQUE INDEX IF NOT EXISTS idx_conflicts_open_key
            ON migration_conflicts(scope_id, conflict_type, scope_hint)
            WHERE status != 'resolved';
        CREATE INDEX IF NOT EXISTS idx_conflicts_scope_status ON migration_conflicts(scope_id, status);

        CREATE TABLE IF NOT EXISTS conflict_links (
            conflict_id     INTEGER NOT NULL,
            change_group_id INTEGER NOT NULL,
            action_id       INTEGER,
            FOREIGN KEY (conflict_id) REFERENCES migration_conflicts(id)
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_links_unique
            ON conflict_links(conflict_id, change_group_id, COALESCE(action_id, -1));
        CREATE INDEX IF NOT EXISTS idx_links_group ON conflict_links(change_group_id);

        CREATE TABLE IF NOT EXISTS resolution_rules (
            seq            INTEGER PRIMARY KEY AUTOINCREMENT,
            reference_name TEXT NOT NULL UNIQUE,
            conflict_type  TEXT NOT NULL,
            action         TEXT NOT NULL,
            scope          TEXT NOT NULL,
            scope_id       TEXT,
            status         TEXT NOT NULL DEFAULT 'active',
            data           TEXT NOT NULL DEFAULT '{}',
            created_at     TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_rules_type_status ON resolution_rules(conflict_type, status);
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    Ok(())
}
