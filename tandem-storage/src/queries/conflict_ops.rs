//! Raw SQL operations for migration conflicts and their group links.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use tandem_core::errors::{ConflictError, TandemResult};
use tandem_core::models::{ChangeGroupId, ConflictLink, ConflictStatus, MigrationConflict, NewConflict};
use tandem_core::traits::RecordedConflict;

use super::{corrupt, now_ts, parse_ts, parse_uuid};
use crate::to_storage_err;

/// Raw conflict row.
pub struct ConflictRow {
    pub id: i64,
    pub conflict_type: String,
    pub status: String,
    pub scope_id: String,
    pub source_id: String,
    pub scope_hint: String,
    pub details: String,
    pub change_group_id: Option<i64>,
    pub action_id: Option<i64>,
    pub conflict_count: u32,
    pub retry_count: u32,
    pub resolved_by_rule: Option<String>,
    pub created_at: String,
    pub resolved_at: Option<String>,
}

const CONFLICT_COLUMNS: &str = "id, conflict_type, status, scope_id, source_id, scope_hint, details, \
     change_group_id, action_id, conflict_count, retry_count, resolved_by_rule, created_at, resolved_at";

fn map_conflict_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConflictRow> {
    Ok(ConflictRow {
        id: row.get(0)?,
        conflict_type: row.get(1)?,
        status: row.get(2)?,
        scope_id: row.get(3)?,
        source_id: row.get(4)?,
        scope_hint: row.get(5)?,
        details: row.get(6)?,
        change_group_id: row.get(7)?,
        action_id: row.get(8)?,
        conflict_count: row.get(9)?,
        retry_count: row.get(10)?,
        resolved_by_rule: row.get(11)?,
        created_at: row.get(12)?,
        resolved_at: row.get(13)?,
    })
}

impl ConflictRow {
    pub fn into_conflict(self) -> TandemResult<MigrationConflict> {
        let status = ConflictStatus::parse(&self.status)
            .ok_or_else(|| corrupt("conflict status", &self.status))?;
        Ok(MigrationConflict {
            id: self.id,
            conflict_type: parse_uuid(&self.conflict_type)?,
            status,
            scope_id: parse_uuid(&self.scope_id)?,
            source_id: parse_uuid(&self.source_id)?,
            scope_hint: self.scope_hint,
            details: self.details,
            change_group_id: self.change_group_id.map(ChangeGroupId),
            action_id: self.action_id,
            conflict_count: self.conflict_count,
            retry_count: self.retry_count,
            resolved_by_rule: self.resolved_by_rule.as_deref().map(parse_uuid).transpose()?,
            created_at: parse_ts(&self.created_at)?,
            resolved_at: self.resolved_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}

fn query_conflicts(conn: &Connection, sql: &str, args: &[&dyn rusqlite::types::ToSql]) -> TandemResult<Vec<MigrationConflict>> {
    let mut stmt = conn.prepare(sql).map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(args, map_conflict_row)
        .map_err(|e| to_storage_err(e.to_string()))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(|e| to_storage_err(e.to_string()))?.into_conflict()?);
    }
    Ok(out)
}

// ── Detection ───────────────────────────────────────────────────────────────

fn insert_link(conn: &Connection, conflict_id: i64, conflict: &NewConflict) -> TandemResult<()> {
    if let Some(group) = conflict.change_group_id {
        conn.execute(
            "INSERT OR IGNORE INTO conflict_links (conflict_id, change_group_id, action_id)
             VALUES (?1, ?2, ?3)",
            params![conflict_id, group.0, conflict.action_id],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    }
    Ok(())
}

/// Insert a conflict, or fold it into the open one with the same key.
/// Runs in a single transaction.
pub fn record_conflict(conn: &Connection, conflict: &NewConflict, countable: bool) -> TandemResult<RecordedConflict> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| to_storage_err(format!("record_conflict begin: {e}")))?;

    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM migration_conflicts
             WHERE scope_id = ?1 AND conflict_type = ?2 AND scope_hint = ?3 AND status != 'resolved'",
            params![
                conflict.scope_id.to_string(),
                conflict.conflict_type.to_string(),
                conflict.scope_hint
            ],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;

    let (id, deduplicated) = match existing {
        Some(id) => {
            debug!(conflict_id = id, scope_hint = %conflict.scope_hint, "folding duplicate conflict");
            if countable {
                tx.execute(
                    "UPDATE migration_conflicts SET conflict_count = conflict_count + 1 WHERE id = ?1",
                    params![id],
                )
                .map_err(|e| to_storage_err(e.to_string()))?;
            }
            (id, true)
        }
        None => {
            debug!(conflict_type = %conflict.conflict_type, scope_hint = %conflict.scope_hint, "inserting conflict");
            tx.execute(
                "INSERT INTO migration_conflicts
                     (conflict_type, status, scope_id, source_id, scope_hint, details,
                      change_group_id, action_id, conflict_count, retry_count, created_at)
                 VALUES (?1, 'unresolved', ?2, ?3, ?4, ?5, ?6, ?7, 1, 0, ?8)",
                params![
                    conflict.conflict_type.to_string(),
                    conflict.scope_id.to_string(),
                    conflict.source_id.to_string(),
                    conflict.scope_hint,
                    conflict.details,
                    conflict.change_group_id.map(|g| g.0),
                    conflict.action_id,
                    now_ts(),
                ],
            )
            .map_err(|e| to_storage_err(e.to_string()))?;
            (tx.last_insert_rowid(), false)
        }
    };
    insert_link(&tx, id, conflict)?;

    let stored = get_conflict(&tx, id)?.ok_or(ConflictError::ConflictNotFound(id))?;
    tx.commit()
        .map_err(|e| to_storage_err(format!("record_conflict commit: {e}")))?;
    Ok(RecordedConflict {
        conflict: stored,
        deduplicated,
    })
}

// ── Lookup ──────────────────────────────────────────────────────────────────

pub fn get_conflict(conn: &Connection, id: i64) -> TandemResult<Option<MigrationConflict>> {
    let sql = format!("SELECT {CONFLICT_COLUMNS} FROM migration_conflicts WHERE id = ?1");
    Ok(query_conflicts(conn, &sql, params![id])?.into_iter().next())
}

pub fn find_active_conflicts(conn: &Connection, scope_id: Uuid) -> TandemResult<Vec<MigrationConflict>> {
    debug!(%scope_id, "listing active conflicts");
    let sql = format!(
        "SELECT {CONFLICT_COLUMNS} FROM migration_conflicts
         WHERE scope_id = ?1 AND status = 'unresolved' ORDER BY id"
    );
    query_conflicts(conn, &sql, params![scope_id.to_string()])
}

pub fn find_open_conflicts_for_group(conn: &Connection, group: ChangeGroupId) -> TandemResult<Vec<MigrationConflict>> {
    let sql = format!(
        "SELECT {CONFLICT_COLUMNS} FROM migration_conflicts
         WHERE status != 'resolved'
           AND id IN (SELECT conflict_id FROM conflict_links WHERE change_group_id = ?1)
         ORDER BY id"
    );
    query_conflicts(conn, &sql, params![group.0])
}

pub fn conflict_links(conn: &Connection, conflict_id: i64) -> TandemResult<Vec<ConflictLink>> {
    let mut stmt = conn
        .prepare(
            "SELECT change_group_id, action_id FROM conflict_links
             WHERE conflict_id = ?1 ORDER BY change_group_id, action_id",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let links = stmt
        .query_map(params![conflict_id], |row| {
            Ok(ConflictLink {
                change_group_id: ChangeGroupId(row.get(0)?),
                action_id: row.get(1)?,
            })
        })
        .map_err(|e| to_storage_err(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(links)
}

pub fn count_unresolved(conn: &Connection, scope_id: Uuid) -> TandemResult<usize> {
    let n: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM migration_conflicts WHERE scope_id = ?1 AND status = 'unresolved'",
            params![scope_id.to_string()],
            |row| row.get(0),
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(n as usize)
}

// ── Status ──────────────────────────────────────────────────────────────────

pub fn set_conflict_status(conn: &Connection, id: i64, status: ConflictStatus, rule: Option<Uuid>) -> TandemResult<()> {
    debug!(conflict_id = id, status = %status, "updating conflict status");
    let resolved_at = (status == ConflictStatus::Resolved).then(now_ts);
    let changed = conn
        .execute(
            "UPDATE migration_conflicts
             SET status = ?2, resolved_by_rule = COALESCE(?3, resolved_by_rule), resolved_at = ?4
             WHERE id = ?1",
            params![id, status.as_str(), rule.map(|r| r.to_string()), resolved_at],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    if changed == 0 {
        return Err(ConflictError::ConflictNotFound(id).into());
    }
    Ok(())
}

pub fn increment_retry(conn: &Connection, id: i64) -> TandemResult<u32> {
    conn.query_row(
        "UPDATE migration_conflicts SET retry_count = retry_count + 1 WHERE id = ?1 RETURNING retry_count",
        params![id],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| to_storage_err(e.to_string()))?
    .ok_or_else(|| ConflictError::ConflictNotFound(id).into())
}

/// Resolve every Unresolved conflict of a type within a scope.
pub fn acknowledge_active_conflicts(conn: &Connection, scope_id: Uuid, conflict_type: Uuid) -> TandemResult<Vec<i64>> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| to_storage_err(format!("acknowledge begin: {e}")))?;
    let ids = {
        let mut stmt = tx
            .prepare(
                "SELECT id FROM migration_conflicts
                 WHERE scope_id = ?1 AND conflict_type = ?2 AND status = 'unresolved'
                 ORDER BY id",
            )
            .map_err(|e| to_storage_err(e.to_string()))?;
        let ids = stmt
            .query_map(params![scope_id.to_string(), conflict_type.to_string()], |row| {
                row.get::<_, i64>(0)
            })
            .map_err(|e| to_storage_err(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| to_storage_err(e.to_string()))?;
        ids
    };
    tx.execute(
        "UPDATE migration_conflicts SET status = 'resolved', resolved_at = ?3
         WHERE scope_id = ?1 AND conflict_type = ?2 AND status = 'unresolved'",
        params![scope_id.to_string(), conflict_type.to_string(), now_ts()],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    tx.commit()
        .map_err(|e| to_storage_err(format!("acknowledge commit: {e}")))?;
    debug!(%scope_id, count = ids.len(), "acknowledged active conflicts");
    Ok(ids)
}
