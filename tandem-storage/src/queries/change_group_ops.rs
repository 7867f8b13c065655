//! Raw SQL operations for change groups and actions. No business logic beyond
//! the status-transition guard.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use tandem_core::errors::{ChangeGroupError, TandemResult};
use tandem_core::models::{
    ChangeAction, ChangeActionKind, ChangeActionState, ChangeGroup, ChangeGroupId,
    ChangeGroupStatus, NewChangeAction,
};

use super::{corrupt, now_ts, parse_ts, parse_uuid, ts};
use crate::to_storage_err;

// ── Rows ────────────────────────────────────────────────────────────────────

/// Raw change group row.
pub struct GroupRow {
    pub id: i64,
    pub source_id: String,
    pub name: String,
    pub owner: String,
    pub status: String,
    pub contains_backlog: bool,
    pub created_at: String,
}

/// Raw change action row.
pub struct ActionRow {
    pub id: i64,
    pub seq: u32,
    pub kind: String,
    pub path: String,
    pub from_path: Option<String>,
    pub version: String,
    pub item_type: String,
    pub source_item: Option<String>,
    pub state: String,
}

const GROUP_COLUMNS: &str = "id, source_id, name, owner, status, contains_backlog, created_at";
const ACTION_COLUMNS: &str =
    "id, seq, kind, path, from_path, version, item_type, source_item, state";

fn map_group_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupRow> {
    Ok(GroupRow {
        id: row.get(0)?,
        source_id: row.get(1)?,
        name: row.get(2)?,
        owner: row.get(3)?,
        status: row.get(4)?,
        contains_backlog: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn map_action_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActionRow> {
    Ok(ActionRow {
        id: row.get(0)?,
        seq: row.get(1)?,
        kind: row.get(2)?,
        path: row.get(3)?,
        from_path: row.get(4)?,
        version: row.get(5)?,
        item_type: row.get(6)?,
        source_item: row.get(7)?,
        state: row.get(8)?,
    })
}

fn parse_status(s: &str) -> TandemResult<ChangeGroupStatus> {
    ChangeGroupStatus::parse(s).ok_or_else(|| corrupt("group status", s))
}

impl ActionRow {
    fn into_action(self) -> TandemResult<ChangeAction> {
        let state = ChangeActionState::parse(&self.state)
            .ok_or_else(|| corrupt("action state", &self.state))?;
        Ok(ChangeAction {
            id: self.id,
            sequence: self.seq,
            kind: ChangeActionKind::parse(&self.kind),
            path: self.path,
            from_path: self.from_path,
            version: self.version,
            item_type_reference_name: self.item_type,
            source_item: self.source_item,
            state,
        })
    }
}

impl GroupRow {
    fn into_group(self, actions: Vec<ChangeAction>) -> TandemResult<ChangeGroup> {
        Ok(ChangeGroup {
            id: ChangeGroupId(self.id),
            source_id: parse_uuid(&self.source_id)?,
            status: parse_status(&self.status)?,
            name: self.name,
            owner: self.owner,
            contains_backlogged_action: self.contains_backlog,
            created_at: parse_ts(&self.created_at)?,
            actions,
        })
    }
}

// ── Creation ────────────────────────────────────────────────────────────────

/// Insert a Pending group after checking no non-terminal duplicate exists.
pub fn insert_group(conn: &Connection, source_id: Uuid, name: &str, owner: &str) -> TandemResult<ChangeGroupId> {
    debug!(%source_id, name, "inserting change group");
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM change_groups
             WHERE source_id = ?1 AND name = ?2 AND status NOT IN ('completed', 'skipped')
             ORDER BY id LIMIT 1",
            params![source_id.to_string(), name],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    if let Some(existing_id) = existing {
        return Err(ChangeGroupError::DuplicateGroup {
            source_id: source_id.to_string(),
            name: name.to_string(),
            existing_id,
        }
        .into());
    }

    let now = now_ts();
    conn.execute(
        "INSERT INTO change_groups (source_id, name, owner, status, contains_backlog, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'pending', 0, ?4, ?4)",
        params![source_id.to_string(), name, owner, now],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(ChangeGroupId(conn.last_insert_rowid()))
}

/// Create a group together with its actions, all-or-nothing.
pub fn insert_group_with_actions(
    conn: &Connection,
    source_id: Uuid,
    name: &str,
    owner: &str,
    actions: &[NewChangeAction],
) -> TandemResult<ChangeGroupId> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| to_storage_err(format!("insert_group_with_actions begin: {e}")))?;
    let id = insert_group(&tx, source_id, name, owner)?;
    for (seq, action) in actions.iter().enumerate() {
        insert_action_at(&tx, id, seq as u32, action)?;
    }
    tx.commit()
        .map_err(|e| to_storage_err(format!("insert_group_with_actions commit: {e}")))?;
    Ok(id)
}

fn insert_action_at(conn: &Connection, group: ChangeGroupId, seq: u32, action: &NewChangeAction) -> TandemResult<i64> {
    conn.execute(
        "INSERT INTO change_actions (group_id, seq, kind, path, from_path, version, item_type, source_item, state)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'active')",
        params![
            group.0,
            seq,
            action.kind.as_str(),
            action.path,
            action.from_path,
            action.version,
            action.item_type_reference_name,
            action.source_item,
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(conn.last_insert_rowid())
}

/// Append an action after the group's last one.
pub fn append_action(conn: &Connection, group: ChangeGroupId, action: &NewChangeAction) -> TandemResult<i64> {
    debug!(group_id = group.0, path = %action.path, "appending change action");
    let status = get_status(conn, group)?;
    if status.is_terminal() {
        return Err(invalid_state(group, status, "append action"));
    }
    let next_seq: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(seq) + 1, 0) FROM change_actions WHERE group_id = ?1",
            params![group.0],
            |row| row.get(0),
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    insert_action_at(conn, group, next_seq, action)
}

// ── Status ──────────────────────────────────────────────────────────────────

fn invalid_state(group: ChangeGroupId, status: ChangeGroupStatus, operation: &str) -> tandem_core::TandemError {
    ChangeGroupError::InvalidGroupState {
        group_id: group.0,
        status: status.to_string(),
        operation: operation.to_string(),
    }
    .into()
}

/// Current status of a group.
pub fn get_status(conn: &Connection, group: ChangeGroupId) -> TandemResult<ChangeGroupStatus> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM change_groups WHERE id = ?1",
            params![group.0],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    match status {
        Some(s) => parse_status(&s),
        None => Err(ChangeGroupError::GroupNotFound(group.0).into()),
    }
}

/// Move a group to `next`. Re-applying the current status is a no-op; any
/// other transition must be allowed by `ChangeGroupStatus::can_transition_to`.
pub fn transition(conn: &Connection, group: ChangeGroupId, next: ChangeGroupStatus, operation: &str) -> TandemResult<()> {
    let current = get_status(conn, group)?;
    if current == next {
        return Ok(());
    }
    if !current.can_transition_to(next) {
        return Err(invalid_state(group, current, operation));
    }
    debug!(group_id = group.0, from = %current, to = %next, "change group transition");
    conn.execute(
        "UPDATE change_groups SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![group.0, next.as_str(), now_ts()],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Number of non-resolved conflicts linked to a group.
pub fn open_conflict_count(conn: &Connection, group: ChangeGroupId) -> TandemResult<usize> {
    let n: i64 = conn
        .query_row(
            "SELECT COUNT(DISTINCT c.id) FROM conflict_links l
             JOIN migration_conflicts c ON c.id = l.conflict_id
             WHERE l.change_group_id = ?1 AND c.status != 'resolved'",
            params![group.0],
            |row| row.get(0),
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(n as usize)
}

/// Completed is refused while an open conflict references the group.
pub fn complete_group(conn: &Connection, group: ChangeGroupId) -> TandemResult<()> {
    let open = open_conflict_count(conn, group)?;
    if open > 0 {
        let status = get_status(conn, group)?;
        return Err(invalid_state(
            group,
            status,
            &format!("complete with {open} open conflict(s)"),
        ));
    }
    transition(conn, group, ChangeGroupStatus::Completed, "complete")
}

/// Backlogged status plus the contains-backlog flag.
pub fn mark_contains_backlog(conn: &Connection, group: ChangeGroupId) -> TandemResult<()> {
    transition(conn, group, ChangeGroupStatus::Backlogged, "mark backlogged")?;
    conn.execute(
        "UPDATE change_groups SET contains_backlog = 1 WHERE id = ?1",
        params![group.0],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Conflicted/Backlogged -> InProgress; clears the flag and reactivates
/// backlogged actions.
pub fn unblock_group(conn: &Connection, group: ChangeGroupId) -> TandemResult<()> {
    let status = get_status(conn, group)?;
    if !status.is_blocked() {
        return Err(invalid_state(group, status, "unblock"));
    }
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| to_storage_err(format!("unblock begin: {e}")))?;
    transition(&tx, group, ChangeGroupStatus::InProgress, "unblock")?;
    tx.execute(
        "UPDATE change_groups SET contains_backlog = 0 WHERE id = ?1",
        params![group.0],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    tx.execute(
        "UPDATE change_actions SET state = 'active' WHERE group_id = ?1 AND state = 'backlogged'",
        params![group.0],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    tx.commit().map_err(|e| to_storage_err(format!("unblock commit: {e}")))?;
    Ok(())
}

// ── Actions ─────────────────────────────────────────────────────────────────

fn action_position(conn: &Connection, action_id: i64) -> TandemResult<(ChangeGroupId, u32)> {
    conn.query_row(
        "SELECT group_id, seq FROM change_actions WHERE id = ?1",
        params![action_id],
        |row| Ok((ChangeGroupId(row.get(0)?), row.get(1)?)),
    )
    .optional()
    .map_err(|e| to_storage_err(e.to_string()))?
    .ok_or_else(|| ChangeGroupError::ActionNotFound(action_id).into())
}

/// Mark an action backlogged and flag its group.
pub fn mark_action_backlogged(conn: &Connection, action_id: i64) -> TandemResult<()> {
    let (group, _) = action_position(conn, action_id)?;
    conn.execute(
        "UPDATE change_actions SET state = 'backlogged' WHERE id = ?1 AND state = 'active'",
        params![action_id],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    conn.execute(
        "UPDATE change_groups SET contains_backlog = 1, updated_at = ?2 WHERE id = ?1",
        params![group.0, now_ts()],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

pub fn skip_action(conn: &Connection, action_id: i64) -> TandemResult<()> {
    action_position(conn, action_id)?;
    conn.execute(
        "UPDATE change_actions SET state = 'skipped' WHERE id = ?1",
        params![action_id],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Insert `replacements` right after the action and mark the original skipped.
pub fn replace_action(conn: &Connection, action_id: i64, replacements: &[NewChangeAction]) -> TandemResult<()> {
    let (group, seq) = action_position(conn, action_id)?;
    let status = get_status(conn, group)?;
    if status.is_terminal() {
        return Err(invalid_state(group, status, "replace action"));
    }
    debug!(action_id, replacements = replacements.len(), "replacing change action");

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| to_storage_err(format!("replace_action begin: {e}")))?;
    let shift = replacements.len() as u32;
    if shift > 0 {
        tx.execute(
            "UPDATE change_actions SET seq = seq + ?3 WHERE group_id = ?1 AND seq > ?2",
            params![group.0, seq, shift],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    }
    for (offset, action) in replacements.iter().enumerate() {
        insert_action_at(&tx, group, seq + 1 + offset as u32, action)?;
    }
    tx.execute(
        "UPDATE change_actions SET state = 'skipped' WHERE id = ?1",
        params![action_id],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    tx.commit()
        .map_err(|e| to_storage_err(format!("replace_action commit: {e}")))?;
    Ok(())
}

// ── Queries ─────────────────────────────────────────────────────────────────

fn load_actions(conn: &Connection, group: i64) -> TandemResult<Vec<ChangeAction>> {
    let sql = format!("SELECT {ACTION_COLUMNS} FROM change_actions WHERE group_id = ?1 ORDER BY seq, id");
    let mut stmt = conn.prepare(&sql).map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![group], map_action_row)
        .map_err(|e| to_storage_err(e.to_string()))?;
    let mut actions = Vec::new();
    for row in rows {
        let row = row.map_err(|e| to_storage_err(e.to_string()))?;
        actions.push(row.into_action()?);
    }
    Ok(actions)
}

fn load_groups(conn: &Connection, where_clause: &str, args: &[&dyn rusqlite::types::ToSql]) -> TandemResult<Vec<ChangeGroup>> {
    let sql = format!("SELECT {GROUP_COLUMNS} FROM change_groups WHERE {where_clause}");
    let mut stmt = conn.prepare(&sql).map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(args, map_group_row)
        .map_err(|e| to_storage_err(e.to_string()))?;
    let mut raw = Vec::new();
    for row in rows {
        raw.push(row.map_err(|e| to_storage_err(e.to_string()))?);
    }
    let mut groups = Vec::with_capacity(raw.len());
    for row in raw {
        let actions = load_actions(conn, row.id)?;
        groups.push(row.into_group(actions)?);
    }
    Ok(groups)
}

pub fn get_group(conn: &Connection, group: ChangeGroupId) -> TandemResult<Option<ChangeGroup>> {
    debug!(group_id = group.0, "getting change group");
    Ok(load_groups(conn, "id = ?1", params![group.0])?.into_iter().next())
}

/// Most recent group with this (source, name).
pub fn find_group_by_name(conn: &Connection, source_id: Uuid, name: &str) -> TandemResult<Option<ChangeGroup>> {
    Ok(load_groups(
        conn,
        "source_id = ?1 AND name = ?2 ORDER BY id DESC LIMIT 1",
        params![source_id.to_string(), name],
    )?
    .into_iter()
    .next())
}

/// Pending and InProgress groups, oldest first.
pub fn get_pending_groups(conn: &Connection, source_id: Uuid, limit: usize) -> TandemResult<Vec<ChangeGroup>> {
    debug!(%source_id, limit, "loading pending change groups");
    load_groups(
        conn,
        "source_id = ?1 AND status IN ('pending', 'in_progress') ORDER BY id LIMIT ?2",
        params![source_id.to_string(), limit as i64],
    )
}

/// Conflicted and Backlogged groups, oldest first.
pub fn get_blocked_groups(conn: &Connection, source_id: Uuid) -> TandemResult<Vec<ChangeGroup>> {
    load_groups(
        conn,
        "source_id = ?1 AND status IN ('conflicted', 'backlogged') ORDER BY id",
        params![source_id.to_string()],
    )
}

// ── Maintenance ─────────────────────────────────────────────────────────────

/// Unblock Backlogged groups no open conflict references.
pub fn release_backlog(conn: &Connection, source_id: Uuid) -> TandemResult<Vec<ChangeGroupId>> {
    let mut stmt = conn
        .prepare(
            "SELECT g.id FROM change_groups g
             WHERE g.source_id = ?1 AND g.status = 'backlogged'
               AND NOT EXISTS (
                   SELECT 1 FROM conflict_links l
                   JOIN migration_conflicts c ON c.id = l.conflict_id
                   WHERE l.change_group_id = g.id AND c.status != 'resolved'
               )
             ORDER BY g.id",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let ids = stmt
        .query_map(params![source_id.to_string()], |row| row.get::<_, i64>(0))
        .map_err(|e| to_storage_err(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut released = Vec::with_capacity(ids.len());
    for id in ids {
        unblock_group(conn, ChangeGroupId(id))?;
        released.push(ChangeGroupId(id));
    }
    if !released.is_empty() {
        debug!(%source_id, count = released.len(), "released backlogged groups");
    }
    Ok(released)
}

/// Delete terminal, non-backlogged groups created before the cutoff.
pub fn purge_completed(conn: &Connection, older_than: DateTime<Utc>) -> TandemResult<usize> {
    let cutoff = ts(older_than);
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| to_storage_err(format!("purge begin: {e}")))?;
    tx.execute(
        "DELETE FROM conflict_links WHERE change_group_id IN (
             SELECT id FROM change_groups
             WHERE status IN ('completed', 'skipped') AND contains_backlog = 0 AND created_at < ?1
         )",
        params![cutoff],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    let purged = tx
        .execute(
            "DELETE FROM change_groups
             WHERE status IN ('completed', 'skipped') AND contains_backlog = 0 AND created_at < ?1",
            params![cutoff],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    tx.commit().map_err(|e| to_storage_err(format!("purge commit: {e}")))?;
    debug!(purged, cutoff = %cutoff, "purged completed change groups");
    Ok(purged)
}
