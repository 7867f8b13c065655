//! Raw SQL operations for session groups, checkpoints and high-water marks.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use tandem_core::errors::{SessionError, TandemResult};
use tandem_core::models::{
    PipelineState, SessionCheckpoint, SessionDefinition, SessionGroup, SessionGroupState,
    SyncDirection, SyncPhase, WorkflowFrequency,
};

use super::{corrupt, now_ts, parse_ts, parse_uuid, ts};
use crate::to_storage_err;

// ── Session groups ──────────────────────────────────────────────────────────

/// Raw session group row.
pub struct SessionGroupRow {
    pub id: String,
    pub name: String,
    pub frequency: String,
    pub interval_secs: Option<i64>,
    pub sessions: String,
    pub state: String,
    pub updated_at: String,
}

const GROUP_COLUMNS: &str = "id, name, frequency, interval_secs, sessions, state, updated_at";

fn map_group_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionGroupRow> {
    Ok(SessionGroupRow {
        id: row.get(0)?,
        name: row.get(1)?,
        frequency: row.get(2)?,
        interval_secs: row.get(3)?,
        sessions: row.get(4)?,
        state: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl SessionGroupRow {
    fn into_group(self) -> TandemResult<SessionGroup> {
        let state = SessionGroupState::parse(&self.state)
            .ok_or_else(|| corrupt("session state", &self.state))?;
        let frequency: WorkflowFrequency =
            serde_json::from_value(serde_json::Value::String(self.frequency))
                .map_err(|e| to_storage_err(e.to_string()))?;
        let sessions: Vec<SessionDefinition> =
            serde_json::from_str(&self.sessions).map_err(|e| to_storage_err(e.to_string()))?;
        Ok(SessionGroup {
            id: parse_uuid(&self.id)?,
            name: self.name,
            state,
            frequency,
            interval_secs: self.interval_secs.map(|s| s.max(0) as u64),
            sessions,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

fn frequency_text(frequency: WorkflowFrequency) -> TandemResult<String> {
    match serde_json::to_value(frequency).map_err(|e| to_storage_err(e.to_string()))? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(to_storage_err(format!("unexpected frequency encoding {other}"))),
    }
}

/// Upsert a group definition, keeping any persisted state.
pub fn upsert_session_group(conn: &Connection, group: &SessionGroup) -> TandemResult<()> {
    debug!(group_id = %group.id, name = %group.name, "saving session group");
    let sessions = serde_json::to_string(&group.sessions).map_err(|e| to_storage_err(e.to_string()))?;
    conn.execute(
        "INSERT INTO session_groups (id, name, frequency, interval_secs, sessions, state, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             frequency = excluded.frequency,
             interval_secs = excluded.interval_secs,
             sessions = excluded.sessions,
             updated_at = excluded.updated_at",
        params![
            group.id.to_string(),
            group.name,
            frequency_text(group.frequency)?,
            group.interval_secs.map(|s| s as i64),
            sessions,
            group.state.as_str(),
            ts(group.updated_at),
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

pub fn get_session_group(conn: &Connection, id: Uuid) -> TandemResult<Option<SessionGroup>> {
    let sql = format!("SELECT {GROUP_COLUMNS} FROM session_groups WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], map_group_row)
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    row.map(SessionGroupRow::into_group).transpose()
}

pub fn list_session_groups(conn: &Connection) -> TandemResult<Vec<SessionGroup>> {
    let sql = format!("SELECT {GROUP_COLUMNS} FROM session_groups ORDER BY name, id");
    let mut stmt = conn.prepare(&sql).map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map([], map_group_row)
        .map_err(|e| to_storage_err(e.to_string()))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(|e| to_storage_err(e.to_string()))?.into_group()?);
    }
    Ok(out)
}

pub fn set_session_group_state(conn: &Connection, id: Uuid, state: SessionGroupState) -> TandemResult<()> {
    debug!(group_id = %id, state = %state, "persisting session group state");
    let changed = conn
        .execute(
            "UPDATE session_groups SET state = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), state.as_str(), now_ts()],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    if changed == 0 {
        return Err(SessionError::SessionGroupNotFound(id.to_string()).into());
    }
    Ok(())
}

pub fn save_pipeline_state(conn: &Connection, id: Uuid, state: PipelineState) -> TandemResult<()> {
    let changed = conn
        .execute(
            "UPDATE session_groups SET pipeline_state = ?2 WHERE id = ?1",
            params![id.to_string(), state.as_str()],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    if changed == 0 {
        return Err(SessionError::SessionGroupNotFound(id.to_string()).into());
    }
    Ok(())
}

pub fn get_pipeline_state(conn: &Connection, id: Uuid) -> TandemResult<PipelineState> {
    let state: Option<String> = conn
        .query_row(
            "SELECT pipeline_state FROM session_groups WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    match state {
        Some(s) => PipelineState::parse(&s)
            .ok_or_else(|| corrupt("pipeline state", &s)),
        None => Ok(PipelineState::Default),
    }
}

// ── Checkpoints ─────────────────────────────────────────────────────────────

pub fn save_checkpoint(conn: &Connection, checkpoint: &SessionCheckpoint) -> TandemResult<()> {
    conn.execute(
        "INSERT INTO session_checkpoints (session_id, phase, direction, last_group_id, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(session_id) DO UPDATE SET
             phase = excluded.phase,
             direction = excluded.direction,
             last_group_id = COALESCE(excluded.last_group_id, session_checkpoints.last_group_id),
             updated_at = excluded.updated_at",
        params![
            checkpoint.session_id.to_string(),
            checkpoint.phase.as_str(),
            checkpoint.direction.as_str(),
            checkpoint.last_group_id,
            ts(checkpoint.updated_at),
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

pub fn get_checkpoint(conn: &Connection, session_id: Uuid) -> TandemResult<Option<SessionCheckpoint>> {
    let row: Option<(String, String, Option<i64>, String)> = conn
        .query_row(
            "SELECT phase, direction, last_group_id, updated_at
             FROM session_checkpoints WHERE session_id = ?1",
            params![session_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    let Some((phase, direction, last_group_id, updated_at)) = row else {
        return Ok(None);
    };
    Ok(Some(SessionCheckpoint {
        session_id,
        phase: SyncPhase::parse(&phase)
            .ok_or_else(|| corrupt("phase", &phase))?,
        direction: SyncDirection::parse(&direction)
            .ok_or_else(|| corrupt("direction", &direction))?,
        last_group_id,
        updated_at: parse_ts(&updated_at)?,
    }))
}

// ── High-water marks ────────────────────────────────────────────────────────

pub fn get_high_water_mark(conn: &Connection, session_id: Uuid, source_id: Uuid) -> TandemResult<Option<String>> {
    conn.query_row(
        "SELECT value FROM high_water_marks WHERE session_id = ?1 AND source_id = ?2",
        params![session_id.to_string(), source_id.to_string()],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| to_storage_err(e.to_string()))
}

pub fn set_high_water_mark(conn: &Connection, session_id: Uuid, source_id: Uuid, value: &str) -> TandemResult<()> {
    debug!(%session_id, %source_id, value, "advancing high-water mark");
    conn.execute(
        "INSERT INTO high_water_marks (session_id, source_id, value, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(session_id, source_id) DO UPDATE SET
             value = excluded.value, updated_at = excluded.updated_at",
        params![session_id.to_string(), source_id.to_string(), value, now_ts()],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
