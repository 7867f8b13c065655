//! Raw SQL operations for conversion history.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use tandem_core::errors::TandemResult;
use tandem_core::models::{ConversionHistoryEntry, ItemConversion};

use super::{parse_ts, parse_uuid, ts};
use crate::to_storage_err;

/// Raw conversion history row.
pub struct ConversionRow {
    pub session_id: String,
    pub source_id: String,
    pub source_change_id: String,
    pub target_source_id: String,
    pub target_change_id: String,
    pub items: String,
    pub recorded_at: String,
}

const CONVERSION_COLUMNS: &str =
    "session_id, source_id, source_change_id, target_source_id, target_change_id, items, recorded_at";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversionRow> {
    Ok(ConversionRow {
        session_id: row.get(0)?,
        source_id: row.get(1)?,
        source_change_id: row.get(2)?,
        target_source_id: row.get(3)?,
        target_change_id: row.get(4)?,
        items: row.get(5)?,
        recorded_at: row.get(6)?,
    })
}

impl ConversionRow {
    fn into_entry(self) -> TandemResult<ConversionHistoryEntry> {
        let items: Vec<ItemConversion> =
            serde_json::from_str(&self.items).map_err(|e| to_storage_err(e.to_string()))?;
        Ok(ConversionHistoryEntry {
            session_id: parse_uuid(&self.session_id)?,
            source_id: parse_uuid(&self.source_id)?,
            source_change_id: self.source_change_id,
            target_source_id: parse_uuid(&self.target_source_id)?,
            target_change_id: self.target_change_id,
            items,
            recorded_at: parse_ts(&self.recorded_at)?,
        })
    }
}

/// Record a conversion. A re-applied source change replaces its entry.
pub fn record_conversion(conn: &Connection, entry: &ConversionHistoryEntry) -> TandemResult<()> {
    debug!(
        source_change = %entry.source_change_id,
        target_change = %entry.target_change_id,
        "recording conversion"
    );
    let items = serde_json::to_string(&entry.items).map_err(|e| to_storage_err(e.to_string()))?;
    conn.execute(
        "INSERT INTO conversion_history
             (session_id, source_id, source_change_id, target_source_id, target_change_id, items, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(source_id, source_change_id) DO UPDATE SET
             target_source_id = excluded.target_source_id,
             target_change_id = excluded.target_change_id,
             items = excluded.items,
             recorded_at = excluded.recorded_at",
        params![
            entry.session_id.to_string(),
            entry.source_id.to_string(),
            entry.source_change_id,
            entry.target_source_id.to_string(),
            entry.target_change_id,
            items,
            ts(entry.recorded_at),
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

pub fn find_conversion(conn: &Connection, source_id: Uuid, source_change_id: &str) -> TandemResult<Option<ConversionHistoryEntry>> {
    let sql = format!(
        "SELECT {CONVERSION_COLUMNS} FROM conversion_history
         WHERE source_id = ?1 AND source_change_id = ?2"
    );
    let row = conn
        .query_row(&sql, params![source_id.to_string(), source_change_id], map_row)
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    row.map(ConversionRow::into_entry).transpose()
}

pub fn is_migrated_change(conn: &Connection, source_id: Uuid, change_id: &str) -> TandemResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM conversion_history
             WHERE target_source_id = ?1 AND target_change_id = ?2 LIMIT 1",
            params![source_id.to_string(), change_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(found.is_some())
}

pub fn list_conversions(conn: &Connection, session_id: Uuid) -> TandemResult<Vec<ConversionHistoryEntry>> {
    let sql = format!(
        "SELECT {CONVERSION_COLUMNS} FROM conversion_history WHERE session_id = ?1 ORDER BY id"
    );
    let mut stmt = conn.prepare(&sql).map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![session_id.to_string()], map_row)
        .map_err(|e| to_storage_err(e.to_string()))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(|e| to_storage_err(e.to_string()))?.into_entry()?);
    }
    Ok(out)
}
