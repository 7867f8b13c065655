//! Raw SQL operations for conflict resolution rules.

use std::collections::BTreeMap;

use rusqlite::{params, Connection};
use tracing::debug;
use uuid::Uuid;

use tandem_core::errors::{ConflictError, TandemResult};
use tandem_core::models::{ConflictResolutionRule, RuleStatus};

use super::{corrupt, parse_ts, parse_uuid, ts};
use crate::to_storage_err;

/// Raw rule row.
pub struct RuleRow {
    pub seq: i64,
    pub reference_name: String,
    pub conflict_type: String,
    pub action: String,
    pub scope: String,
    pub scope_id: Option<String>,
    pub status: String,
    pub data: String,
    pub created_at: String,
}

const RULE_COLUMNS: &str =
    "seq, reference_name, conflict_type, action, scope, scope_id, status, data, created_at";

fn map_rule_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RuleRow> {
    Ok(RuleRow {
        seq: row.get(0)?,
        reference_name: row.get(1)?,
        conflict_type: row.get(2)?,
        action: row.get(3)?,
        scope: row.get(4)?,
        scope_id: row.get(5)?,
        status: row.get(6)?,
        data: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl RuleRow {
    pub fn into_rule(self) -> TandemResult<ConflictResolutionRule> {
        let status = RuleStatus::parse(&self.status)
            .ok_or_else(|| corrupt("rule status", &self.status))?;
        let data: BTreeMap<String, String> =
            serde_json::from_str(&self.data).map_err(|e| to_storage_err(e.to_string()))?;
        Ok(ConflictResolutionRule {
            reference_name: parse_uuid(&self.reference_name)?,
            conflict_type: parse_uuid(&self.conflict_type)?,
            action: parse_uuid(&self.action)?,
            applicability_scope: self.scope,
            scope_id: self.scope_id.as_deref().map(parse_uuid).transpose()?,
            status,
            data,
            created_at: parse_ts(&self.created_at)?,
            sequence: self.seq,
        })
    }
}

fn query_rules(conn: &Connection, sql: &str, args: &[&dyn rusqlite::types::ToSql]) -> TandemResult<Vec<ConflictResolutionRule>> {
    let mut stmt = conn.prepare(sql).map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(args, map_rule_row)
        .map_err(|e| to_storage_err(e.to_string()))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(|e| to_storage_err(e.to_string()))?.into_rule()?);
    }
    Ok(out)
}

/// Insert a rule; the row's sequence is assigned by SQLite.
pub fn insert_rule(conn: &Connection, rule: &ConflictResolutionRule) -> TandemResult<ConflictResolutionRule> {
    debug!(rule = %rule.reference_name, scope = %rule.applicability_scope, "inserting resolution rule");
    let data = serde_json::to_string(&rule.data).map_err(|e| to_storage_err(e.to_string()))?;
    conn.execute(
        "INSERT INTO resolution_rules
             (reference_name, conflict_type, action, scope, scope_id, status, data, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            rule.reference_name.to_string(),
            rule.conflict_type.to_string(),
            rule.action.to_string(),
            rule.applicability_scope,
            rule.scope_id.map(|s| s.to_string()),
            rule.status.as_str(),
            data,
            ts(rule.created_at),
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    let mut stored = rule.clone();
    stored.sequence = conn.last_insert_rowid();
    Ok(stored)
}

pub fn get_rule(conn: &Connection, reference_name: Uuid) -> TandemResult<Option<ConflictResolutionRule>> {
    let sql = format!("SELECT {RULE_COLUMNS} FROM resolution_rules WHERE reference_name = ?1");
    Ok(query_rules(conn, &sql, params![reference_name.to_string()])?.into_iter().next())
}

/// Active rules of a type that are global or bound to the scope.
pub fn find_applicable_rules(conn: &Connection, conflict_type: Uuid, scope_id: Uuid) -> TandemResult<Vec<ConflictResolutionRule>> {
    debug!(%conflict_type, %scope_id, "loading applicable rules");
    let sql = format!(
        "SELECT {RULE_COLUMNS} FROM resolution_rules
         WHERE conflict_type = ?1 AND status = 'active' AND (scope_id IS NULL OR scope_id = ?2)
         ORDER BY seq"
    );
    query_rules(conn, &sql, params![conflict_type.to_string(), scope_id.to_string()])
}

pub fn set_rule_status(conn: &Connection, reference_name: Uuid, status: RuleStatus) -> TandemResult<()> {
    let changed = conn
        .execute(
            "UPDATE resolution_rules SET status = ?2 WHERE reference_name = ?1",
            params![reference_name.to_string(), status.as_str()],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    if changed == 0 {
        return Err(ConflictError::RuleNotFound(reference_name.to_string()).into());
    }
    Ok(())
}

pub fn list_rules(conn: &Connection, include_inactive: bool) -> TandemResult<Vec<ConflictResolutionRule>> {
    let filter = if include_inactive { "" } else { "WHERE status = 'active'" };
    let sql = format!("SELECT {RULE_COLUMNS} FROM resolution_rules {filter} ORDER BY seq");
    query_rules(conn, &sql, params![])
}
