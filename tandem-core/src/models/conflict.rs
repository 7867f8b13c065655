//! Migration conflict instances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::change_group::ChangeGroupId;

/// Conflict status. Conflicts are never deleted, only closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Unresolved,
    Resolved,
    /// Resolved with the retry action; re-detection re-runs the rules.
    ScheduledForRetry,
}

impl ConflictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unresolved => "unresolved",
            Self::Resolved => "resolved",
            Self::ScheduledForRetry => "scheduled_for_retry",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unresolved" => Some(Self::Unresolved),
            "resolved" => Some(Self::Resolved),
            "scheduled_for_retry" => Some(Self::ScheduledForRetry),
            _ => None,
        }
    }

    /// Open conflicts take part in deduplication and keep groups blocked.
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Resolved)
    }
}

impl std::fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected conflict as reported by an adapter or the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewConflict {
    pub conflict_type: Uuid,
    /// Session (or session group) the conflict belongs to.
    pub scope_id: Uuid,
    /// Migration source where the conflicting change originated.
    pub source_id: Uuid,
    /// Matched against rule scopes by the type's scope interpreter.
    pub scope_hint: String,
    pub details: String,
    pub change_group_id: Option<ChangeGroupId>,
    pub action_id: Option<i64>,
}

impl NewConflict {
    pub fn new(
        conflict_type: Uuid,
        scope_id: Uuid,
        source_id: Uuid,
        scope_hint: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            conflict_type,
            scope_id,
            source_id,
            scope_hint: scope_hint.into(),
            details: details.into(),
            change_group_id: None,
            action_id: None,
        }
    }

    /// Attach the group (and optionally the action) the conflict blocks.
    pub fn for_group(mut self, group: ChangeGroupId, action_id: Option<i64>) -> Self {
        self.change_group_id = Some(group);
        self.action_id = action_id;
        self
    }
}

/// A persisted conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationConflict {
    pub id: i64,
    pub conflict_type: Uuid,
    pub status: ConflictStatus,
    pub scope_id: Uuid,
    pub source_id: Uuid,
    pub scope_hint: String,
    pub details: String,
    /// Group and action of the first detection.
    pub change_group_id: Option<ChangeGroupId>,
    pub action_id: Option<i64>,
    /// Number of detections folded into this record (countable types).
    pub conflict_count: u32,
    pub retry_count: u32,
    pub resolved_by_rule: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// A group (and optional action) blocked by a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictLink {
    pub change_group_id: ChangeGroupId,
    pub action_id: Option<i64>,
}
