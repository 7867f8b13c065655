//! Persisted conflict resolution rules.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Active,
    /// Superseded; kept for audit.
    Deprecated,
    Deleted,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deprecated => "deprecated",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "deprecated" => Some(Self::Deprecated),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// A rule binding a conflict type and scope pattern to a resolution action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolutionRule {
    pub reference_name: Uuid,
    pub conflict_type: Uuid,
    pub action: Uuid,
    /// Pattern interpreted by the conflict type's scope interpreter.
    pub applicability_scope: String,
    /// Session scope the rule is limited to; `None` applies everywhere.
    pub scope_id: Option<Uuid>,
    pub status: RuleStatus,
    /// Named data fields required by the resolution action.
    pub data: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    /// Store insertion order; second tie-breaker after `created_at`.
    pub sequence: i64,
}

impl ConflictResolutionRule {
    pub fn is_active(&self) -> bool {
        self.status == RuleStatus::Active
    }
}

/// A rule before it is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRule {
    pub conflict_type: Uuid,
    pub action: Uuid,
    pub applicability_scope: String,
    #[serde(default)]
    pub scope_id: Option<Uuid>,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl NewRule {
    pub fn new(conflict_type: Uuid, action: Uuid, applicability_scope: impl Into<String>) -> Self {
        Self {
            conflict_type,
            action,
            applicability_scope: applicability_scope.into(),
            scope_id: None,
            data: BTreeMap::new(),
        }
    }

    pub fn in_scope(mut self, scope_id: Uuid) -> Self {
        self.scope_id = Some(scope_id);
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}
