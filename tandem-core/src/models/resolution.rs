//! Outcomes of conflict resolution.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::change_action::NewChangeAction;
use super::conflict::ConflictStatus;

/// What a conflict handler decided for one conflict under one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionDecision {
    /// Drop the conflicted change action.
    SkipConflictedChangeAction,
    /// Resolved. Replacement actions take the conflicted action's place;
    /// an empty list keeps the original action.
    AutoResolve(Vec<NewChangeAction>),
    /// Re-run the conflicted group on the next pass.
    ScheduleForRetry,
    /// Handler could not act on the rule; treated as escalation.
    UnknownResolutionAction,
}

/// How the session reacts when a conflict is escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOrchestrationOption {
    /// Keep migrating unaffected groups.
    #[default]
    Continue,
    /// End the current trip; the next one starts normally.
    StopCurrentTrip,
    /// Pause the session group until the conflict is resolved.
    StopSession,
}

/// Manager-level outcome for a detected or re-evaluated conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOutcome {
    Skipped,
    AutoResolved { replacement_actions: usize },
    ScheduledForRetry,
    /// Escalated for manual resolution; the linked group is blocked.
    Blocked { orchestration: SyncOrchestrationOption },
}

impl ResolutionOutcome {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}

/// Result returned by conflict detection and manual resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolutionResult {
    pub conflict_id: i64,
    pub status: ConflictStatus,
    pub outcome: ResolutionOutcome,
    /// Rule that resolved the conflict, if any.
    pub rule: Option<Uuid>,
    /// True if the detection folded into an existing open conflict.
    pub deduplicated: bool,
}
