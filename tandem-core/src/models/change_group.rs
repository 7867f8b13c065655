//! Change groups: the unit of synchronization work.
//!
//! # Examples
//!
//! ```
//! use tandem_core::models::ChangeGroupStatus;
//!
//! assert!(ChangeGroupStatus::Pending.can_transition_to(ChangeGroupStatus::InProgress));
//! assert!(!ChangeGroupStatus::Completed.can_transition_to(ChangeGroupStatus::Pending));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::change_action::ChangeAction;

/// Store-assigned group identity. Ids increase with creation order, so
/// ordering by id is FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChangeGroupId(pub i64);

impl std::fmt::Display for ChangeGroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle returned by group creation.
pub type ChangeGroupHandle = ChangeGroupId;

/// Change group lifecycle status. Transitions are monotonic: nothing
/// returns to `Pending`, and `Completed`/`Skipped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeGroupStatus {
    Pending,
    InProgress,
    /// Holds at least one unresolved conflict.
    Conflicted,
    /// Deferred behind an earlier blocked group touching the same paths.
    Backlogged,
    Completed,
    Skipped,
}

impl ChangeGroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Conflicted => "conflicted",
            Self::Backlogged => "backlogged",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "conflicted" => Some(Self::Conflicted),
            "backlogged" => Some(Self::Backlogged),
            "completed" => Some(Self::Completed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }

    /// Conflicted or backlogged: waiting on a resolution.
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Conflicted | Self::Backlogged)
    }

    pub fn can_transition_to(&self, next: ChangeGroupStatus) -> bool {
        use ChangeGroupStatus::*;
        match (self, next) {
            (_, Pending) => false,
            (Completed | Skipped, _) => false,
            (from, to) if *from == to => false,
            (Pending, _) => true,
            (InProgress, Conflicted | Backlogged | Completed | Skipped) => true,
            (Conflicted | Backlogged, InProgress | Conflicted | Backlogged | Completed | Skipped) => {
                true
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for ChangeGroupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A batch of ordered change actions from one unit of source history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeGroup {
    pub id: ChangeGroupId,
    /// Migration source the history came from.
    pub source_id: Uuid,
    /// Source-native changeset or revision identifier.
    pub name: String,
    pub owner: String,
    pub status: ChangeGroupStatus,
    pub contains_backlogged_action: bool,
    pub created_at: DateTime<Utc>,
    /// Actions in application order.
    pub actions: Vec<ChangeAction>,
}

impl ChangeGroup {
    /// Actions still to be applied, in order.
    pub fn effective_actions(&self) -> impl Iterator<Item = &ChangeAction> {
        self.actions.iter().filter(|a| a.is_effective())
    }

    /// Every path touched by a non-skipped action.
    pub fn touched_paths(&self) -> impl Iterator<Item = &str> {
        self.effective_actions().flat_map(|a| a.touched_paths())
    }
}
