use uuid::Uuid;

use crate::errors::TandemResult;
use crate::models::{
    ChangeGroupId, ConflictLink, ConflictResolutionRule, ConflictStatus, MigrationConflict,
    NewConflict, RuleStatus,
};

/// Outcome of recording a detection.
#[derive(Debug, Clone)]
pub struct RecordedConflict {
    pub conflict: MigrationConflict,
    /// True if the detection folded into an existing open conflict.
    pub deduplicated: bool,
}

/// Conflict persistence.
pub trait IConflictStore: Send + Sync {
    /// Insert the conflict, or fold it into the open conflict with the same
    /// (scope, type, scope hint). The check and the write happen in one
    /// transaction. Countable types increment `conflict_count` on a fold.
    fn record_conflict(&self, conflict: &NewConflict, countable: bool) -> TandemResult<RecordedConflict>;

    fn get_conflict(&self, id: i64) -> TandemResult<Option<MigrationConflict>>;

    /// Unresolved conflicts in a scope, oldest first.
    fn find_active_conflicts(&self, scope_id: Uuid) -> TandemResult<Vec<MigrationConflict>>;

    /// Open conflicts linked to a group.
    fn find_open_conflicts_for_group(&self, group: ChangeGroupId) -> TandemResult<Vec<MigrationConflict>>;

    /// Groups (and actions) blocked by a conflict.
    fn conflict_links(&self, conflict_id: i64) -> TandemResult<Vec<ConflictLink>>;

    fn set_conflict_status(&self, id: i64, status: ConflictStatus, rule: Option<Uuid>) -> TandemResult<()>;

    /// Increment and return the retry counter.
    fn increment_retry(&self, id: i64) -> TandemResult<u32>;

    /// Resolve every Unresolved conflict of `conflict_type` in the scope.
    /// Returns the affected ids.
    fn acknowledge_active_conflicts(&self, scope_id: Uuid, conflict_type: Uuid) -> TandemResult<Vec<i64>>;

    fn count_unresolved(&self, scope_id: Uuid) -> TandemResult<usize>;
}

/// Resolution rule persistence.
pub trait IRuleStore: Send + Sync {
    /// Persist a rule. The store assigns `sequence`; the stored rule is returned.
    fn insert_rule(&self, rule: &ConflictResolutionRule) -> TandemResult<ConflictResolutionRule>;

    fn get_rule(&self, reference_name: Uuid) -> TandemResult<Option<ConflictResolutionRule>>;

    /// Active rules for a conflict type that are global or bound to `scope_id`.
    fn find_applicable_rules(
        &self,
        conflict_type: Uuid,
        scope_id: Uuid,
    ) -> TandemResult<Vec<ConflictResolutionRule>>;

    fn set_rule_status(&self, reference_name: Uuid, status: RuleStatus) -> TandemResult<()>;

    /// All rules in insertion order; inactive ones only if requested.
    fn list_rules(&self, include_inactive: bool) -> TandemResult<Vec<ConflictResolutionRule>>;
}
