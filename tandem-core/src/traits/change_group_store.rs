use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::TandemResult;
use crate::models::{ChangeGroup, ChangeGroupHandle, ChangeGroupId, NewChangeAction};

/// Durable ledger of change groups and their ordered actions.
///
/// Every mutation commits before returning, so a crash never loses a
/// decision the caller already acted on.
pub trait IChangeGroupStore: Send + Sync {
    // --- Creation ---

    /// Allocate a Pending group. Fails with `DuplicateGroup` if a
    /// non-terminal group with the same (source, name) exists.
    fn create_group(&self, source_id: Uuid, name: &str, owner: &str) -> TandemResult<ChangeGroupHandle>;

    /// Create a group and all of its actions in one transaction.
    fn create_group_with_actions(
        &self,
        source_id: Uuid,
        name: &str,
        owner: &str,
        actions: &[NewChangeAction],
    ) -> TandemResult<ChangeGroupHandle>;

    /// Append an action at the end of the group. Fails with
    /// `InvalidGroupState` once the group is terminal.
    fn append_action(&self, group: ChangeGroupHandle, action: &NewChangeAction) -> TandemResult<i64>;

    // --- Status transitions (monotonic) ---
    fn mark_in_progress(&self, group: ChangeGroupId) -> TandemResult<()>;
    fn mark_contains_backlog(&self, group: ChangeGroupId) -> TandemResult<()>;
    fn mark_conflicted(&self, group: ChangeGroupId) -> TandemResult<()>;
    /// Fails while any open conflict still references the group.
    fn complete(&self, group: ChangeGroupId) -> TandemResult<()>;
    fn skip(&self, group: ChangeGroupId) -> TandemResult<()>;
    /// Conflicted/Backlogged -> InProgress; clears the backlog flag and
    /// reactivates backlogged actions.
    fn unblock(&self, group: ChangeGroupId) -> TandemResult<()>;

    // --- Actions ---
    fn mark_action_backlogged(&self, action_id: i64) -> TandemResult<()>;
    fn skip_action(&self, action_id: i64) -> TandemResult<()>;
    /// Insert `replacements` at the action's position and mark the original skipped.
    fn replace_action(&self, action_id: i64, replacements: &[NewChangeAction]) -> TandemResult<()>;

    // --- Queries ---
    fn get_group(&self, group: ChangeGroupId) -> TandemResult<Option<ChangeGroup>>;
    /// Any group with this (source, name), terminal or not.
    fn find_group_by_name(&self, source_id: Uuid, name: &str) -> TandemResult<Option<ChangeGroup>>;
    /// Pending and InProgress groups in creation order.
    fn get_pending_groups(&self, source_id: Uuid, limit: usize) -> TandemResult<Vec<ChangeGroup>>;
    /// Conflicted and Backlogged groups in creation order.
    fn get_blocked_groups(&self, source_id: Uuid) -> TandemResult<Vec<ChangeGroup>>;

    // --- Maintenance ---

    /// Unblock Backlogged groups that no open conflict references.
    /// Returns the released ids.
    fn release_backlog(&self, source_id: Uuid) -> TandemResult<Vec<ChangeGroupId>>;
    /// Delete terminal, non-backlogged groups created before `older_than`.
    fn purge_completed(&self, older_than: DateTime<Utc>) -> TandemResult<usize>;
}
