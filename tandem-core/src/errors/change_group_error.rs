//! Errors raised by the change-group ledger.

/// Contract violations on change groups. These are programming or data
/// integrity errors and are never retried.
#[derive(Debug, thiserror::Error)]
pub enum ChangeGroupError {
    /// A non-terminal group with the same (source, name) already exists.
    #[error("change group '{name}' from source {source_id} is already in flight (group {existing_id})")]
    DuplicateGroup {
        source_id: String,
        name: String,
        existing_id: i64,
    },

    /// The requested operation is not allowed in the group's current status.
    #[error("change group {group_id}: cannot {operation} while {status}")]
    InvalidGroupState {
        group_id: i64,
        status: String,
        operation: String,
    },

    #[error("change group not found: {0}")]
    GroupNotFound(i64),

    #[error("change action not found: {0}")]
    ActionNotFound(i64),
}
