/// Session group lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session group not found: {0}")]
    SessionGroupNotFound(String),

    #[error("session group {group_id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        group_id: String,
        from: String,
        to: String,
    },

    #[error("pipeline command {command} not accepted in state {state}")]
    IllegalCommand { command: String, state: String },

    #[error("session group {0} is already running")]
    AlreadyRunning(String),

    #[error("no endpoint registered for migration source {0}")]
    EndpointNotRegistered(String),

    /// An adapter error signature reached its max-occurrence limit.
    #[error("error '{signature}' occurred {occurrences} times (limit {limit}); session stopped")]
    ErrorLimitExceeded {
        signature: String,
        occurrences: u32,
        limit: u32,
    },

    #[error("session group {group_id} did not reach a checkpoint within {grace_secs}s")]
    GracePeriodExceeded { group_id: String, grace_secs: u64 },
}
