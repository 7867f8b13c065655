//! Error types for conflict registration, rules and resolution.

/// Errors specific to conflict management.
#[derive(Debug, thiserror::Error)]
pub enum ConflictError {
    /// A conflict type was re-registered with a different shape.
    #[error("conflict type {reference_name} already registered with a different shape: {reason}")]
    DuplicateRegistration {
        reference_name: String,
        reason: String,
    },

    /// No conflict type is registered under this reference name.
    #[error("unknown conflict type: {0}")]
    UnknownConflictType(String),

    /// The resolution action is not supported by the conflict type.
    #[error("resolution action {action} is not supported by conflict type {conflict_type}")]
    UnsupportedResolutionAction {
        conflict_type: String,
        action: String,
    },

    /// The rule scope is not well-formed for the type's scope interpreter.
    #[error("invalid rule scope '{scope}': {hint}")]
    InvalidScope { scope: String, hint: String },

    /// The rule is missing a data field the resolution action requires.
    #[error("resolution action {action} requires data field '{key}'")]
    MissingActionData { action: String, key: String },

    #[error("conflict not found: {0}")]
    ConflictNotFound(i64),

    #[error("resolution rule not found: {0}")]
    RuleNotFound(String),

    /// An auto-resolution produced replacement actions but no open change
    /// group is linked to the conflict to receive them.
    #[error("conflict {0} has no open change group to take replacement actions")]
    NoReplacementTarget(i64),

    /// A manual resolution was attempted on a conflict that is already closed.
    #[error("conflict {0} is already resolved")]
    ConflictAlreadyResolved(i64),
}
