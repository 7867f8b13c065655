//! Built-in resolution actions and conflict types every engine registers.

use std::sync::Arc;

use tandem_core::constants::{
    GENERIC_CONFLICT_TYPE, MANUAL_RESOLVED_ACTION, RETRY_ACTION, SKIP_ACTION,
    UNSUPPORTED_CHANGE_ACTION_CONFLICT_TYPE,
};

use crate::conflict_type::{ConflictTypeDescriptor, ResolutionActionDescriptor};
use crate::scope::{BasicPathScopeInterpreter, GlobalScopeInterpreter};

pub fn skip_action() -> ResolutionActionDescriptor {
    ResolutionActionDescriptor::new(SKIP_ACTION, "Skip conflicted change action")
}

pub fn retry_action() -> ResolutionActionDescriptor {
    ResolutionActionDescriptor::new(RETRY_ACTION, "Retry on next pass")
}

pub fn manual_resolved_action() -> ResolutionActionDescriptor {
    ResolutionActionDescriptor::new(MANUAL_RESOLVED_ACTION, "Resolved manually")
}

pub fn default_actions() -> Vec<ResolutionActionDescriptor> {
    vec![skip_action(), retry_action(), manual_resolved_action()]
}

/// Catch-all for adapter failures. Its scope hint is a path or an error
/// message, so rules apply regardless of scope.
pub fn generic_conflict_type() -> ConflictTypeDescriptor {
    ConflictTypeDescriptor::new(
        GENERIC_CONFLICT_TYPE,
        "Generic conflict",
        Arc::new(GlobalScopeInterpreter),
    )
}

/// Raised by the migration phase for action kinds the target did not register.
pub fn unsupported_change_action_conflict_type() -> ConflictTypeDescriptor {
    ConflictTypeDescriptor::new(
        UNSUPPORTED_CHANGE_ACTION_CONFLICT_TYPE,
        "Unsupported change action",
        Arc::new(BasicPathScopeInterpreter),
    )
}

pub fn builtin_conflict_types() -> Vec<ConflictTypeDescriptor> {
    vec![generic_conflict_type(), unsupported_change_action_conflict_type()]
}
