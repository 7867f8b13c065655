//! The handler contract each conflict type binds, and the default handler
//! for the built-in resolution actions.

use std::any::Any;

use tandem_core::constants::{MANUAL_RESOLVED_ACTION, RETRY_ACTION, SKIP_ACTION};
use tandem_core::errors::TandemResult;
use tandem_core::models::{
    ChangeAction, ChangeGroup, ConflictResolutionRule, MigrationConflict, ResolutionDecision,
};

use crate::conflict_type::ConflictTypeDescriptor;

/// What a handler may inspect while resolving.
pub struct ResolutionContext<'a> {
    pub conflict_type: &'a ConflictTypeDescriptor,
    /// The group the conflict was detected on, when it names one.
    pub change_group: Option<&'a ChangeGroup>,
    /// The conflicted action within `change_group`.
    pub action: Option<&'a ChangeAction>,
}

pub trait IConflictHandler: Send + Sync {
    /// True if this handler can apply `rule` to `conflict`.
    fn can_resolve(&self, conflict: &MigrationConflict, rule: &ConflictResolutionRule) -> bool;

    /// Apply `rule`. Errors and panics are treated as `UnknownResolutionAction`.
    fn resolve(
        &self,
        ctx: &ResolutionContext<'_>,
        conflict: &MigrationConflict,
        rule: &ConflictResolutionRule,
    ) -> TandemResult<ResolutionDecision>;
}

/// Maps the built-in actions to decisions; other actions are unknown.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleActionHandler;

impl IConflictHandler for RuleActionHandler {
    fn can_resolve(&self, _conflict: &MigrationConflict, rule: &ConflictResolutionRule) -> bool {
        [SKIP_ACTION, RETRY_ACTION, MANUAL_RESOLVED_ACTION].contains(&rule.action)
    }

    fn resolve(
        &self,
        _ctx: &ResolutionContext<'_>,
        _conflict: &MigrationConflict,
        rule: &ConflictResolutionRule,
    ) -> TandemResult<ResolutionDecision> {
        Ok(match rule.action {
            a if a == SKIP_ACTION => ResolutionDecision::SkipConflictedChangeAction,
            a if a == RETRY_ACTION => ResolutionDecision::ScheduleForRetry,
            a if a == MANUAL_RESOLVED_ACTION => ResolutionDecision::AutoResolve(Vec::new()),
            _ => ResolutionDecision::UnknownResolutionAction,
        })
    }
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
