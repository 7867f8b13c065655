//! ConflictManager: central dispatcher for detected conflicts.
//!
//! Per conflict: `Detected → AutoResolving → Resolved`, or
//! `Detected → Escalated (Unresolved, event raised) → [operator] → Resolved`.
//! Detection, deduplication and resolution of one scope run under that
//! scope's lock, so concurrent detections of the same key never race.

use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tandem_core::config::ConflictConfig;
use tandem_core::constants::GENERIC_CONFLICT_TYPE;
use tandem_core::errors::{ConflictError, TandemError, TandemResult};
use tandem_core::models::{
    ChangeGroup, ChangeGroupId, ConflictLink, ConflictResolutionResult, ConflictResolutionRule, ConflictStatus,
    MigrationConflict, NewChangeAction, NewConflict, NewRule, ResolutionDecision, ResolutionOutcome, RuleStatus,
};
use tandem_core::traits::{IChangeGroupStore, IConflictStore, IRuleStore};
use tandem_observability::events;

use crate::conflict_type::ConflictTypeDescriptor;
use crate::events::ConflictUnresolvedEvent;
use crate::handler::{panic_message, ResolutionContext};
use crate::registry::ConflictRegistry;
use crate::rule_engine::RuleEngine;

pub struct ConflictManager {
    registry: ConflictRegistry,
    engine: RuleEngine,
    config: ConflictConfig,
    groups: Arc<dyn IChangeGroupStore>,
    conflicts: Arc<dyn IConflictStore>,
    pub(crate) rules: Arc<dyn IRuleStore>,
    events: broadcast::Sender<ConflictUnresolvedEvent>,
    scope_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl ConflictManager {
    /// Build a manager over one store implementing every repository it needs.
    /// The built-in conflict types are pre-registered.
    pub fn new<S>(store: Arc<S>, config: ConflictConfig) -> Self
    where
        S: IChangeGroupStore + IConflictStore + IRuleStore + 'static,
    {
        let (events, _) = broadcast::channel(config.event_channel_capacity.max(1));
        Self {
            registry: ConflictRegistry::with_builtins(),
            engine: RuleEngine::new(config.rule_precedence),
            groups: store.clone(),
            conflicts: store.clone(),
            rules: store,
            config,
            events,
            scope_locks: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &ConflictRegistry {
        &self.registry
    }

    pub fn register_conflict_type(
        &self,
        descriptor: ConflictTypeDescriptor,
    ) -> TandemResult<Arc<ConflictTypeDescriptor>> {
        self.registry.register(descriptor)
    }

    /// Receive every escalation raised after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ConflictUnresolvedEvent> {
        self.events.subscribe()
    }

    fn scope_lock(&self, scope_id: Uuid) -> Arc<Mutex<()>> {
        Arc::clone(self.scope_locks.entry(scope_id).or_default().value())
    }

    fn max_retries(&self, descriptor: &ConflictTypeDescriptor) -> u32 {
        descriptor.max_retries.unwrap_or(self.config.max_retry_attempts)
    }

    // ── Detection ───────────────────────────────────────────────────────────

    /// Record `conflict` and resolve it by rule, or escalate it.
    ///
    /// A detection matching an open conflict's (scope, type, hint) folds into
    /// it: an Unresolved one stays blocked without a second event, a
    /// retry-scheduled one counts a retry and is re-evaluated.
    pub fn detect_and_resolve(&self, conflict: &NewConflict) -> TandemResult<ConflictResolutionResult> {
        let descriptor = self.registry.lookup(&conflict.conflict_type)?;
        let lock = self.scope_lock(conflict.scope_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let recorded = self.conflicts.record_conflict(conflict, descriptor.countable)?;
        let stored = recorded.conflict;
        events::conflict_detected(
            stored.id,
            stored.conflict_type,
            &stored.scope_hint,
            recorded.deduplicated,
        );

        if recorded.deduplicated {
            match stored.status {
                ConflictStatus::Unresolved => {
                    if let Some(group) = conflict.change_group_id {
                        self.block_link(&ConflictLink {
                            change_group_id: group,
                            action_id: conflict.action_id,
                        })?;
                    }
                    debug!(conflict_id = stored.id, "detection folded into unresolved conflict");
                    return Ok(blocked_result(&descriptor, &stored, true));
                }
                ConflictStatus::ScheduledForRetry => {
                    let attempts = self.conflicts.increment_retry(stored.id)?;
                    let limit = self.max_retries(&descriptor);
                    if attempts > limit {
                        let message = format!("retry limit of {limit} exceeded");
                        return self.escalate(&descriptor, &stored, &message, true);
                    }
                    debug!(conflict_id = stored.id, attempts, "re-evaluating retried conflict");
                }
                ConflictStatus::Resolved => {}
            }
        }

        self.evaluate(&descriptor, &stored, recorded.deduplicated, true)
    }

    /// Pick a rule and apply it. With `escalate_on_miss` false a conflict no
    /// rule resolves is left as it is and reported blocked.
    fn evaluate(
        &self,
        descriptor: &ConflictTypeDescriptor,
        conflict: &MigrationConflict,
        deduplicated: bool,
        escalate_on_miss: bool,
    ) -> TandemResult<ConflictResolutionResult> {
        let candidates = self
            .rules
            .find_applicable_rules(conflict.conflict_type, conflict.scope_id)?;
        let ordered = self.engine.ordered_applicable_rules(
            conflict,
            descriptor.scope_interpreter.as_ref(),
            &candidates,
        );
        let chosen = ordered.into_iter().find(|rule| {
            catch_unwind(AssertUnwindSafe(|| descriptor.handler.can_resolve(conflict, rule)))
                .unwrap_or(false)
        });

        let message = match chosen {
            Some(rule) => match self.invoke_handler(descriptor, conflict, rule)? {
                ResolutionDecision::UnknownResolutionAction => {
                    format!("rule {} could not resolve the conflict", rule.reference_name)
                }
                decision => match self.apply_decision(conflict, rule.reference_name, decision, deduplicated) {
                    Err(TandemError::ConflictError(ConflictError::NoReplacementTarget(_))) => format!(
                        "rule {} produced replacement actions but no open change group holds the conflict",
                        rule.reference_name
                    ),
                    applied => return applied,
                },
            },
            None => "no resolution rule applies".to_string(),
        };

        if escalate_on_miss {
            self.escalate(descriptor, conflict, &message, deduplicated)
        } else {
            Ok(blocked_result(descriptor, conflict, deduplicated))
        }
    }

    /// Run the handler. Errors and panics become `UnknownResolutionAction`.
    fn invoke_handler(
        &self,
        descriptor: &ConflictTypeDescriptor,
        conflict: &MigrationConflict,
        rule: &ConflictResolutionRule,
    ) -> TandemResult<ResolutionDecision> {
        let group = match conflict.change_group_id {
            Some(id) => self.groups.get_group(id)?,
            None => None,
        };
        let action = group.as_ref().and_then(|g| {
            conflict
                .action_id
                .and_then(|id| g.actions.iter().find(|a| a.id == id))
        });
        let ctx = ResolutionContext {
            conflict_type: descriptor,
            change_group: group.as_ref(),
            action,
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            descriptor.handler.resolve(&ctx, conflict, rule)
        }));
        Ok(match outcome {
            Ok(Ok(decision)) => decision,
            Ok(Err(e)) => {
                warn!(conflict_id = conflict.id, rule = %rule.reference_name, error = %e, "conflict handler failed");
                ResolutionDecision::UnknownResolutionAction
            }
            Err(payload) => {
                warn!(
                    conflict_id = conflict.id,
                    rule = %rule.reference_name,
                    panic = %panic_message(payload.as_ref()),
                    "conflict handler panicked"
                );
                ResolutionDecision::UnknownResolutionAction
            }
        })
    }

    fn apply_decision(
        &self,
        conflict: &MigrationConflict,
        rule: Uuid,
        decision: ResolutionDecision,
        deduplicated: bool,
    ) -> TandemResult<ConflictResolutionResult> {
        let links = self.conflicts.conflict_links(conflict.id)?;
        let (status, outcome) = match decision {
            ResolutionDecision::SkipConflictedChangeAction => {
                for link in &links {
                    self.skip_link(link)?;
                }
                (ConflictStatus::Resolved, ResolutionOutcome::Skipped)
            }
            ResolutionDecision::AutoResolve(replacements) => {
                if !replacements.is_empty() {
                    let targets = self.replaceable_links(&links)?;
                    if targets.is_empty() {
                        return Err(ConflictError::NoReplacementTarget(conflict.id).into());
                    }
                    for (link, group) in &targets {
                        self.replace_link(link, group, &replacements)?;
                    }
                }
                (
                    ConflictStatus::Resolved,
                    ResolutionOutcome::AutoResolved {
                        replacement_actions: replacements.len(),
                    },
                )
            }
            ResolutionDecision::ScheduleForRetry => {
                (ConflictStatus::ScheduledForRetry, ResolutionOutcome::ScheduledForRetry)
            }
            ResolutionDecision::UnknownResolutionAction => {
                return Err(TandemError::ValidationError(
                    "an unknown resolution action cannot be applied".to_string(),
                ))
            }
        };

        self.conflicts.set_conflict_status(conflict.id, status, Some(rule))?;
        self.release_links(&links)?;
        events::conflict_resolved(conflict.id, Some(rule), outcome_name(&outcome));
        Ok(ConflictResolutionResult {
            conflict_id: conflict.id,
            status,
            outcome,
            rule: Some(rule),
            deduplicated,
        })
    }

    fn escalate(
        &self,
        descriptor: &ConflictTypeDescriptor,
        conflict: &MigrationConflict,
        message: &str,
        deduplicated: bool,
    ) -> TandemResult<ConflictResolutionResult> {
        if conflict.status != ConflictStatus::Unresolved {
            self.conflicts
                .set_conflict_status(conflict.id, ConflictStatus::Unresolved, None)?;
        }
        for link in self.conflicts.conflict_links(conflict.id)? {
            self.block_link(&link)?;
        }
        let stored = self
            .conflicts
            .get_conflict(conflict.id)?
            .unwrap_or_else(|| conflict.clone());

        events::conflict_escalated(stored.id, &descriptor.friendly_name, &stored.scope_hint, message);
        let event = ConflictUnresolvedEvent {
            message: message.to_string(),
            source_id: stored.source_id,
            scope_id: stored.scope_id,
            thread: std::thread::current().id(),
            orchestration: descriptor.orchestration,
            conflict: stored.clone(),
        };
        if self.events.send(event).is_err() {
            debug!(conflict_id = stored.id, "no subscribers for conflict escalation");
        }
        Ok(blocked_result(descriptor, &stored, deduplicated))
    }

    // ── Group bookkeeping ───────────────────────────────────────────────────

    /// Backlog the conflicted action and mark its group Conflicted.
    fn block_link(&self, link: &ConflictLink) -> TandemResult<()> {
        let Some(group) = self.groups.get_group(link.change_group_id)? else {
            return Ok(());
        };
        if group.status.is_terminal() {
            return Ok(());
        }
        if let Some(action_id) = link.action_id {
            self.groups.mark_action_backlogged(action_id)?;
        }
        self.groups.mark_conflicted(group.id)
    }

    /// Skip the linked action, or the whole group when no action is linked
    /// or none remains.
    fn skip_link(&self, link: &ConflictLink) -> TandemResult<()> {
        let Some(group) = self.groups.get_group(link.change_group_id)? else {
            return Ok(());
        };
        if group.status.is_terminal() {
            return Ok(());
        }
        match link.action_id {
            Some(action_id) => {
                self.groups.skip_action(action_id)?;
                let remaining = group
                    .effective_actions()
                    .filter(|a| a.id != action_id)
                    .count();
                if remaining == 0 {
                    self.groups.skip(group.id)?;
                }
                Ok(())
            }
            None => self.groups.skip(group.id),
        }
    }

    /// Linked groups that can still take replacement actions.
    fn replaceable_links(&self, links: &[ConflictLink]) -> TandemResult<Vec<(ConflictLink, ChangeGroup)>> {
        let mut targets = Vec::new();
        for link in links {
            if let Some(group) = self.groups.get_group(link.change_group_id)? {
                if !group.status.is_terminal() {
                    targets.push((*link, group));
                }
            }
        }
        Ok(targets)
    }

    /// Put `replacements` in place of the linked action. A link without an
    /// action replaces the group's effective actions as a whole.
    fn replace_link(
        &self,
        link: &ConflictLink,
        group: &ChangeGroup,
        replacements: &[NewChangeAction],
    ) -> TandemResult<()> {
        if let Some(action_id) = link.action_id {
            return self.groups.replace_action(action_id, replacements);
        }
        let effective: Vec<i64> = group.effective_actions().map(|a| a.id).collect();
        match effective.split_first() {
            Some((first, rest)) => {
                self.groups.replace_action(*first, replacements)?;
                for action_id in rest {
                    self.groups.skip_action(*action_id)?;
                }
            }
            None => {
                for action in replacements {
                    self.groups.append_action(group.id, action)?;
                }
            }
        }
        debug!(group_id = group.id.0, replaced = effective.len(), "group actions replaced");
        Ok(())
    }

    /// Unblock each linked group that no Unresolved conflict still holds.
    fn release_links(&self, links: &[ConflictLink]) -> TandemResult<()> {
        let groups: BTreeSet<ChangeGroupId> = links.iter().map(|l| l.change_group_id).collect();
        for id in groups {
            self.release_group(id)?;
        }
        Ok(())
    }

    fn release_group(&self, id: ChangeGroupId) -> TandemResult<bool> {
        let Some(group) = self.groups.get_group(id)? else {
            return Ok(false);
        };
        if !group.status.is_blocked() {
            return Ok(false);
        }
        let still_blocked = self
            .conflicts
            .find_open_conflicts_for_group(id)?
            .iter()
            .any(|c| c.status == ConflictStatus::Unresolved);
        if still_blocked {
            return Ok(false);
        }
        self.groups.unblock(id)?;
        debug!(group_id = id.0, "change group released");
        Ok(true)
    }

    // ── Operator commands ───────────────────────────────────────────────────

    /// Resolve every active conflict of the generic type in `scope_id`.
    pub fn acknowledge_all_active_conflicts(&self, scope_id: Uuid) -> TandemResult<Vec<i64>> {
        self.acknowledge_active_conflicts(scope_id, GENERIC_CONFLICT_TYPE)
    }

    /// Resolve every active conflict of `conflict_type` in `scope_id` and
    /// release the groups they held. Returns the resolved ids.
    pub fn acknowledge_active_conflicts(
        &self,
        scope_id: Uuid,
        conflict_type: Uuid,
    ) -> TandemResult<Vec<i64>> {
        let lock = self.scope_lock(scope_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let ids = self
            .conflicts
            .acknowledge_active_conflicts(scope_id, conflict_type)?;
        for id in &ids {
            let links = self.conflicts.conflict_links(*id)?;
            self.release_links(&links)?;
        }
        events::conflicts_acknowledged(scope_id, conflict_type, ids.len());
        Ok(ids)
    }

    /// Validate and persist a rule.
    pub fn add_rule(&self, rule: NewRule) -> TandemResult<ConflictResolutionRule> {
        let rule = draft_rule(rule);
        self.validate_rule(&rule)?;
        self.insert_rule(&rule)
    }

    fn insert_rule(&self, rule: &ConflictResolutionRule) -> TandemResult<ConflictResolutionRule> {
        let stored = self.rules.insert_rule(rule)?;
        info!(
            rule = %stored.reference_name,
            conflict_type = %stored.conflict_type,
            scope = %stored.applicability_scope,
            "resolution rule added"
        );
        Ok(stored)
    }


    /// The type must be registered, support the action, receive every data
    /// key the action requires, and accept the scope syntax.
    pub(crate) fn validate_rule(&self, rule: &ConflictResolutionRule) -> TandemResult<()> {
        let descriptor = self.registry.lookup(&rule.conflict_type)?;
        let action = descriptor.action(rule.action).ok_or_else(|| {
            ConflictError::UnsupportedResolutionAction {
                conflict_type: descriptor.friendly_name.clone(),
                action: rule.action.to_string(),
            }
        })?;
        for key in &action.required_data_keys {
            let present = rule.data.get(key).is_some_and(|v| !v.trim().is_empty());
            if !present {
                return Err(ConflictError::MissingActionData {
                    action: action.friendly_name.clone(),
                    key: key.clone(),
                }
                .into());
            }
        }
        descriptor
            .scope_interpreter
            .validate_scope(&rule.applicability_scope)
            .map_err(|hint| ConflictError::InvalidScope {
                scope: rule.applicability_scope.clone(),
                hint,
            })?;
        Ok(())
    }

    pub fn deprecate_rule(&self, reference_name: Uuid) -> TandemResult<()> {
        self.rules.set_rule_status(reference_name, RuleStatus::Deprecated)
    }

    pub fn delete_rule(&self, reference_name: Uuid) -> TandemResult<()> {
        self.rules.set_rule_status(reference_name, RuleStatus::Deleted)
    }

    /// Add `rule` and resolve the conflict with it. The rule is stored only
    /// once it is known to cover the conflict; if the handler still rejects
    /// it, the stored rule is deleted before the error is returned.
    pub fn resolve_with_new_rule(
        &self,
        conflict_id: i64,
        rule: NewRule,
    ) -> TandemResult<ConflictResolutionResult> {
        let conflict = self.open_conflict(conflict_id)?;
        let rule = draft_rule(rule);
        self.validate_rule(&rule)?;
        let descriptor = self.registry.lookup(&conflict.conflict_type)?;
        check_applicable(&conflict, &descriptor, &rule)?;

        let stored = self.insert_rule(&rule)?;
        self.resolve_with_existing_rule(conflict_id, stored.reference_name)
            .map_err(|e| {
                if let Err(cleanup) = self.delete_rule(stored.reference_name) {
                    warn!(rule = %stored.reference_name, error = %cleanup, "could not delete rejected rule");
                }
                e
            })
    }

    /// Resolve an open conflict with a persisted rule. The rule must target
    /// the conflict's type and cover its scope.
    pub fn resolve_with_existing_rule(
        &self,
        conflict_id: i64,
        rule_reference: Uuid,
    ) -> TandemResult<ConflictResolutionResult> {
        let conflict = self.open_conflict(conflict_id)?;
        let rule = self
            .rules
            .get_rule(rule_reference)?
            .ok_or_else(|| ConflictError::RuleNotFound(rule_reference.to_string()))?;
        let descriptor = self.registry.lookup(&conflict.conflict_type)?;
        check_applicable(&conflict, &descriptor, &rule)?;

        let lock = self.scope_lock(conflict.scope_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let unsupported = || ConflictError::UnsupportedResolutionAction {
            conflict_type: descriptor.friendly_name.clone(),
            action: rule.action.to_string(),
        };
        if !descriptor.handler.can_resolve(&conflict, &rule) {
            return Err(unsupported().into());
        }
        match self.invoke_handler(&descriptor, &conflict, &rule)? {
            ResolutionDecision::UnknownResolutionAction => Err(unsupported().into()),
            decision => self.apply_decision(&conflict, rule.reference_name, decision, false),
        }
    }

    fn open_conflict(&self, conflict_id: i64) -> TandemResult<MigrationConflict> {
        let conflict = self
            .conflicts
            .get_conflict(conflict_id)?
            .ok_or(ConflictError::ConflictNotFound(conflict_id))?;
        if conflict.status == ConflictStatus::Resolved {
            return Err(ConflictError::ConflictAlreadyResolved(conflict_id).into());
        }
        Ok(conflict)
    }

    /// Re-run the rules over every active conflict in `scope_id`. Returns the
    /// conflicts that are no longer blocking; the rest stay Unresolved and are
    /// not re-announced.
    pub fn reevaluate_unresolved(&self, scope_id: Uuid) -> TandemResult<Vec<ConflictResolutionResult>> {
        let lock = self.scope_lock(scope_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut resolved = Vec::new();
        for conflict in self.conflicts.find_active_conflicts(scope_id)? {
            let descriptor = match self.registry.lookup(&conflict.conflict_type) {
                Ok(d) => d,
                Err(e) => {
                    warn!(conflict_id = conflict.id, error = %e, "skipping conflict of unregistered type");
                    continue;
                }
            };
            let result = self.evaluate(&descriptor, &conflict, false, false)?;
            if !result.outcome.is_blocked() {
                resolved.push(result);
            }
        }
        if !resolved.is_empty() {
            info!(%scope_id, resolved = resolved.len(), "unresolved conflicts re-evaluated");
        }
        Ok(resolved)
    }

    /// Close the retry-scheduled conflicts of a group that migrated cleanly.
    pub fn resolve_retried_for_group(&self, group: ChangeGroupId) -> TandemResult<usize> {
        let mut closed = 0;
        for conflict in self.conflicts.find_open_conflicts_for_group(group)? {
            if conflict.status == ConflictStatus::ScheduledForRetry {
                self.conflicts
                    .set_conflict_status(conflict.id, ConflictStatus::Resolved, None)?;
                events::conflict_resolved(conflict.id, conflict.resolved_by_rule, "retry_succeeded");
                closed += 1;
            }
        }
        Ok(closed)
    }

    /// Unresolved conflicts in `scope_id`.
    pub fn active_conflicts(&self, scope_id: Uuid) -> TandemResult<Vec<MigrationConflict>> {
        self.conflicts.find_active_conflicts(scope_id)
    }

    pub fn has_unresolved_conflicts(&self, scope_id: Uuid) -> TandemResult<bool> {
        Ok(self.conflicts.count_unresolved(scope_id)? > 0)
    }

    /// True if an Unresolved conflict holds the group.
    pub fn is_group_blocked(&self, group: ChangeGroupId) -> TandemResult<bool> {
        Ok(self
            .conflicts
            .find_open_conflicts_for_group(group)?
            .iter()
            .any(|c| c.status == ConflictStatus::Unresolved))
    }
}

fn draft_rule(rule: NewRule) -> ConflictResolutionRule {
    ConflictResolutionRule {
        reference_name: Uuid::new_v4(),
        conflict_type: rule.conflict_type,
        action: rule.action,
        applicability_scope: rule.applicability_scope,
        scope_id: rule.scope_id,
        status: RuleStatus::Active,
        data: rule.data,
        created_at: Utc::now(),
        sequence: 0,
    }
}

/// The rule must target the conflict's type, be active and cover its scope.
fn check_applicable(
    conflict: &MigrationConflict,
    descriptor: &ConflictTypeDescriptor,
    rule: &ConflictResolutionRule,
) -> TandemResult<()> {
    if RuleEngine::is_applicable(conflict, descriptor.scope_interpreter.as_ref(), rule) {
        return Ok(());
    }
    Err(TandemError::ValidationError(format!(
        "rule {} ({}, scope '{}') does not apply to conflict {} (scope hint '{}')",
        rule.reference_name,
        rule.status.as_str(),
        rule.applicability_scope,
        conflict.id,
        conflict.scope_hint
    )))
}

fn blocked_result(
    descriptor: &ConflictTypeDescriptor,
    conflict: &MigrationConflict,
    deduplicated: bool,
) -> ConflictResolutionResult {
    ConflictResolutionResult {
        conflict_id: conflict.id,
        status: ConflictStatus::Unresolved,
        outcome: ResolutionOutcome::Blocked {
            orchestration: descriptor.orchestration,
        },
        rule: None,
        deduplicated,
    }
}

fn outcome_name(outcome: &ResolutionOutcome) -> &'static str {
    match outcome {
        ResolutionOutcome::Skipped => "skipped",
        ResolutionOutcome::AutoResolved { .. } => "auto_resolved",
        ResolutionOutcome::ScheduledForRetry => "scheduled_for_retry",
        ResolutionOutcome::Blocked { .. } => "blocked",
    }
}
