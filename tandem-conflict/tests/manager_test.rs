//! ConflictManager against the SQLite store: escalation, deduplication,
//! rule precedence, manual resolution, retries and batch acknowledgement.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tandem_conflict::{
    BasicPathScopeInterpreter, ConflictManager, ConflictTypeDescriptor, IConflictHandler,
    ResolutionActionDescriptor, ResolutionContext,
};
use tandem_core::config::ConflictConfig;
use tandem_core::constants::{GENERIC_CONFLICT_TYPE, MANUAL_RESOLVED_ACTION, RETRY_ACTION, SKIP_ACTION};
use tandem_core::errors::{ConflictError, TandemError, TandemResult};
use tandem_core::models::*;
use tandem_core::traits::{IChangeGroupStore, IConflictStore, IRuleStore};
use tandem_storage::StorageEngine;
use uuid::Uuid;

fn setup() -> (Arc<StorageEngine>, ConflictManager) {
    let store = Arc::new(StorageEngine::open_in_memory().unwrap());
    let manager = ConflictManager::new(store.clone(), ConflictConfig::default());
    (store, manager)
}

fn path_type(name: &str) -> ConflictTypeDescriptor {
    ConflictTypeDescriptor::new(Uuid::new_v4(), name, Arc::new(BasicPathScopeInterpreter))
}

fn register(manager: &ConflictManager, descriptor: ConflictTypeDescriptor) -> Uuid {
    manager.register_conflict_type(descriptor).unwrap().reference_name
}

/// One group with one Edit action per path; returns the group and its action ids.
fn group_with(store: &StorageEngine, source: Uuid, name: &str, paths: &[&str]) -> (ChangeGroupId, Vec<i64>) {
    let actions: Vec<_> = paths
        .iter()
        .map(|p| NewChangeAction::new(ChangeActionKind::Edit, *p))
        .collect();
    let id = store.create_group_with_actions(source, name, "dev", &actions).unwrap();
    let ids = store.get_group(id).unwrap().unwrap().actions.iter().map(|a| a.id).collect();
    (id, ids)
}

// ═══════════════════════════════════════════════════════════════════════════
// ESCALATION AND DEDUPLICATION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn fresh_type_without_rules_escalates_once() {
    let (_store, manager) = setup();
    let ty = register(&manager, path_type("edit/edit"));
    let mut events = manager.subscribe();
    let scope = Uuid::new_v4();

    let result = manager
        .detect_and_resolve(&NewConflict::new(ty, scope, scope, "/team/a.cs", "both edited"))
        .unwrap();

    assert_eq!(result.status, ConflictStatus::Unresolved);
    assert!(result.outcome.is_blocked());
    assert!(!result.deduplicated);
    let event = events.try_recv().unwrap();
    assert_eq!(event.conflict.id, result.conflict_id);
    assert_eq!(event.scope_id, scope);
    assert_eq!(event.thread, std::thread::current().id());
    assert!(events.try_recv().is_err());
}

#[test]
fn repeated_detection_reuses_the_active_conflict() {
    let (store, manager) = setup();
    let ty = register(&manager, path_type("edit/edit"));
    let mut events = manager.subscribe();
    let scope = Uuid::new_v4();
    let detect = || {
        manager
            .detect_and_resolve(&NewConflict::new(ty, scope, scope, "/a", "again"))
            .unwrap()
    };

    let first = detect();
    let second = detect();
    let third = detect();

    assert_eq!(first.conflict_id, second.conflict_id);
    assert_eq!(first.conflict_id, third.conflict_id);
    assert!(third.deduplicated);
    assert_eq!(manager.active_conflicts(scope).unwrap().len(), 1);
    assert_eq!(store.get_conflict(first.conflict_id).unwrap().unwrap().conflict_count, 3);
    assert!(events.try_recv().is_ok());
    assert!(events.try_recv().is_err());
}

#[test]
fn concurrent_detections_create_one_conflict() {
    let (_store, manager) = setup();
    let ty = register(&manager, path_type("race"));
    let mut events = manager.subscribe();
    let scope = Uuid::new_v4();

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                manager
                    .detect_and_resolve(&NewConflict::new(ty, scope, scope, "/hot", ""))
                    .unwrap();
            });
        }
    });

    assert_eq!(manager.active_conflicts(scope).unwrap().len(), 1);
    assert!(events.try_recv().is_ok());
    assert!(events.try_recv().is_err());
}

#[test]
fn escalation_blocks_the_group_and_backlogs_the_action() {
    let (store, manager) = setup();
    let ty = register(&manager, path_type("edit/edit"));
    let source = Uuid::new_v4();
    let (group, actions) = group_with(&store, source, "cs-1", &["/a", "/b"]);

    manager
        .detect_and_resolve(&NewConflict::new(ty, source, source, "/a", "").for_group(group, Some(actions[0])))
        .unwrap();

    let stored = store.get_group(group).unwrap().unwrap();
    assert_eq!(stored.status, ChangeGroupStatus::Conflicted);
    assert!(stored.contains_backlogged_action);
    assert_eq!(stored.actions[0].state, ChangeActionState::Backlogged);
    assert_eq!(stored.actions[1].state, ChangeActionState::Active);
    assert!(manager.is_group_blocked(group).unwrap());
}

#[test]
fn escalation_event_carries_the_type_orchestration_option() {
    let (_store, manager) = setup();
    let ty = register(
        &manager,
        path_type("stopper").with_orchestration(SyncOrchestrationOption::StopSession),
    );
    let mut events = manager.subscribe();
    let scope = Uuid::new_v4();
    let result = manager
        .detect_and_resolve(&NewConflict::new(ty, scope, scope, "/a", ""))
        .unwrap();

    assert_eq!(
        result.outcome,
        ResolutionOutcome::Blocked {
            orchestration: SyncOrchestrationOption::StopSession
        }
    );
    assert_eq!(events.try_recv().unwrap().orchestration, SyncOrchestrationOption::StopSession);
}

#[test]
fn unknown_conflict_type_is_rejected() {
    let (_store, manager) = setup();
    let scope = Uuid::new_v4();
    let err = manager
        .detect_and_resolve(&NewConflict::new(Uuid::new_v4(), scope, scope, "/a", ""))
        .unwrap_err();
    assert!(matches!(
        err,
        TandemError::ConflictError(ConflictError::UnknownConflictType(_))
    ));
}

// ═══════════════════════════════════════════════════════════════════════════
// AUTOMATIC RESOLUTION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn most_specific_rule_resolves() {
    let (_store, manager) = setup();
    let ty = register(&manager, path_type("edit/edit"));
    manager.add_rule(NewRule::new(ty, SKIP_ACTION, "/")).unwrap();
    let specific = manager
        .add_rule(NewRule::new(ty, MANUAL_RESOLVED_ACTION, "/proj/sub"))
        .unwrap();
    let scope = Uuid::new_v4();

    let result = manager
        .detect_and_resolve(&NewConflict::new(ty, scope, scope, "/proj/sub/file.txt", ""))
        .unwrap();

    assert_eq!(result.rule, Some(specific.reference_name));
    assert_eq!(result.status, ConflictStatus::Resolved);
    assert_eq!(
        result.outcome,
        ResolutionOutcome::AutoResolved {
            replacement_actions: 0
        }
    );
}

#[test]
fn skip_rule_drops_the_action_but_keeps_the_group() {
    let (store, manager) = setup();
    let ty = register(&manager, path_type("lock"));
    manager.add_rule(NewRule::new(ty, SKIP_ACTION, "/locked")).unwrap();
    let source = Uuid::new_v4();
    let (group, actions) = group_with(&store, source, "cs-1", &["/locked/a", "/free/b"]);

    let result = manager
        .detect_and_resolve(
            &NewConflict::new(ty, source, source, "/locked/a", "").for_group(group, Some(actions[0])),
        )
        .unwrap();

    assert_eq!(result.outcome, ResolutionOutcome::Skipped);
    let stored = store.get_group(group).unwrap().unwrap();
    assert_eq!(stored.status, ChangeGroupStatus::Pending);
    let effective: Vec<_> = stored.effective_actions().map(|a| a.path.as_str()).collect();
    assert_eq!(effective, vec!["/free/b"]);
}

#[test]
fn skipping_the_last_action_skips_the_group() {
    let (store, manager) = setup();
    let ty = register(&manager, path_type("lock"));
    manager.add_rule(NewRule::new(ty, SKIP_ACTION, "/")).unwrap();
    let source = Uuid::new_v4();
    let (group, actions) = group_with(&store, source, "cs-1", &["/a"]);

    manager
        .detect_and_resolve(&NewConflict::new(ty, source, source, "/a", "").for_group(group, Some(actions[0])))
        .unwrap();

    assert_eq!(
        store.get_group(group).unwrap().unwrap().status,
        ChangeGroupStatus::Skipped
    );
}

#[test]
fn scoped_rule_does_not_leak_into_other_scopes() {
    let (_store, manager) = setup();
    let ty = register(&manager, path_type("edit/edit"));
    let (mine, other) = (Uuid::new_v4(), Uuid::new_v4());
    manager
        .add_rule(NewRule::new(ty, SKIP_ACTION, "/").in_scope(mine))
        .unwrap();

    let resolved = manager
        .detect_and_resolve(&NewConflict::new(ty, mine, mine, "/a", ""))
        .unwrap();
    let escalated = manager
        .detect_and_resolve(&NewConflict::new(ty, other, other, "/a", ""))
        .unwrap();
    assert_eq!(resolved.status, ConflictStatus::Resolved);
    assert_eq!(escalated.status, ConflictStatus::Unresolved);
}

#[test]
fn deprecated_rule_no_longer_applies() {
    let (_store, manager) = setup();
    let ty = register(&manager, path_type("edit/edit"));
    let rule = manager.add_rule(NewRule::new(ty, SKIP_ACTION, "/")).unwrap();
    manager.deprecate_rule(rule.reference_name).unwrap();
    let scope = Uuid::new_v4();

    let result = manager
        .detect_and_resolve(&NewConflict::new(ty, scope, scope, "/a", ""))
        .unwrap();
    assert_eq!(result.status, ConflictStatus::Unresolved);
}

#[test]
fn deleted_rule_is_kept_for_audit_but_never_applies() {
    let (store, manager) = setup();
    let ty = register(&manager, path_type("edit/edit"));
    let rule = manager.add_rule(NewRule::new(ty, SKIP_ACTION, "/")).unwrap();
    manager.delete_rule(rule.reference_name).unwrap();
    let scope = Uuid::new_v4();

    let result = manager
        .detect_and_resolve(&NewConflict::new(ty, scope, scope, "/a", ""))
        .unwrap();
    assert_eq!(result.status, ConflictStatus::Unresolved);

    let stored = store.get_rule(rule.reference_name).unwrap().unwrap();
    assert_eq!(stored.status, RuleStatus::Deleted);
    assert!(store.list_rules(false).unwrap().is_empty());
}

// ── Custom handlers ─────────────────────────────────────────────────────────

const RENAME_ACTION: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_beef);

/// Replaces the conflicted action with an Add at the rule's `target` path.
struct RenameHandler;

impl IConflictHandler for RenameHandler {
    fn can_resolve(&self, _conflict: &MigrationConflict, rule: &ConflictResolutionRule) -> bool {
        rule.action == RENAME_ACTION
    }

    fn resolve(
        &self,
        ctx: &ResolutionContext<'_>,
        _conflict: &MigrationConflict,
        rule: &ConflictResolutionRule,
    ) -> TandemResult<ResolutionDecision> {
        let target = rule.data.get("target").cloned().unwrap_or_default();
        let version = ctx.action.map(|a| a.version.clone()).unwrap_or_default();
        Ok(ResolutionDecision::AutoResolve(vec![
            NewChangeAction::new(ChangeActionKind::Add, target).with_version(version),
        ]))
    }
}

fn rename_type() -> ConflictTypeDescriptor {
    path_type("name clash")
        .with_action(ResolutionActionDescriptor::new(RENAME_ACTION, "Rename on target").requires("target"))
        .with_handler(Arc::new(RenameHandler))
}

#[test]
fn auto_resolve_replaces_the_conflicted_action() {
    let (store, manager) = setup();
    let ty = register(&manager, rename_type());
    manager
        .add_rule(NewRule::new(ty, RENAME_ACTION, "/").with_data("target", "/a-renamed"))
        .unwrap();
    let source = Uuid::new_v4();
    let (group, actions) = group_with(&store, source, "cs-1", &["/a", "/b"]);

    let result = manager
        .detect_and_resolve(&NewConflict::new(ty, source, source, "/a", "").for_group(group, Some(actions[0])))
        .unwrap();

    assert_eq!(
        result.outcome,
        ResolutionOutcome::AutoResolved {
            replacement_actions: 1
        }
    );
    let stored = store.get_group(group).unwrap().unwrap();
    let effective: Vec<_> = stored.effective_actions().map(|a| a.path.as_str()).collect();
    assert_eq!(effective, vec!["/a-renamed", "/b"]);
}

#[test]
fn auto_resolve_on_a_group_link_replaces_the_group_actions() {
    let (store, manager) = setup();
    let ty = register(&manager, rename_type());
    manager
        .add_rule(NewRule::new(ty, RENAME_ACTION, "/").with_data("target", "/replacement"))
        .unwrap();
    let source = Uuid::new_v4();
    let (group, _) = group_with(&store, source, "cs-1", &["/a", "/b"]);

    let result = manager
        .detect_and_resolve(&NewConflict::new(ty, source, source, "/a", "").for_group(group, None))
        .unwrap();

    assert_eq!(
        result.outcome,
        ResolutionOutcome::AutoResolved {
            replacement_actions: 1
        }
    );
    let stored = store.get_group(group).unwrap().unwrap();
    let effective: Vec<_> = stored.effective_actions().map(|a| a.path.as_str()).collect();
    assert_eq!(effective, vec!["/replacement"]);
    assert_eq!(stored.actions.len(), 3);
}

#[test]
fn replacements_without_a_group_escalate() {
    let (store, manager) = setup();
    let ty = register(&manager, rename_type());
    manager
        .add_rule(NewRule::new(ty, RENAME_ACTION, "/").with_data("target", "/replacement"))
        .unwrap();
    let mut events = manager.subscribe();
    let scope = Uuid::new_v4();

    let result = manager
        .detect_and_resolve(&NewConflict::new(ty, scope, scope, "/a", ""))
        .unwrap();

    assert_eq!(result.status, ConflictStatus::Unresolved);
    assert!(result.outcome.is_blocked());
    assert_eq!(
        store.get_conflict(result.conflict_id).unwrap().unwrap().status,
        ConflictStatus::Unresolved
    );
    assert!(events.try_recv().unwrap().message.contains("replacement actions"));
}

struct PanickingHandler;

impl IConflictHandler for PanickingHandler {
    fn can_resolve(&self, _conflict: &MigrationConflict, _rule: &ConflictResolutionRule) -> bool {
        true
    }

    fn resolve(
        &self,
        _ctx: &ResolutionContext<'_>,
        _conflict: &MigrationConflict,
        _rule: &ConflictResolutionRule,
    ) -> TandemResult<ResolutionDecision> {
        panic!("handler bug")
    }
}

#[test]
fn handler_panic_escalates_instead_of_crashing() {
    let (_store, manager) = setup();
    let ty = register(&manager, path_type("fragile").with_handler(Arc::new(PanickingHandler)));
    manager.add_rule(NewRule::new(ty, SKIP_ACTION, "/")).unwrap();
    let mut events = manager.subscribe();
    let scope = Uuid::new_v4();

    let result = manager
        .detect_and_resolve(&NewConflict::new(ty, scope, scope, "/a", ""))
        .unwrap();
    assert_eq!(result.status, ConflictStatus::Unresolved);
    assert!(events.try_recv().unwrap().message.contains("could not resolve"));
}

// ═══════════════════════════════════════════════════════════════════════════
// RULE VALIDATION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn rules_are_validated_against_their_type() {
    let (_store, manager) = setup();
    let ty = register(&manager, rename_type());

    let unknown_type = manager.add_rule(NewRule::new(Uuid::new_v4(), SKIP_ACTION, "/"));
    assert!(matches!(
        unknown_type,
        Err(TandemError::ConflictError(ConflictError::UnknownConflictType(_)))
    ));

    let unsupported = manager.add_rule(NewRule::new(ty, Uuid::new_v4(), "/"));
    assert!(matches!(
        unsupported,
        Err(TandemError::ConflictError(ConflictError::UnsupportedResolutionAction { .. }))
    ));

    let missing = manager.add_rule(NewRule::new(ty, RENAME_ACTION, "/"));
    match missing {
        Err(TandemError::ConflictError(ConflictError::MissingActionData { key, .. })) => {
            assert_eq!(key, "target")
        }
        other => panic!("expected MissingActionData, got {other:?}"),
    }

    let bad_scope = manager.add_rule(NewRule::new(ty, SKIP_ACTION, "not/rooted"));
    assert!(matches!(
        bad_scope,
        Err(TandemError::ConflictError(ConflictError::InvalidScope { .. }))
    ));
}

// ═══════════════════════════════════════════════════════════════════════════
// MANUAL RESOLUTION AND RE-EVALUATION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn resolved_conflict_leaves_the_active_set() {
    let (store, manager) = setup();
    let ty = register(&manager, path_type("edit/edit"));
    let source = Uuid::new_v4();
    let (group, actions) = group_with(&store, source, "cs-1", &["/a"]);
    let escalated = manager
        .detect_and_resolve(&NewConflict::new(ty, source, source, "/a", "").for_group(group, Some(actions[0])))
        .unwrap();

    let result = manager
        .resolve_with_new_rule(escalated.conflict_id, NewRule::new(ty, MANUAL_RESOLVED_ACTION, "/a"))
        .unwrap();

    assert_eq!(result.status, ConflictStatus::Resolved);
    assert!(manager.active_conflicts(source).unwrap().is_empty());
    assert!(!manager.has_unresolved_conflicts(source).unwrap());
    let stored = store.get_group(group).unwrap().unwrap();
    assert_eq!(stored.status, ChangeGroupStatus::InProgress);
    assert_eq!(stored.actions[0].state, ChangeActionState::Active);
}

#[test]
fn manual_resolution_checks_the_rule() {
    let (_store, manager) = setup();
    let ty = register(&manager, path_type("edit/edit"));
    let scope = Uuid::new_v4();
    let escalated = manager
        .detect_and_resolve(&NewConflict::new(ty, scope, scope, "/a", ""))
        .unwrap();

    let elsewhere = manager.add_rule(NewRule::new(ty, SKIP_ACTION, "/b")).unwrap();
    assert!(matches!(
        manager.resolve_with_existing_rule(escalated.conflict_id, elsewhere.reference_name),
        Err(TandemError::ValidationError(_))
    ));
    assert!(matches!(
        manager.resolve_with_existing_rule(escalated.conflict_id, Uuid::new_v4()),
        Err(TandemError::ConflictError(ConflictError::RuleNotFound(_)))
    ));

    let skip = manager.add_rule(NewRule::new(ty, SKIP_ACTION, "/")).unwrap();
    manager
        .resolve_with_existing_rule(escalated.conflict_id, skip.reference_name)
        .unwrap();
    assert!(matches!(
        manager.resolve_with_existing_rule(escalated.conflict_id, skip.reference_name),
        Err(TandemError::ConflictError(ConflictError::ConflictAlreadyResolved(_)))
    ));
}

#[test]
fn rejected_new_rule_is_not_kept() {
    let (store, manager) = setup();
    let ty = register(&manager, path_type("edit/edit"));
    let scope = Uuid::new_v4();
    let escalated = manager
        .detect_and_resolve(&NewConflict::new(ty, scope, scope, "/a", ""))
        .unwrap();

    let elsewhere = manager.resolve_with_new_rule(escalated.conflict_id, NewRule::new(ty, SKIP_ACTION, "/b"));
    assert!(matches!(elsewhere, Err(TandemError::ValidationError(_))));
    assert!(store.list_rules(true).unwrap().is_empty());

    let later = manager
        .detect_and_resolve(&NewConflict::new(ty, scope, scope, "/b/x", ""))
        .unwrap();
    assert_eq!(later.status, ConflictStatus::Unresolved);
    assert!(later.outcome.is_blocked());
}

#[test]
fn new_rule_the_handler_cannot_apply_is_deleted() {
    let (store, manager) = setup();
    let ty = register(&manager, rename_type());
    let scope = Uuid::new_v4();
    let escalated = manager
        .detect_and_resolve(&NewConflict::new(ty, scope, scope, "/a", ""))
        .unwrap();

    let rejected = manager.resolve_with_new_rule(
        escalated.conflict_id,
        NewRule::new(ty, RENAME_ACTION, "/").with_data("target", "/elsewhere"),
    );

    assert!(matches!(
        rejected,
        Err(TandemError::ConflictError(ConflictError::NoReplacementTarget(_)))
    ));
    assert!(store.list_rules(false).unwrap().is_empty());
    let kept = store.list_rules(true).unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].status, RuleStatus::Deleted);
    assert_eq!(
        store.get_conflict(escalated.conflict_id).unwrap().unwrap().status,
        ConflictStatus::Unresolved
    );
}

#[test]
fn reevaluation_applies_rules_added_after_escalation() {
    let (_store, manager) = setup();
    let ty = register(&manager, path_type("edit/edit"));
    let scope = Uuid::new_v4();
    for hint in ["/x/1", "/x/2", "/y/1"] {
        manager
            .detect_and_resolve(&NewConflict::new(ty, scope, scope, hint, ""))
            .unwrap();
    }
    let mut events = manager.subscribe();

    manager.add_rule(NewRule::new(ty, SKIP_ACTION, "/x")).unwrap();
    let resolved = manager.reevaluate_unresolved(scope).unwrap();

    assert_eq!(resolved.len(), 2);
    assert_eq!(manager.active_conflicts(scope).unwrap().len(), 1);
    // The remaining conflict was already announced.
    assert!(events.try_recv().is_err());
}

// ═══════════════════════════════════════════════════════════════════════════
// RETRY
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn retry_is_bounded_then_escalates() {
    let (store, manager) = setup();
    let ty = register(&manager, path_type("flaky").with_max_retries(1));
    manager.add_rule(NewRule::new(ty, RETRY_ACTION, "/")).unwrap();
    let source = Uuid::new_v4();
    let (group, _) = group_with(&store, source, "cs-1", &["/a"]);
    let conflict = NewConflict::new(ty, source, source, "/a", "").for_group(group, None);

    let first = manager.detect_and_resolve(&conflict).unwrap();
    assert_eq!(first.status, ConflictStatus::ScheduledForRetry);
    assert_eq!(
        store.get_group(group).unwrap().unwrap().status,
        ChangeGroupStatus::Pending
    );

    let second = manager.detect_and_resolve(&conflict).unwrap();
    assert_eq!(second.conflict_id, first.conflict_id);
    assert_eq!(second.status, ConflictStatus::ScheduledForRetry);

    let third = manager.detect_and_resolve(&conflict).unwrap();
    assert_eq!(third.status, ConflictStatus::Unresolved);
    assert_eq!(
        store.get_group(group).unwrap().unwrap().status,
        ChangeGroupStatus::Conflicted
    );
    assert_eq!(store.get_conflict(first.conflict_id).unwrap().unwrap().retry_count, 2);
}

#[test]
fn successful_retry_closes_the_conflict() {
    let (store, manager) = setup();
    let ty = register(&manager, path_type("flaky"));
    manager.add_rule(NewRule::new(ty, RETRY_ACTION, "/")).unwrap();
    let source = Uuid::new_v4();
    let (group, _) = group_with(&store, source, "cs-1", &["/a"]);
    manager
        .detect_and_resolve(&NewConflict::new(ty, source, source, "/a", "").for_group(group, None))
        .unwrap();

    assert_eq!(manager.resolve_retried_for_group(group).unwrap(), 1);
    store.mark_in_progress(group).unwrap();
    store.complete(group).unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════
// BATCH ACKNOWLEDGEMENT
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn acknowledge_resolves_exactly_the_generic_conflicts() {
    let (store, manager) = setup();
    let other = register(&manager, path_type("other"));
    let scope = Uuid::new_v4();
    let (group, _) = group_with(&store, scope, "cs-1", &["/a"]);

    let mut generic_ids = Vec::new();
    for i in 0..5 {
        let conflict = NewConflict::new(GENERIC_CONFLICT_TYPE, scope, scope, format!("adapter error {i}"), "");
        let conflict = if i == 0 { conflict.for_group(group, None) } else { conflict };
        generic_ids.push(manager.detect_and_resolve(&conflict).unwrap().conflict_id);
    }
    for hint in ["/x", "/y"] {
        manager
            .detect_and_resolve(&NewConflict::new(other, scope, scope, hint, ""))
            .unwrap();
    }

    let acknowledged = manager.acknowledge_all_active_conflicts(scope).unwrap();
    assert_eq!(acknowledged, generic_ids);
    assert_eq!(manager.active_conflicts(scope).unwrap().len(), 2);
    assert_eq!(
        store.get_group(group).unwrap().unwrap().status,
        ChangeGroupStatus::InProgress
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// RULE PACKAGES
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn rule_package_moves_rules_between_stores() {
    let (_store, source) = setup();
    let descriptor = path_type("portable");
    let ty = descriptor.reference_name;
    source.register_conflict_type(descriptor.clone()).unwrap();
    source.add_rule(NewRule::new(ty, SKIP_ACTION, "/a")).unwrap();
    source.add_rule(NewRule::new(ty, RETRY_ACTION, "/b")).unwrap();
    let json = source.export_rules(false).unwrap().to_json().unwrap();

    let (_store2, target) = setup();
    let package = tandem_conflict::RulePackage::from_json(&json).unwrap();
    // Types must be registered before their rules can be validated.
    assert!(target.import_rules(&package).is_err());

    target.register_conflict_type(descriptor).unwrap();
    assert_eq!(target.import_rules(&package).unwrap(), 2);
    assert_eq!(target.import_rules(&package).unwrap(), 0);
    assert_eq!(target.export_rules(true).unwrap().rules.len(), 2);
}

// ── Subscribers ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn subscriber_receives_escalations_asynchronously() {
    let (_store, manager) = setup();
    let ty = register(&manager, path_type("async"));
    let mut events = manager.subscribe();
    let seen = Arc::new(AtomicUsize::new(0));
    let seen_task = seen.clone();
    let listener = tokio::spawn(async move {
        if let Ok(event) = events.recv().await {
            seen_task.fetch_add(1, Ordering::SeqCst);
            return Some(event.conflict.scope_hint);
        }
        None
    });

    let scope = Uuid::new_v4();
    manager
        .detect_and_resolve(&NewConflict::new(ty, scope, scope, "/async", ""))
        .unwrap();

    assert_eq!(listener.await.unwrap().as_deref(), Some("/async"));
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}
