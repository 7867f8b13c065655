//! Conflict persistence: dedup on the open key, links, retries,
//! acknowledgement, and the resolution rule table.

use std::collections::BTreeMap;

use chrono::Utc;
use tandem_core::errors::{ConflictError, TandemError};
use tandem_core::models::*;
use tandem_core::traits::{IChangeGroupStore, IConflictStore, IRuleStore};
use tandem_storage::StorageEngine;
use uuid::Uuid;

fn engine() -> StorageEngine {
    StorageEngine::open_in_memory().unwrap()
}

fn conflict(conflict_type: Uuid, scope: Uuid, hint: &str) -> NewConflict {
    NewConflict::new(conflict_type, scope, scope, hint, "content differs")
}

fn rule(conflict_type: Uuid, scope_id: Option<Uuid>, scope: &str) -> ConflictResolutionRule {
    ConflictResolutionRule {
        reference_name: Uuid::new_v4(),
        conflict_type,
        action: Uuid::new_v4(),
        applicability_scope: scope.to_string(),
        scope_id,
        status: RuleStatus::Active,
        data: BTreeMap::new(),
        created_at: Utc::now(),
        sequence: 0,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// DEDUPLICATION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn same_key_folds_into_open_conflict() {
    let engine = engine();
    let (ty, scope) = (Uuid::new_v4(), Uuid::new_v4());

    let first = engine.record_conflict(&conflict(ty, scope, "/a"), true).unwrap();
    let second = engine.record_conflict(&conflict(ty, scope, "/a"), true).unwrap();

    assert!(!first.deduplicated);
    assert!(second.deduplicated);
    assert_eq!(first.conflict.id, second.conflict.id);
    assert_eq!(second.conflict.conflict_count, 2);
    assert_eq!(engine.find_active_conflicts(scope).unwrap().len(), 1);
}

#[test]
fn non_countable_type_keeps_count_at_one() {
    let engine = engine();
    let (ty, scope) = (Uuid::new_v4(), Uuid::new_v4());
    engine.record_conflict(&conflict(ty, scope, "/a"), false).unwrap();
    let again = engine.record_conflict(&conflict(ty, scope, "/a"), false).unwrap();
    assert!(again.deduplicated);
    assert_eq!(again.conflict.conflict_count, 1);
}

#[test]
fn different_hint_or_type_is_a_new_conflict() {
    let engine = engine();
    let (ty, scope) = (Uuid::new_v4(), Uuid::new_v4());
    engine.record_conflict(&conflict(ty, scope, "/a"), true).unwrap();
    assert!(!engine.record_conflict(&conflict(ty, scope, "/b"), true).unwrap().deduplicated);
    assert!(!engine
        .record_conflict(&conflict(Uuid::new_v4(), scope, "/a"), true)
        .unwrap()
        .deduplicated);
    assert_eq!(engine.count_unresolved(scope).unwrap(), 3);
}

#[test]
fn resolved_conflict_no_longer_absorbs_detections() {
    let engine = engine();
    let (ty, scope) = (Uuid::new_v4(), Uuid::new_v4());
    let first = engine.record_conflict(&conflict(ty, scope, "/a"), true).unwrap();
    engine
        .set_conflict_status(first.conflict.id, ConflictStatus::Resolved, None)
        .unwrap();

    let again = engine.record_conflict(&conflict(ty, scope, "/a"), true).unwrap();
    assert!(!again.deduplicated);
    assert_ne!(again.conflict.id, first.conflict.id);
}

#[test]
fn retry_scheduled_conflict_still_dedups() {
    let engine = engine();
    let (ty, scope) = (Uuid::new_v4(), Uuid::new_v4());
    let first = engine.record_conflict(&conflict(ty, scope, "/a"), true).unwrap();
    engine
        .set_conflict_status(first.conflict.id, ConflictStatus::ScheduledForRetry, None)
        .unwrap();

    let again = engine.record_conflict(&conflict(ty, scope, "/a"), true).unwrap();
    assert!(again.deduplicated);
    assert_eq!(again.conflict.status, ConflictStatus::ScheduledForRetry);
    // Retry-scheduled conflicts are open but not active.
    assert!(engine.find_active_conflicts(scope).unwrap().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// LINKS, STATUS, RETRIES
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn dedup_links_every_affected_group() {
    let engine = engine();
    let source = Uuid::new_v4();
    let ty = Uuid::new_v4();
    let g1 = engine.create_group(source, "one", "x").unwrap();
    let g2 = engine.create_group(source, "two", "x").unwrap();

    let first = engine
        .record_conflict(&conflict(ty, source, "/a").for_group(g1, None), true)
        .unwrap();
    engine
        .record_conflict(&conflict(ty, source, "/a").for_group(g2, None), true)
        .unwrap();
    // Repeating a link is idempotent.
    engine
        .record_conflict(&conflict(ty, source, "/a").for_group(g2, None), true)
        .unwrap();

    let links = engine.conflict_links(first.conflict.id).unwrap();
    let groups: Vec<_> = links.iter().map(|l| l.change_group_id).collect();
    assert_eq!(groups, vec![g1, g2]);
    assert_eq!(engine.find_open_conflicts_for_group(g2).unwrap().len(), 1);
}

#[test]
fn resolving_records_rule_and_timestamp() {
    let engine = engine();
    let scope = Uuid::new_v4();
    let recorded = engine.record_conflict(&conflict(Uuid::new_v4(), scope, "/a"), true).unwrap();
    let rule_id = Uuid::new_v4();
    engine
        .set_conflict_status(recorded.conflict.id, ConflictStatus::Resolved, Some(rule_id))
        .unwrap();

    let stored = engine.get_conflict(recorded.conflict.id).unwrap().unwrap();
    assert_eq!(stored.status, ConflictStatus::Resolved);
    assert_eq!(stored.resolved_by_rule, Some(rule_id));
    assert!(stored.resolved_at.is_some());
}

#[test]
fn status_change_on_unknown_conflict_fails() {
    let engine = engine();
    let err = engine
        .set_conflict_status(77, ConflictStatus::Resolved, None)
        .unwrap_err();
    assert!(matches!(
        err,
        TandemError::ConflictError(ConflictError::ConflictNotFound(77))
    ));
    assert!(engine.increment_retry(77).is_err());
}

#[test]
fn retry_counter_increments() {
    let engine = engine();
    let recorded = engine
        .record_conflict(&conflict(Uuid::new_v4(), Uuid::new_v4(), "/a"), true)
        .unwrap();
    assert_eq!(engine.increment_retry(recorded.conflict.id).unwrap(), 1);
    assert_eq!(engine.increment_retry(recorded.conflict.id).unwrap(), 2);
}

#[test]
fn acknowledge_resolves_only_matching_type() {
    let engine = engine();
    let scope = Uuid::new_v4();
    let (ty, other) = (Uuid::new_v4(), Uuid::new_v4());
    let a = engine.record_conflict(&conflict(ty, scope, "/a"), true).unwrap();
    let b = engine.record_conflict(&conflict(ty, scope, "/b"), true).unwrap();
    engine.record_conflict(&conflict(other, scope, "/a"), true).unwrap();

    let acked = engine.acknowledge_active_conflicts(scope, ty).unwrap();
    assert_eq!(acked, vec![a.conflict.id, b.conflict.id]);
    assert_eq!(engine.count_unresolved(scope).unwrap(), 1);
    assert!(engine.acknowledge_active_conflicts(scope, ty).unwrap().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// RULES
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn inserted_rules_get_increasing_sequence() {
    let engine = engine();
    let ty = Uuid::new_v4();
    let first = engine.insert_rule(&rule(ty, None, "/")).unwrap();
    let second = engine.insert_rule(&rule(ty, None, "/src")).unwrap();
    assert!(second.sequence > first.sequence);

    let stored = engine.get_rule(first.reference_name).unwrap().unwrap();
    assert_eq!(stored.applicability_scope, "/");
    assert_eq!(stored.status, RuleStatus::Active);
}

#[test]
fn applicable_rules_match_type_and_scope() {
    let engine = engine();
    let (ty, scope) = (Uuid::new_v4(), Uuid::new_v4());
    let global = engine.insert_rule(&rule(ty, None, "/")).unwrap();
    let scoped = engine.insert_rule(&rule(ty, Some(scope), "/src")).unwrap();
    engine.insert_rule(&rule(ty, Some(Uuid::new_v4()), "/")).unwrap();
    engine.insert_rule(&rule(Uuid::new_v4(), None, "/")).unwrap();

    let found = engine.find_applicable_rules(ty, scope).unwrap();
    let names: Vec<_> = found.iter().map(|r| r.reference_name).collect();
    assert_eq!(names, vec![global.reference_name, scoped.reference_name]);
}

#[test]
fn deprecated_rules_are_not_applicable() {
    let engine = engine();
    let (ty, scope) = (Uuid::new_v4(), Uuid::new_v4());
    let r = engine.insert_rule(&rule(ty, None, "/")).unwrap();
    engine.set_rule_status(r.reference_name, RuleStatus::Deprecated).unwrap();

    assert!(engine.find_applicable_rules(ty, scope).unwrap().is_empty());
    assert!(engine.list_rules(false).unwrap().is_empty());
    assert_eq!(engine.list_rules(true).unwrap().len(), 1);
    assert!(engine.set_rule_status(Uuid::new_v4(), RuleStatus::Deleted).is_err());
}

#[test]
fn rule_data_round_trips() {
    let engine = engine();
    let mut r = rule(Uuid::new_v4(), None, "/");
    r.data.insert("target".to_string(), "/renamed".to_string());
    engine.insert_rule(&r).unwrap();
    let stored = engine.get_rule(r.reference_name).unwrap().unwrap();
    assert_eq!(stored.data.get("target").map(String::as_str), Some("/renamed"));
}
