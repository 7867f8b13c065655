//! Change group lifecycle against the SQLite store: creation, status
//! transitions, action rewrites, backlog release and retention.

use chrono::{Duration, Utc};
use tandem_core::errors::{ChangeGroupError, TandemError};
use tandem_core::models::*;
use tandem_core::traits::{IChangeGroupStore, IConflictStore};
use tandem_storage::StorageEngine;
use uuid::Uuid;

fn engine() -> StorageEngine {
    StorageEngine::open_in_memory().unwrap()
}

fn edit(path: &str) -> NewChangeAction {
    NewChangeAction::new(ChangeActionKind::Edit, path).with_version("1")
}

// ═══════════════════════════════════════════════════════════════════════════
// CREATION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn new_group_starts_pending_and_empty() {
    let engine = engine();
    let source = Uuid::new_v4();
    let id = engine.create_group(source, "cs-100", "alice").unwrap();

    let group = engine.get_group(id).unwrap().unwrap();
    assert_eq!(group.status, ChangeGroupStatus::Pending);
    assert_eq!(group.source_id, source);
    assert_eq!(group.owner, "alice");
    assert!(group.actions.is_empty());
    assert!(!group.contains_backlogged_action);
}

#[test]
fn actions_keep_insertion_order() {
    let engine = engine();
    let source = Uuid::new_v4();
    let id = engine
        .create_group_with_actions(source, "cs-1", "bob", &[edit("/a"), edit("/b")])
        .unwrap();
    engine.append_action(id, &edit("/c")).unwrap();

    let group = engine.get_group(id).unwrap().unwrap();
    let paths: Vec<_> = group.actions.iter().map(|a| a.path.as_str()).collect();
    assert_eq!(paths, vec!["/a", "/b", "/c"]);
    let seqs: Vec<_> = group.actions.iter().map(|a| a.sequence).collect();
    assert_eq!(seqs, vec![0, 1, 2]);
}

#[test]
fn action_metadata_survives_storage() {
    let engine = engine();
    let rename = NewChangeAction::new(ChangeActionKind::Rename, "/docs/guide.md")
        .with_from_path("/docs/intro.md")
        .with_version("4")
        .with_item_type("markdown")
        .with_source_item("item:8812");
    let id = engine
        .create_group_with_actions(Uuid::new_v4(), "cs-9", "carol", &[rename])
        .unwrap();

    let stored = &engine.get_group(id).unwrap().unwrap().actions[0];
    assert_eq!(stored.from_path.as_deref(), Some("/docs/intro.md"));
    assert_eq!(stored.item_type_reference_name, "markdown");
    assert_eq!(stored.source_item.as_deref(), Some("item:8812"));
    assert_eq!(stored.state, ChangeActionState::Active);
}

#[test]
fn duplicate_open_group_is_rejected() {
    let engine = engine();
    let source = Uuid::new_v4();
    let first = engine.create_group(source, "cs-7", "x").unwrap();

    let err = engine.create_group(source, "cs-7", "x").unwrap_err();
    match err {
        TandemError::ChangeGroupError(ChangeGroupError::DuplicateGroup { existing_id, .. }) => {
            assert_eq!(existing_id, first.0)
        }
        other => panic!("expected DuplicateGroup, got {other:?}"),
    }

    // Another source may reuse the name.
    engine.create_group(Uuid::new_v4(), "cs-7", "x").unwrap();
}

#[test]
fn name_can_be_reused_after_completion() {
    let engine = engine();
    let source = Uuid::new_v4();
    let first = engine.create_group(source, "cs-9", "x").unwrap();
    engine.mark_in_progress(first).unwrap();
    engine.complete(first).unwrap();

    let second = engine.create_group(source, "cs-9", "x").unwrap();
    assert_ne!(first, second);
    let latest = engine.find_group_by_name(source, "cs-9").unwrap().unwrap();
    assert_eq!(latest.id, second);
}

#[test]
fn failed_bulk_create_leaves_nothing_behind() {
    let engine = engine();
    let source = Uuid::new_v4();
    engine.create_group(source, "dup", "x").unwrap();
    assert!(engine
        .create_group_with_actions(source, "dup", "x", &[edit("/a")])
        .is_err());
    assert_eq!(engine.get_pending_groups(source, 10).unwrap().len(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// STATUS TRANSITIONS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn terminal_group_refuses_further_transitions() {
    let engine = engine();
    let id = engine.create_group(Uuid::new_v4(), "cs", "x").unwrap();
    engine.mark_in_progress(id).unwrap();
    engine.complete(id).unwrap();

    let err = engine.mark_in_progress(id).unwrap_err();
    assert!(matches!(
        err,
        TandemError::ChangeGroupError(ChangeGroupError::InvalidGroupState { .. })
    ));
    assert!(engine.append_action(id, &edit("/late")).is_err());
}

#[test]
fn complete_is_refused_while_a_conflict_is_open() {
    let engine = engine();
    let source = Uuid::new_v4();
    let id = engine.create_group_with_actions(source, "cs", "x", &[edit("/a")]).unwrap();
    let action = engine.get_group(id).unwrap().unwrap().actions[0].id;
    let recorded = engine
        .record_conflict(
            &NewConflict::new(Uuid::new_v4(), source, source, "/a", "edit/edit").for_group(id, Some(action)),
            true,
        )
        .unwrap();
    engine.mark_in_progress(id).unwrap();
    assert!(engine.complete(id).is_err());

    engine
        .set_conflict_status(recorded.conflict.id, ConflictStatus::Resolved, None)
        .unwrap();
    engine.complete(id).unwrap();
    assert_eq!(
        engine.get_group(id).unwrap().unwrap().status,
        ChangeGroupStatus::Completed
    );
}

#[test]
fn unknown_group_is_reported() {
    let engine = engine();
    let err = engine.mark_in_progress(ChangeGroupId(404)).unwrap_err();
    assert!(matches!(
        err,
        TandemError::ChangeGroupError(ChangeGroupError::GroupNotFound(404))
    ));
    assert!(engine.get_group(ChangeGroupId(404)).unwrap().is_none());
}

// ═══════════════════════════════════════════════════════════════════════════
// ACTIONS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn replace_action_splices_replacements_after_the_original() {
    let engine = engine();
    let id = engine
        .create_group_with_actions(Uuid::new_v4(), "cs", "x", &[edit("/a"), edit("/b")])
        .unwrap();
    let original = engine.get_group(id).unwrap().unwrap().actions[0].id;

    engine
        .replace_action(
            original,
            &[
                NewChangeAction::new(ChangeActionKind::Delete, "/a"),
                NewChangeAction::new(ChangeActionKind::Add, "/a2"),
            ],
        )
        .unwrap();

    let group = engine.get_group(id).unwrap().unwrap();
    assert_eq!(group.actions.len(), 4);
    assert_eq!(group.actions[0].state, ChangeActionState::Skipped);
    let effective: Vec<_> = group.effective_actions().map(|a| a.path.as_str()).collect();
    assert_eq!(effective, vec!["/a", "/a2", "/b"]);
    assert_eq!(group.actions[1].kind, ChangeActionKind::Delete);
}

#[test]
fn skipped_action_is_not_effective() {
    let engine = engine();
    let id = engine
        .create_group_with_actions(Uuid::new_v4(), "cs", "x", &[edit("/a"), edit("/b")])
        .unwrap();
    let first = engine.get_group(id).unwrap().unwrap().actions[0].id;
    engine.skip_action(first).unwrap();

    let group = engine.get_group(id).unwrap().unwrap();
    let effective: Vec<_> = group.effective_actions().map(|a| a.path.as_str()).collect();
    assert_eq!(effective, vec!["/b"]);
    assert!(engine.skip_action(9_999).is_err());
}

#[test]
fn unblock_reactivates_backlogged_actions() {
    let engine = engine();
    let id = engine
        .create_group_with_actions(Uuid::new_v4(), "cs", "x", &[edit("/a")])
        .unwrap();
    let action = engine.get_group(id).unwrap().unwrap().actions[0].id;

    engine.mark_action_backlogged(action).unwrap();
    engine.mark_conflicted(id).unwrap();
    let blocked = engine.get_group(id).unwrap().unwrap();
    assert!(blocked.contains_backlogged_action);
    assert_eq!(blocked.actions[0].state, ChangeActionState::Backlogged);

    engine.unblock(id).unwrap();
    let group = engine.get_group(id).unwrap().unwrap();
    assert_eq!(group.status, ChangeGroupStatus::InProgress);
    assert!(!group.contains_backlogged_action);
    assert_eq!(group.actions[0].state, ChangeActionState::Active);
}

#[test]
fn unblock_requires_a_blocked_group() {
    let engine = engine();
    let id = engine.create_group(Uuid::new_v4(), "cs", "x").unwrap();
    assert!(engine.unblock(id).is_err());
}

// ═══════════════════════════════════════════════════════════════════════════
// QUERIES AND MAINTENANCE
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn pending_groups_are_oldest_first_and_limited() {
    let engine = engine();
    let source = Uuid::new_v4();
    let ids: Vec<_> = (0..5)
        .map(|i| engine.create_group(source, &format!("cs-{i}"), "x").unwrap())
        .collect();
    engine.mark_conflicted(ids[1]).unwrap();

    let pending = engine.get_pending_groups(source, 3).unwrap();
    let got: Vec<_> = pending.iter().map(|g| g.id).collect();
    assert_eq!(got, vec![ids[0], ids[2], ids[3]]);

    let blocked = engine.get_blocked_groups(source).unwrap();
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].id, ids[1]);
}

#[test]
fn release_backlog_skips_groups_with_open_conflicts() {
    let engine = engine();
    let source = Uuid::new_v4();
    let free = engine.create_group(source, "free", "x").unwrap();
    let held = engine.create_group(source, "held", "x").unwrap();
    engine.mark_contains_backlog(free).unwrap();
    engine.mark_contains_backlog(held).unwrap();
    engine
        .record_conflict(
            &NewConflict::new(Uuid::new_v4(), source, source, "/held", "").for_group(held, None),
            true,
        )
        .unwrap();

    let released = engine.release_backlog(source).unwrap();
    assert_eq!(released, vec![free]);
    assert_eq!(
        engine.get_group(free).unwrap().unwrap().status,
        ChangeGroupStatus::InProgress
    );
    assert_eq!(
        engine.get_group(held).unwrap().unwrap().status,
        ChangeGroupStatus::Backlogged
    );
}

#[test]
fn purge_removes_only_terminal_groups() {
    let engine = engine();
    let source = Uuid::new_v4();
    let done = engine.create_group(source, "done", "x").unwrap();
    let skipped = engine.create_group(source, "skipped", "x").unwrap();
    let open = engine.create_group(source, "open", "x").unwrap();
    engine.mark_in_progress(done).unwrap();
    engine.complete(done).unwrap();
    engine.skip(skipped).unwrap();

    // Nothing is older than an hour ago.
    assert_eq!(engine.purge_completed(Utc::now() - Duration::hours(1)).unwrap(), 0);

    let purged = engine.purge_completed(Utc::now() + Duration::seconds(1)).unwrap();
    assert_eq!(purged, 2);
    assert!(engine.get_group(done).unwrap().is_none());
    assert!(engine.get_group(skipped).unwrap().is_none());
    assert!(engine.get_group(open).unwrap().is_some());
}
