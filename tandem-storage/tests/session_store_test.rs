//! Session group state, pipeline state, checkpoints, high-water marks and
//! conversion history.

use chrono::Utc;
use tandem_core::errors::{StorageError, TandemError};
use tandem_core::models::*;
use tandem_core::traits::{IConversionHistory, ISessionStateStore};
use tandem_storage::StorageEngine;
use uuid::Uuid;

fn engine() -> StorageEngine {
    StorageEngine::open_in_memory().unwrap()
}

fn session_group(name: &str) -> SessionGroup {
    SessionGroup {
        id: Uuid::new_v4(),
        name: name.to_string(),
        state: SessionGroupState::Initialized,
        frequency: WorkflowFrequency::ContinuousAutomatic,
        interval_secs: Some(15),
        sessions: vec![SessionDefinition {
            id: Uuid::new_v4(),
            kind: SessionKind::VersionControl,
            direction: SessionDirection::Bidirectional,
            left_source: Uuid::new_v4(),
            right_source: Uuid::new_v4(),
        }],
        updated_at: Utc::now(),
    }
}

#[test]
fn session_group_round_trips() {
    let engine = engine();
    let group = session_group("nightly");
    engine.save_session_group(&group).unwrap();

    let stored = engine.get_session_group(group.id).unwrap().unwrap();
    assert_eq!(stored.name, "nightly");
    assert_eq!(stored.frequency, WorkflowFrequency::ContinuousAutomatic);
    assert_eq!(stored.interval_secs, Some(15));
    assert_eq!(stored.sessions, group.sessions);
    assert_eq!(stored.state, SessionGroupState::Initialized);
}

#[test]
fn re_saving_definition_keeps_persisted_state() {
    let engine = engine();
    let mut group = session_group("g");
    engine.save_session_group(&group).unwrap();
    engine
        .set_session_group_state(group.id, SessionGroupState::Paused)
        .unwrap();

    group.name = "renamed".to_string();
    engine.save_session_group(&group).unwrap();

    let stored = engine.get_session_group(group.id).unwrap().unwrap();
    assert_eq!(stored.name, "renamed");
    assert_eq!(stored.state, SessionGroupState::Paused);
}

#[test]
fn state_of_unknown_group_is_an_error() {
    let engine = engine();
    assert!(engine
        .set_session_group_state(Uuid::new_v4(), SessionGroupState::Running)
        .is_err());
    assert!(engine.list_session_groups().unwrap().is_empty());
}

#[test]
fn pipeline_state_defaults_until_saved() {
    let engine = engine();
    let group = session_group("g");
    engine.save_session_group(&group).unwrap();
    assert_eq!(engine.get_pipeline_state(group.id).unwrap(), PipelineState::Default);

    engine.save_pipeline_state(group.id, PipelineState::Running).unwrap();
    assert_eq!(engine.get_pipeline_state(group.id).unwrap(), PipelineState::Running);
}

#[test]
fn checkpoint_keeps_last_group_when_phase_advances() {
    let engine = engine();
    let session_id = Uuid::new_v4();
    assert!(engine.get_checkpoint(session_id).unwrap().is_none());

    engine
        .save_checkpoint(&SessionCheckpoint {
            session_id,
            phase: SyncPhase::Migration,
            direction: SyncDirection::LeftToRight,
            last_group_id: Some(42),
            updated_at: Utc::now(),
        })
        .unwrap();
    engine
        .save_checkpoint(&SessionCheckpoint {
            session_id,
            phase: SyncPhase::Analysis,
            direction: SyncDirection::RightToLeft,
            last_group_id: None,
            updated_at: Utc::now(),
        })
        .unwrap();

    let cp = engine.get_checkpoint(session_id).unwrap().unwrap();
    assert_eq!(cp.phase, SyncPhase::Analysis);
    assert_eq!(cp.direction, SyncDirection::RightToLeft);
    assert_eq!(cp.last_group_id, Some(42));
}

#[test]
fn high_water_mark_is_per_session_and_source() {
    let engine = engine();
    let (session, left, right) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    assert!(engine.get_high_water_mark(session, left).unwrap().is_none());

    engine.set_high_water_mark(session, left, "10").unwrap();
    engine.set_high_water_mark(session, left, "12").unwrap();
    engine.set_high_water_mark(session, right, "3").unwrap();

    assert_eq!(engine.get_high_water_mark(session, left).unwrap().as_deref(), Some("12"));
    assert_eq!(engine.get_high_water_mark(session, right).unwrap().as_deref(), Some("3"));
}

#[test]
fn conversion_history_identifies_echoes() {
    let engine = engine();
    let (session, left, right) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    engine
        .record_conversion(&ConversionHistoryEntry {
            session_id: session,
            source_id: left,
            source_change_id: "L-5".to_string(),
            target_source_id: right,
            target_change_id: "R-9".to_string(),
            items: vec![ItemConversion {
                source_item: "/a".to_string(),
                target_item: "/a".to_string(),
            }],
            recorded_at: Utc::now(),
        })
        .unwrap();

    // The change written to the right side is an echo when read back from there.
    assert!(engine.is_migrated_change(right, "R-9").unwrap());
    assert!(!engine.is_migrated_change(left, "L-5").unwrap());
    assert!(!engine.is_migrated_change(right, "R-10").unwrap());

    let found = engine.find_conversion(left, "L-5").unwrap().unwrap();
    assert_eq!(found.target_change_id, "R-9");
    assert_eq!(found.items.len(), 1);
    assert_eq!(engine.list_conversions(session).unwrap().len(), 1);
}

#[test]
fn undecodable_state_is_reported_as_corrupt() {
    let engine = engine();
    let group = session_group("nightly");
    engine.save_session_group(&group).unwrap();
    engine
        .connections()
        .write(|conn| {
            conn.execute(
                "UPDATE session_groups SET state = 'hibernating' WHERE id = ?1",
                [group.id.to_string()],
            )
            .unwrap();
            Ok(())
        })
        .unwrap();

    let err = engine.get_session_group(group.id).unwrap_err();
    assert!(
        matches!(
            err,
            TandemError::StorageError(StorageError::CorruptValue { ref value, .. }) if value == "hibernating"
        ),
        "{err:?}"
    );
}
