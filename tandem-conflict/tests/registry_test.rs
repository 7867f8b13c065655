//! ConflictRegistry: built-ins, idempotent registration, shape conflicts.

use std::sync::Arc;

use tandem_conflict::{
    builtin, BasicPathScopeInterpreter, ConflictRegistry, ConflictTypeDescriptor,
    GlobalScopeInterpreter, RegexScopeInterpreter, ResolutionActionDescriptor,
};
use tandem_core::constants::{GENERIC_CONFLICT_TYPE, SKIP_ACTION, UNSUPPORTED_CHANGE_ACTION_CONFLICT_TYPE};
use tandem_core::errors::{ConflictError, TandemError};
use tandem_core::models::SyncOrchestrationOption;
use uuid::Uuid;

fn descriptor(id: Uuid) -> ConflictTypeDescriptor {
    ConflictTypeDescriptor::new(id, "content conflict", Arc::new(BasicPathScopeInterpreter))
}

#[test]
fn builtins_are_present() {
    let registry = ConflictRegistry::with_builtins();
    assert!(registry.contains(&GENERIC_CONFLICT_TYPE));
    assert!(registry.contains(&UNSUPPORTED_CHANGE_ACTION_CONFLICT_TYPE));
    assert_eq!(registry.len(), builtin::builtin_conflict_types().len());
    assert!(ConflictRegistry::new().is_empty());

    let generic = registry.lookup(&GENERIC_CONFLICT_TYPE).unwrap();
    assert!(generic.action(SKIP_ACTION).is_some());
}

#[test]
fn identical_registration_is_idempotent() {
    let registry = ConflictRegistry::new();
    let id = Uuid::new_v4();
    let first = registry.register(descriptor(id)).unwrap();
    let second = registry.register(descriptor(id)).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.len(), 1);
}

#[test]
fn different_shape_under_same_name_is_rejected() {
    let registry = ConflictRegistry::new();
    let id = Uuid::new_v4();
    registry.register(descriptor(id)).unwrap();

    let renamed = ConflictTypeDescriptor::new(id, "other name", Arc::new(BasicPathScopeInterpreter));
    let reinterpreted = ConflictTypeDescriptor::new(id, "content conflict", Arc::new(GlobalScopeInterpreter));
    let extra_action = descriptor(id).with_action(ResolutionActionDescriptor::new(Uuid::new_v4(), "take theirs"));
    let stopping = descriptor(id).with_orchestration(SyncOrchestrationOption::StopSession);

    for candidate in [renamed, reinterpreted, extra_action, stopping] {
        match registry.register(candidate) {
            Err(TandemError::ConflictError(ConflictError::DuplicateRegistration { reference_name, .. })) => {
                assert_eq!(reference_name, id.to_string())
            }
            other => panic!("expected DuplicateRegistration, got {other:?}"),
        }
    }
    assert_eq!(registry.lookup(&id).unwrap().friendly_name, "content conflict");
}

#[test]
fn unknown_type_lookup_fails() {
    let registry = ConflictRegistry::with_builtins();
    assert!(matches!(
        registry.lookup(&Uuid::new_v4()),
        Err(TandemError::ConflictError(ConflictError::UnknownConflictType(_)))
    ));
}

#[test]
fn concurrent_registration_keeps_one_entry() {
    let registry = ConflictRegistry::new();
    let id = Uuid::new_v4();
    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                registry
                    .register(ConflictTypeDescriptor::new(
                        id,
                        "pattern conflict",
                        Arc::new(RegexScopeInterpreter::new()),
                    ))
                    .unwrap();
            });
        }
    });
    assert_eq!(registry.len(), 1);
}
