//! Structured log events for key system operations.
//!
//! Each function emits a `tracing` event with structured fields.

use uuid::Uuid;

/// Log a newly recorded conflict.
pub fn conflict_detected(conflict_id: i64, conflict_type: Uuid, scope_hint: &str, deduplicated: bool) {
    tracing::info!(
        event = "conflict_detected",
        conflict_id = conflict_id,
        conflict_type = %conflict_type,
        scope_hint = %scope_hint,
        deduplicated = deduplicated,
        "conflict detected"
    );
}

/// Log a conflict escalated for manual resolution.
pub fn conflict_escalated(conflict_id: i64, conflict_type: &str, scope_hint: &str, message: &str) {
    tracing::warn!(
        event = "conflict_escalated",
        conflict_id = conflict_id,
        conflict_type = %conflict_type,
        scope_hint = %scope_hint,
        message = %message,
        "conflict escalated"
    );
}

/// Log a conflict resolved by a rule or an operator.
pub fn conflict_resolved(conflict_id: i64, rule: Option<Uuid>, outcome: &str) {
    tracing::info!(
        event = "conflict_resolved",
        conflict_id = conflict_id,
        rule = ?rule,
        outcome = %outcome,
        "conflict resolved"
    );
}

/// Log a batch acknowledgement.
pub fn conflicts_acknowledged(scope_id: Uuid, conflict_type: Uuid, count: usize) {
    tracing::info!(
        event = "conflicts_acknowledged",
        scope_id = %scope_id,
        conflict_type = %conflict_type,
        count = count,
        "active conflicts acknowledged"
    );
}

/// Log a change group applied to the target endpoint.
pub fn change_group_migrated(group_id: i64, name: &str, target_change_id: Option<&str>, actions: usize) {
    tracing::info!(
        event = "change_group_migrated",
        group_id = group_id,
        name = %name,
        target_change_id = ?target_change_id,
        actions = actions,
        "change group migrated"
    );
}

/// Log a change group held back behind a blocked group or conflict.
pub fn change_group_deferred(group_id: i64, name: &str, reason: &str) {
    tracing::info!(
        event = "change_group_deferred",
        group_id = group_id,
        name = %name,
        reason = %reason,
        "change group deferred"
    );
}

/// Log the end of a synchronization pass.
pub fn pass_completed(session_group_id: Uuid, trip: u64, analyzed: usize, migrated: usize, blocked: usize) {
    tracing::info!(
        event = "pass_completed",
        session_group_id = %session_group_id,
        trip = trip,
        analyzed = analyzed,
        migrated = migrated,
        blocked = blocked,
        "sync pass completed"
    );
}

/// Log a session group state transition.
pub fn session_state_changed(session_group_id: Uuid, from: &str, to: &str) {
    tracing::info!(
        event = "session_state_changed",
        session_group_id = %session_group_id,
        from = %from,
        to = %to,
        "session group state changed"
    );
}

/// Log a failed pass; the scheduler will retry or give up.
pub fn error_limit_reached(session_group_id: Uuid, signature: &str, occurrences: u32, limit: u32) {
    tracing::error!(
        event = "error_limit_reached",
        session_group_id = %session_group_id,
        signature = %signature,
        occurrences = occurrences,
        limit = limit,
        "error signature reached its occurrence limit"
    );
}

pub fn session_faulted(session_group_id: Uuid, error: &str, attempt: u32) {
    tracing::error!(
        event = "session_faulted",
        session_group_id = %session_group_id,
        error = %error,
        attempt = attempt,
        "session group faulted"
    );
}
