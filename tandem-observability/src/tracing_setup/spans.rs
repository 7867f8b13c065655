//! Named spans wrapping the units of work an operator follows in the logs.

use tracing::Span;
use uuid::Uuid;

/// Span covering one synchronization pass of a session group.
pub fn pass_span(session_group_id: Uuid, trip: u64) -> Span {
    tracing::info_span!("sync_pass", session_group_id = %session_group_id, trip = trip)
}

/// Span covering one phase of one session in one direction.
pub fn phase_span(session_id: Uuid, phase: &str, direction: &str) -> Span {
    tracing::info_span!("sync_phase", session_id = %session_id, phase = %phase, direction = %direction)
}

/// Span covering the migration of a single change group.
pub fn change_group_span(group_id: i64, name: &str) -> Span {
    tracing::debug_span!("change_group", group_id = group_id, name = %name)
}
