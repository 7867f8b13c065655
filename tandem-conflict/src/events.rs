//! Escalation events broadcast to operators and orchestrators.

use std::thread::ThreadId;

use tandem_core::models::{MigrationConflict, SyncOrchestrationOption};
use uuid::Uuid;

/// Raised once when a conflict is escalated for manual resolution.
#[derive(Debug, Clone)]
pub struct ConflictUnresolvedEvent {
    pub conflict: MigrationConflict,
    pub message: String,
    pub source_id: Uuid,
    /// Session the conflict belongs to. Cancel or pause its work through the
    /// scheduler owning that session.
    pub scope_id: Uuid,
    /// Thread that detected the conflict. Diagnostic only: a `ThreadId`
    /// cannot interrupt anything.
    pub thread: ThreadId,
    pub orchestration: SyncOrchestrationOption,
}
