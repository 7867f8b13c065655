pub mod change_action;
pub mod change_group;
pub mod conflict;
pub mod conversion;
pub mod resolution;
pub mod rule;
pub mod session;

pub use change_action::{ChangeAction, ChangeActionKind, ChangeActionState, NewChangeAction};
pub use change_group::{ChangeGroup, ChangeGroupHandle, ChangeGroupId, ChangeGroupStatus};
pub use conflict::{ConflictLink, ConflictStatus, MigrationConflict, NewConflict};
pub use conversion::{ConversionHistoryEntry, ConversionResult, ItemConversion};
pub use resolution::{
    ConflictResolutionResult, ResolutionDecision, ResolutionOutcome, SyncOrchestrationOption,
};
pub use rule::{ConflictResolutionRule, NewRule, RuleStatus};
pub use session::{
    PipelineState, SessionCheckpoint, SessionDefinition, SessionDirection, SessionGroup,
    SessionGroupState, SessionKind, SyncCommand, SyncDirection, SyncPhase, WorkflowFrequency,
};
