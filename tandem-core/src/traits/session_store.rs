use uuid::Uuid;

use crate::errors::TandemResult;
use crate::models::{PipelineState, SessionCheckpoint, SessionGroup, SessionGroupState};

/// Session group state persisted across process restarts.
pub trait ISessionStateStore: Send + Sync {
    /// Insert or replace a group definition. An existing persisted state is kept.
    fn save_session_group(&self, group: &SessionGroup) -> TandemResult<()>;
    fn get_session_group(&self, id: Uuid) -> TandemResult<Option<SessionGroup>>;
    fn list_session_groups(&self) -> TandemResult<Vec<SessionGroup>>;
    fn set_session_group_state(&self, id: Uuid, state: SessionGroupState) -> TandemResult<()>;

    fn save_pipeline_state(&self, id: Uuid, state: PipelineState) -> TandemResult<()>;
    /// `PipelineState::Default` when nothing was recorded.
    fn get_pipeline_state(&self, id: Uuid) -> TandemResult<PipelineState>;

    fn save_checkpoint(&self, checkpoint: &SessionCheckpoint) -> TandemResult<()>;
    fn get_checkpoint(&self, session_id: Uuid) -> TandemResult<Option<SessionCheckpoint>>;

    // --- Analysis cursor ---
    fn get_high_water_mark(&self, session_id: Uuid, source_id: Uuid) -> TandemResult<Option<String>>;
    fn set_high_water_mark(&self, session_id: Uuid, source_id: Uuid, value: &str) -> TandemResult<()>;
}
