//! Session groups, pipeline state and resume checkpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{SessionConfig, SessionGroupConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    #[default]
    VersionControl,
    WorkItem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionDirection {
    /// Left to right only.
    Unidirectional,
    #[default]
    Bidirectional,
}

/// When a session group runs its trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowFrequency {
    /// Trips until no source history remains, then `OneTimeCompleted`.
    OneTime,
    /// One trip per explicit start-new-trip request.
    ContinuousManual,
    /// Trips separated by the idle interval.
    #[default]
    ContinuousAutomatic,
}

/// Persisted session group state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionGroupState {
    Initialized,
    Running,
    Paused,
    Completed,
    OneTimeCompleted,
    MarkedForDeletion,
    /// A pass failed; the scheduler retries after a delay.
    Faulted,
}

impl SessionGroupState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::OneTimeCompleted => "one_time_completed",
            Self::MarkedForDeletion => "marked_for_deletion",
            Self::Faulted => "faulted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "initialized" => Some(Self::Initialized),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "one_time_completed" => Some(Self::OneTimeCompleted),
            "marked_for_deletion" => Some(Self::MarkedForDeletion),
            "faulted" => Some(Self::Faulted),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::OneTimeCompleted | Self::MarkedForDeletion)
    }

    pub fn can_transition_to(&self, next: SessionGroupState) -> bool {
        use SessionGroupState::*;
        match (self, next) {
            (MarkedForDeletion, _) => false,
            (_, MarkedForDeletion) => true,
            (Initialized | Paused | Faulted, Running) => true,
            (Running, Paused | Completed | OneTimeCompleted | Faulted) => true,
            (Faulted, Paused | Completed) => true,
            (Paused, Completed) => true,
            // Completed and one-time-completed groups may be restarted.
            (Completed | OneTimeCompleted, Running) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionGroupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A session between a left and a right migration source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDefinition {
    pub id: Uuid,
    pub kind: SessionKind,
    pub direction: SessionDirection,
    pub left_source: Uuid,
    pub right_source: Uuid,
}

impl From<&SessionConfig> for SessionDefinition {
    fn from(cfg: &SessionConfig) -> Self {
        Self {
            id: cfg.id,
            kind: cfg.kind,
            direction: cfg.direction,
            left_source: cfg.left_source.id,
            right_source: cfg.right_source.id,
        }
    }
}

/// Sessions sharing a schedule, with their persisted state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionGroup {
    pub id: Uuid,
    pub name: String,
    pub state: SessionGroupState,
    pub frequency: WorkflowFrequency,
    pub interval_secs: Option<u64>,
    pub sessions: Vec<SessionDefinition>,
    pub updated_at: DateTime<Utc>,
}

impl SessionGroup {
    pub fn from_config(cfg: &SessionGroupConfig) -> Self {
        Self {
            id: cfg.id,
            name: cfg.name.clone(),
            state: SessionGroupState::Initialized,
            frequency: cfg.frequency,
            interval_secs: cfg.interval_secs,
            sessions: cfg.sessions.iter().map(SessionDefinition::from).collect(),
            updated_at: Utc::now(),
        }
    }
}

/// Fine-grained pipeline state driven by sync commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Default,
    Starting,
    Running,
    Pausing,
    Paused,
    PausingForConflict,
    PausedByConflict,
    Stopping,
    Stopped,
    StoppingSingleTrip,
    StoppedSingleTrip,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Pausing => "pausing",
            Self::Paused => "paused",
            Self::PausingForConflict => "pausing_for_conflict",
            Self::PausedByConflict => "paused_by_conflict",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::StoppingSingleTrip => "stopping_single_trip",
            Self::StoppedSingleTrip => "stopped_single_trip",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "default" => Some(Self::Default),
            "starting" => Some(Self::Starting),
            "running" => Some(Self::Running),
            "pausing" => Some(Self::Pausing),
            "paused" => Some(Self::Paused),
            "pausing_for_conflict" => Some(Self::PausingForConflict),
            "paused_by_conflict" => Some(Self::PausedByConflict),
            "stopping" => Some(Self::Stopping),
            "stopped" => Some(Self::Stopped),
            "stopping_single_trip" => Some(Self::StoppingSingleTrip),
            "stopped_single_trip" => Some(Self::StoppedSingleTrip),
            _ => None,
        }
    }

    /// States that settle once the in-flight command finishes.
    pub fn is_intermittent(&self) -> bool {
        matches!(
            self,
            Self::Starting
                | Self::Pausing
                | Self::PausingForConflict
                | Self::Stopping
                | Self::StoppingSingleTrip
        )
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands accepted by the pipeline state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncCommand {
    Start,
    StartNewTrip,
    Pause,
    PauseForConflict,
    Resume,
    Stop,
    StopCurrentTrip,
    /// The in-flight command reached its checkpoint.
    Finish,
}

impl std::fmt::Display for SyncCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::StartNewTrip => "start_new_trip",
            Self::Pause => "pause",
            Self::PauseForConflict => "pause_for_conflict",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::StopCurrentTrip => "stop_current_trip",
            Self::Finish => "finish",
        };
        f.write_str(s)
    }
}

/// Phase of a synchronization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Analysis,
    ConflictDetection,
    Migration,
    Idle,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::ConflictDetection => "conflict_detection",
            Self::Migration => "migration",
            Self::Idle => "idle",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "analysis" => Some(Self::Analysis),
            "conflict_detection" => Some(Self::ConflictDetection),
            "migration" => Some(Self::Migration),
            "idle" => Some(Self::Idle),
            _ => None,
        }
    }
}

/// Which side feeds the other within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    LeftToRight,
    RightToLeft,
}

impl SyncDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeftToRight => "left_to_right",
            Self::RightToLeft => "right_to_left",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "left_to_right" => Some(Self::LeftToRight),
            "right_to_left" => Some(Self::RightToLeft),
            _ => None,
        }
    }

    /// (source, target) for this direction.
    pub fn endpoints(&self, session: &SessionDefinition) -> (Uuid, Uuid) {
        match self {
            Self::LeftToRight => (session.left_source, session.right_source),
            Self::RightToLeft => (session.right_source, session.left_source),
        }
    }
}

/// Durable record of where a session's last pass got to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCheckpoint {
    pub session_id: Uuid,
    pub phase: SyncPhase,
    pub direction: SyncDirection,
    /// Last group whose migration committed.
    pub last_group_id: Option<i64>,
    pub updated_at: DateTime<Utc>,
}
