//! Session group definitions consumed at startup.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{SessionDirection, SessionKind, WorkflowFrequency};

/// One migration source endpoint. `adapter` names the provider the host
/// registers for this source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationSourceConfig {
    pub id: Uuid,
    pub name: String,
    pub adapter: String,
}

/// A synchronization session between two endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub id: Uuid,
    #[serde(default)]
    pub kind: SessionKind,
    #[serde(default)]
    pub direction: SessionDirection,
    pub left_source: MigrationSourceConfig,
    pub right_source: MigrationSourceConfig,
}

/// Sessions sharing a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionGroupConfig {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub frequency: WorkflowFrequency,
    /// Overrides `scheduler.idle_interval_secs` for this group.
    #[serde(default)]
    pub interval_secs: Option<u64>,
    #[serde(default)]
    pub sessions: Vec<SessionConfig>,
}
