//! Session groups and recorded endpoint histories for integration tests.

use chrono::Utc;
use serde::Deserialize;
use tandem_core::models::{
    ChangeActionKind, NewChangeAction, SessionDefinition, SessionDirection, SessionGroup,
    SessionGroupState, SessionKind, WorkflowFrequency,
};
use uuid::Uuid;

use crate::fake_endpoint::FakeEndpoint;

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioFixture {
    pub name: String,
    pub left: Vec<FixtureChange>,
    #[serde(default)]
    pub right: Vec<FixtureChange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureChange {
    pub owner: String,
    pub actions: Vec<FixtureAction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureAction {
    pub kind: ChangeActionKind,
    pub path: String,
    #[serde(default)]
    pub from_path: Option<String>,
    #[serde(default)]
    pub content: String,
}

impl FixtureAction {
    fn to_action(&self) -> NewChangeAction {
        let action = NewChangeAction::new(self.kind.clone(), self.path.clone()).with_version(self.content.clone());
        match &self.from_path {
            Some(from) => action.with_from_path(from.clone()),
            None => action,
        }
    }
}

/// Commit `changes` to `endpoint` in order. Returns the change ids.
pub fn replay(endpoint: &FakeEndpoint, changes: &[FixtureChange]) -> Vec<String> {
    changes
        .iter()
        .map(|c| endpoint.commit(&c.owner, c.actions.iter().map(FixtureAction::to_action).collect()))
        .collect()
}

/// A group with a single version-control session between two sources.
pub fn session_group(
    frequency: WorkflowFrequency,
    direction: SessionDirection,
    left: Uuid,
    right: Uuid,
) -> SessionGroup {
    SessionGroup {
        id: Uuid::new_v4(),
        name: format!("group-{}", &Uuid::new_v4().simple().to_string()[..8]),
        state: SessionGroupState::Initialized,
        frequency,
        interval_secs: None,
        sessions: vec![SessionDefinition {
            id: Uuid::new_v4(),
            kind: SessionKind::VersionControl,
            direction,
            left_source: left,
            right_source: right,
        }],
        updated_at: Utc::now(),
    }
}
