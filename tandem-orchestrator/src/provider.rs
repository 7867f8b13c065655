//! Adapter contracts. An endpoint pairs the analysis side (reading history
//! from a migration source) with the migration side (writing change groups
//! to it). Calls block the session worker.

use std::sync::Arc;

use dashmap::DashMap;
use tandem_conflict::ConflictManager;
use tandem_core::errors::{AdapterError, SessionError, TandemResult};
use tandem_core::models::{ChangeGroup, ConversionResult, NewChangeAction, NewConflict};
use uuid::Uuid;

use crate::change_actions::ChangeActionRegistry;

/// One change read from a source, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaGroup {
    /// Source-native change identifier (changeset, revision).
    pub name: String,
    pub owner: String,
    pub actions: Vec<NewChangeAction>,
}

impl DeltaGroup {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: NewChangeAction) -> Self {
        self.actions.push(action);
        self
    }
}

/// Changes newer than the analysis cursor, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeltaTable {
    pub groups: Vec<DeltaGroup>,
    /// New cursor to persist once the groups are stored. `None` keeps the old one.
    pub high_water_mark: Option<String>,
}

pub trait IAnalysisProvider: Send + Sync {
    fn initialize_services(&self, _source_id: Uuid) -> Result<(), AdapterError> {
        Ok(())
    }

    fn initialize_client(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    /// Declare the change action kinds this endpoint can apply.
    fn register_supported_change_actions(&self, registry: &mut ChangeActionRegistry);

    fn register_conflict_types(&self, _manager: &ConflictManager) -> TandemResult<()> {
        Ok(())
    }

    /// Changes after `high_water_mark` (everything when `None`).
    fn generate_delta_table(&self, high_water_mark: Option<&str>) -> Result<DeltaTable, AdapterError>;

    /// Adapter-specific conflicts for a freshly stored group.
    fn detect_conflicts(&self, _group: &ChangeGroup) -> Result<Vec<NewConflict>, AdapterError> {
        Ok(Vec::new())
    }
}

pub trait IMigrationProvider: Send + Sync {
    fn establish_context(&self, _source_id: Uuid) -> Result<(), AdapterError> {
        Ok(())
    }

    fn register_conflict_types(&self, _manager: &ConflictManager) -> TandemResult<()> {
        Ok(())
    }

    /// Apply the group's effective actions, in order, to this endpoint.
    fn process_change_group(&self, group: &ChangeGroup) -> Result<ConversionResult, AdapterError>;
}

#[derive(Clone)]
pub struct Endpoint {
    pub analysis: Arc<dyn IAnalysisProvider>,
    pub migration: Arc<dyn IMigrationProvider>,
}

impl Endpoint {
    pub fn new(analysis: Arc<dyn IAnalysisProvider>, migration: Arc<dyn IMigrationProvider>) -> Self {
        Self { analysis, migration }
    }

    /// An endpoint whose adapter implements both sides.
    pub fn from_adapter<A>(adapter: Arc<A>) -> Self
    where
        A: IAnalysisProvider + IMigrationProvider + 'static,
    {
        Self {
            analysis: adapter.clone(),
            migration: adapter,
        }
    }
}

/// Endpoints keyed by migration source id.
#[derive(Default)]
pub struct EndpointRegistry {
    endpoints: DashMap<Uuid, Endpoint>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, source_id: Uuid, endpoint: Endpoint) {
        self.endpoints.insert(source_id, endpoint);
    }

    pub fn get(&self, source_id: Uuid) -> TandemResult<Endpoint> {
        self.endpoints
            .get(&source_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| SessionError::EndpointNotRegistered(source_id.to_string()).into())
    }

    pub fn contains(&self, source_id: Uuid) -> bool {
        self.endpoints.contains_key(&source_id)
    }
}
