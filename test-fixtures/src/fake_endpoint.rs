//! In-memory endpoint implementing both adapter sides and the diff listing.
//!
//! History is a list of changes numbered from 1; the high-water mark is the
//! last number handed out. Migrated groups are committed as new changes, so
//! the next analysis of this endpoint sees them (and must suppress them).

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tandem_core::errors::AdapterError;
use tandem_core::models::{ChangeActionKind, ChangeGroup, ConversionResult, NewChangeAction, NewConflict};
use tandem_orchestrator::{ChangeActionRegistry, DeltaGroup, DeltaTable, IAnalysisProvider, IMigrationProvider};
use tandem_serverdiff::{DiffItem, IDiffProvider};
use uuid::Uuid;

/// A failure the next matching adapter call produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    Transient(String),
    Fatal(String),
    Panic(String),
}

impl Failure {
    fn raise(self) -> AdapterError {
        match self {
            Failure::Transient(msg) => AdapterError::Transient(msg),
            Failure::Fatal(msg) => AdapterError::Fatal(msg),
            Failure::Panic(msg) => panic!("{msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeChange {
    pub id: String,
    pub owner: String,
    pub actions: Vec<NewChangeAction>,
    /// Name of the source change this one was migrated from.
    pub migrated_from: Option<String>,
}

#[derive(Default)]
struct State {
    changes: Vec<FakeChange>,
    items: BTreeMap<String, Vec<u8>>,
    applied: Vec<String>,
    analysis_failures: VecDeque<Failure>,
    process_failures: VecDeque<Failure>,
    detected: HashMap<String, Vec<NewConflict>>,
    conversion_conflicts: HashMap<String, Vec<NewConflict>>,
    analysis_calls: usize,
    process_calls: usize,
}

impl State {
    fn apply(&mut self, action: &NewChangeAction) {
        match action.kind {
            ChangeActionKind::Delete => {
                self.items.remove(&action.path);
            }
            ChangeActionKind::Rename => {
                let moved = action
                    .from_path
                    .as_ref()
                    .and_then(|from| self.items.remove(from))
                    .unwrap_or_default();
                self.items.insert(action.path.clone(), moved);
            }
            ChangeActionKind::AddFileProperties | ChangeActionKind::Custom(_) => {}
            _ => {
                self.items
                    .insert(action.path.clone(), action.version.clone().into_bytes());
            }
        }
    }

    fn commit(&mut self, owner: &str, actions: Vec<NewChangeAction>, migrated_from: Option<String>) -> String {
        for action in &actions {
            self.apply(action);
        }
        let id = (self.changes.len() + 1).to_string();
        self.changes.push(FakeChange {
            id: id.clone(),
            owner: owner.to_string(),
            actions,
            migrated_from,
        });
        id
    }
}

/// Action content is its `version` string.
pub struct FakeEndpoint {
    name: String,
    supported: Vec<ChangeActionKind>,
    honor_high_water_mark: bool,
    process_delay: Mutex<Duration>,
    state: Mutex<State>,
}

impl FakeEndpoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supported: vec![
                ChangeActionKind::Add,
                ChangeActionKind::Edit,
                ChangeActionKind::Delete,
                ChangeActionKind::Rename,
            ],
            honor_high_water_mark: true,
            process_delay: Mutex::new(Duration::ZERO),
            state: Mutex::new(State::default()),
        }
    }

    pub fn supporting(mut self, kinds: impl IntoIterator<Item = ChangeActionKind>) -> Self {
        self.supported = kinds.into_iter().collect();
        self
    }

    /// Report the whole history on every analysis, as an adapter that lost
    /// its cursor would.
    pub fn ignoring_high_water_mark(mut self) -> Self {
        self.honor_high_water_mark = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Commit a change made directly on this endpoint. Returns its id.
    pub fn commit(&self, owner: &str, actions: Vec<NewChangeAction>) -> String {
        self.state().commit(owner, actions, None)
    }

    pub fn edit(&self, path: &str, content: &str) -> String {
        self.commit(
            "dev",
            vec![NewChangeAction::new(ChangeActionKind::Edit, path).with_version(content)],
        )
    }

    pub fn fail_next_analysis(&self, failure: Failure) {
        self.state().analysis_failures.push_back(failure);
    }

    pub fn fail_next_process(&self, failure: Failure) {
        self.state().process_failures.push_back(failure);
    }

    /// Report `conflict` from conflict detection of the change named `change`.
    pub fn detect_on(&self, change: &str, conflict: NewConflict) {
        self.state()
            .detected
            .entry(change.to_string())
            .or_default()
            .push(conflict);
    }

    /// Return `conflict` instead of applying the change named `change`, once.
    pub fn conflict_on_apply(&self, change: &str, conflict: NewConflict) {
        self.state()
            .conversion_conflicts
            .entry(change.to_string())
            .or_default()
            .push(conflict);
    }

    pub fn set_process_delay(&self, delay: Duration) {
        *self.process_delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Source change names applied to this endpoint, in order.
    pub fn applied(&self) -> Vec<String> {
        self.state().applied.clone()
    }

    pub fn changes(&self) -> Vec<FakeChange> {
        self.state().changes.clone()
    }

    pub fn item(&self, path: &str) -> Option<Vec<u8>> {
        self.state().items.get(path).cloned()
    }

    /// Remove an item behind the engine's back.
    pub fn tamper_remove(&self, path: &str) {
        self.state().items.remove(path);
    }

    /// Drop a change from history behind the engine's back.
    pub fn tamper_forget(&self, change_id: &str) {
        self.state().changes.retain(|c| c.id != change_id);
    }

    pub fn analysis_calls(&self) -> usize {
        self.state().analysis_calls
    }

    pub fn process_calls(&self) -> usize {
        self.state().process_calls
    }
}

impl IAnalysisProvider for FakeEndpoint {
    fn register_supported_change_actions(&self, registry: &mut ChangeActionRegistry) {
        registry.register_all(self.supported.iter().cloned());
    }

    fn generate_delta_table(&self, high_water_mark: Option<&str>) -> Result<DeltaTable, AdapterError> {
        let mut state = self.state();
        state.analysis_calls += 1;
        if let Some(failure) = state.analysis_failures.pop_front() {
            drop(state);
            return Err(failure.raise());
        }

        let after = if self.honor_high_water_mark {
            high_water_mark.and_then(|m| m.parse::<usize>().ok()).unwrap_or(0)
        } else {
            0
        };
        let groups = state
            .changes
            .iter()
            .skip(after)
            .map(|c| DeltaGroup {
                name: c.id.clone(),
                owner: c.owner.clone(),
                actions: c.actions.clone(),
            })
            .collect();
        Ok(DeltaTable {
            groups,
            high_water_mark: Some(state.changes.len().to_string()),
        })
    }

    fn detect_conflicts(&self, group: &ChangeGroup) -> Result<Vec<NewConflict>, AdapterError> {
        Ok(self.state().detected.remove(&group.name).unwrap_or_default())
    }
}

impl IMigrationProvider for FakeEndpoint {
    fn process_change_group(&self, group: &ChangeGroup) -> Result<ConversionResult, AdapterError> {
        let delay = *self.process_delay.lock().unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = self.state();
        state.process_calls += 1;
        if let Some(failure) = state.process_failures.pop_front() {
            drop(state);
            return Err(failure.raise());
        }
        if let Some(conflicts) = state.conversion_conflicts.remove(&group.name) {
            return Ok(ConversionResult {
                conflicts,
                ..ConversionResult::default()
            });
        }

        let actions: Vec<NewChangeAction> = group.effective_actions().map(NewChangeAction::from).collect();
        let paths: Vec<String> = actions
            .iter()
            .filter(|a| a.kind != ChangeActionKind::Delete)
            .map(|a| a.path.clone())
            .collect();
        let id = state.commit(&group.owner, actions, Some(group.name.clone()));
        state.applied.push(group.name.clone());

        Ok(paths
            .into_iter()
            .fold(ConversionResult::applied(id), |result, path| {
                result.with_item(path.clone(), path)
            }))
    }
}

impl IDiffProvider for FakeEndpoint {
    fn list_items(&self, _root: &str) -> Result<Vec<DiffItem>, AdapterError> {
        Ok(self
            .state()
            .items
            .iter()
            .map(|(path, content)| DiffItem::file(path.clone(), content.clone()))
            .collect())
    }

    fn change_exists(&self, change_id: &str) -> Result<bool, AdapterError> {
        Ok(self.state().changes.iter().any(|c| c.id == change_id))
    }
}

/// A conflict as an adapter reports it; the orchestrator fills in the
/// session scope and the group link.
pub fn adapter_conflict(conflict_type: Uuid, scope_hint: &str, details: &str) -> NewConflict {
    NewConflict::new(conflict_type, Uuid::nil(), Uuid::nil(), scope_hint, details)
}
