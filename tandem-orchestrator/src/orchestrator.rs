//! SessionOrchestrator: one synchronization pass over a session group.
//!
//! Per session and direction: Analysis (delta table into the store),
//! ConflictDetection (re-evaluate Unresolved conflicts against current
//! rules), Migration (pending groups in creation order to the target).
//! Control signals are honored between change groups only.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tandem_conflict::ConflictManager;
use tandem_core::config::SchedulerConfig;
use tandem_core::constants::{GENERIC_CONFLICT_TYPE, UNSUPPORTED_CHANGE_ACTION_CONFLICT_TYPE};
use tandem_core::errors::{AdapterError, SessionError, TandemResult};
use tandem_core::models::{
    ChangeGroup, ChangeGroupId, ChangeGroupStatus, ConflictResolutionResult, ConflictStatus,
    ConversionHistoryEntry, NewConflict, ResolutionOutcome, SessionCheckpoint, SessionDefinition,
    SessionDirection, SessionGroup, SyncDirection, SyncOrchestrationOption, SyncPhase,
};
use tandem_observability::{events, spans};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::change_actions::{paths_overlap, ChangeActionRegistry};
use crate::control::{self, ControlSignal};
use crate::error_routing::{ErrorRoute, ErrorRouter};
use crate::provider::{Endpoint, EndpointRegistry, IMigrationProvider};
use crate::retry;
use crate::store::SyncStore;

/// Why a pass ended before visiting every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassInterruption {
    Paused,
    Stopped,
    TripStopped,
    /// A conflict of a type whose orchestration option stops the session.
    PausedByConflict,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub trip: u64,
    /// Groups created by Analysis.
    pub analyzed: usize,
    /// Deltas dropped because this system wrote them.
    pub echoes_suppressed: usize,
    pub conflicts_resolved: usize,
    pub migrated: usize,
    /// Groups left Conflicted.
    pub blocked: usize,
    /// Groups backlogged behind an earlier blocked group.
    pub deferred: usize,
    pub skipped: usize,
    /// Groups held by a retry-scheduled conflict.
    pub awaiting_retry: usize,
    pub interruption: Option<PassInterruption>,
}

impl PassReport {
    /// Nothing new was read and nothing moved.
    pub fn is_idle(&self) -> bool {
        self.analyzed == 0 && self.migrated == 0 && self.interruption.is_none()
    }
}

type BlockedPaths = Vec<(ChangeGroupId, Vec<String>)>;

pub struct SessionOrchestrator {
    group: SessionGroup,
    store: Arc<dyn SyncStore>,
    conflicts: Arc<ConflictManager>,
    endpoints: HashMap<Uuid, Endpoint>,
    change_actions: HashMap<Uuid, ChangeActionRegistry>,
    config: SchedulerConfig,
    errors: ErrorRouter,
    trip: u64,
    conflict_stop: Option<PassInterruption>,
}

impl SessionOrchestrator {
    /// Fails with `EndpointNotRegistered` if any session source lacks an
    /// endpoint, or `ConfigError` for a malformed error signature.
    pub fn new(
        group: SessionGroup,
        store: Arc<dyn SyncStore>,
        conflicts: Arc<ConflictManager>,
        endpoints: &EndpointRegistry,
        config: SchedulerConfig,
    ) -> TandemResult<Self> {
        let mut resolved = HashMap::new();
        for session in &group.sessions {
            for source in [session.left_source, session.right_source] {
                if !resolved.contains_key(&source) {
                    resolved.insert(source, endpoints.get(source)?);
                }
            }
        }
        let errors = ErrorRouter::from_config(&config.error_routing)?;
        Ok(Self {
            group,
            store,
            conflicts,
            endpoints: resolved,
            change_actions: HashMap::new(),
            config,
            errors,
            trip: 0,
            conflict_stop: None,
        })
    }

    pub fn session_group(&self) -> &SessionGroup {
        &self.group
    }

    pub fn trip(&self) -> u64 {
        self.trip
    }

    /// Initialize every endpoint, collect their supported change actions and
    /// let both provider sides register their conflict types.
    #[instrument(skip(self), fields(session_group_id = %self.group.id))]
    pub fn initialize(&mut self) -> TandemResult<()> {
        for (source_id, endpoint) in &self.endpoints {
            let analysis = &endpoint.analysis;
            let migration = &endpoint.migration;
            retry::guarded("initialize_services", || analysis.initialize_services(*source_id))?;
            retry::guarded("initialize_client", || analysis.initialize_client())?;
            retry::guarded("establish_context", || migration.establish_context(*source_id))?;

            let mut registry = ChangeActionRegistry::new();
            analysis.register_supported_change_actions(&mut registry);
            analysis.register_conflict_types(&self.conflicts)?;
            migration.register_conflict_types(&self.conflicts)?;
            debug!(%source_id, change_actions = registry.len(), "endpoint initialized");
            self.change_actions.insert(*source_id, registry);
        }

        for session in &self.group.sessions {
            if let Some(checkpoint) = self.store.get_checkpoint(session.id)? {
                info!(
                    session_id = %session.id,
                    phase = checkpoint.phase.as_str(),
                    direction = checkpoint.direction.as_str(),
                    last_group_id = ?checkpoint.last_group_id,
                    "resuming from checkpoint"
                );
            }
        }
        Ok(())
    }

    /// Run one pass over every session of the group.
    pub fn run_pass(&mut self, control: &watch::Receiver<ControlSignal>) -> TandemResult<PassReport> {
        self.trip += 1;
        self.conflict_stop = None;
        let span = spans::pass_span(self.group.id, self.trip);
        let _enter = span.enter();

        let mut report = PassReport {
            trip: self.trip,
            ..PassReport::default()
        };
        let sessions = self.group.sessions.clone();
        'sessions: for session in &sessions {
            for &direction in directions(session) {
                if let Some(stop) = self.interruption(control) {
                    report.interruption = Some(stop);
                    break 'sessions;
                }
                self.analyze(session, direction, control, &mut report)?;
                self.reevaluate(session, direction, &mut report)?;
                self.migrate(session, direction, control, &mut report)?;
                if report.interruption.is_some() {
                    break 'sessions;
                }
            }
        }
        if report.interruption.is_none() {
            report.interruption = self.conflict_stop;
        }

        events::pass_completed(self.group.id, self.trip, report.analyzed, report.migrated, report.blocked);
        Ok(report)
    }

    fn interruption(&self, control: &watch::Receiver<ControlSignal>) -> Option<PassInterruption> {
        match control::current(control) {
            ControlSignal::Run => self.conflict_stop,
            ControlSignal::Pause => Some(PassInterruption::Paused),
            ControlSignal::StopCurrentTrip => Some(PassInterruption::TripStopped),
            ControlSignal::Stop => Some(PassInterruption::Stopped),
        }
    }

    fn endpoint(&self, source_id: Uuid) -> TandemResult<Endpoint> {
        self.endpoints
            .get(&source_id)
            .cloned()
            .ok_or_else(|| SessionError::EndpointNotRegistered(source_id.to_string()).into())
    }

    // ── Analysis ────────────────────────────────────────────────────────────

    fn analyze(
        &mut self,
        session: &SessionDefinition,
        direction: SyncDirection,
        control: &watch::Receiver<ControlSignal>,
        report: &mut PassReport,
    ) -> TandemResult<()> {
        let (source, _) = direction.endpoints(session);
        let span = spans::phase_span(session.id, SyncPhase::Analysis.as_str(), direction.as_str());
        let _enter = span.enter();

        let analysis = self.endpoint(source)?.analysis;
        let cursor = self.store.get_high_water_mark(session.id, source)?;
        let delta = match retry::with_retry(&self.config, "generate_delta_table", control, || {
            analysis.generate_delta_table(cursor.as_deref())
        }) {
            Ok(delta) => delta,
            Err(e) => {
                self.raise_adapter_failure(session.id, source, None, &format!("analysis of {source}"), &e)?;
                return Ok(());
            }
        };

        for delta_group in delta.groups {
            if self.store.is_migrated_change(source, &delta_group.name)? {
                debug!(name = %delta_group.name, "skipping change written by migration");
                report.echoes_suppressed += 1;
                continue;
            }
            if self.store.find_group_by_name(source, &delta_group.name)?.is_some() {
                debug!(name = %delta_group.name, "change group already recorded");
                continue;
            }
            let id = self.store.create_group_with_actions(
                source,
                &delta_group.name,
                &delta_group.owner,
                &delta_group.actions,
            )?;
            report.analyzed += 1;

            let Some(group) = self.store.get_group(id)? else {
                continue;
            };
            match retry::guarded("detect_conflicts", || analysis.detect_conflicts(&group)) {
                Ok(found) => {
                    for conflict in found {
                        self.raise(in_session(conflict, session.id, source, id))?;
                    }
                }
                Err(e) => {
                    let context = format!("conflict detection for {}", group.name);
                    self.raise_adapter_failure(session.id, source, Some(id), &context, &e)?;
                }
            }
        }

        if let Some(mark) = delta.high_water_mark {
            self.store.set_high_water_mark(session.id, source, &mark)?;
        }
        self.checkpoint(session.id, SyncPhase::Analysis, direction, None)
    }

    // ── Conflict detection ──────────────────────────────────────────────────

    fn reevaluate(
        &mut self,
        session: &SessionDefinition,
        direction: SyncDirection,
        report: &mut PassReport,
    ) -> TandemResult<()> {
        let span = spans::phase_span(session.id, SyncPhase::ConflictDetection.as_str(), direction.as_str());
        let _enter = span.enter();

        let resolved = self.conflicts.reevaluate_unresolved(session.id)?;
        report.conflicts_resolved += resolved.len();
        self.checkpoint(session.id, SyncPhase::ConflictDetection, direction, None)
    }

    // ── Migration ───────────────────────────────────────────────────────────

    fn migrate(
        &mut self,
        session: &SessionDefinition,
        direction: SyncDirection,
        control: &watch::Receiver<ControlSignal>,
        report: &mut PassReport,
    ) -> TandemResult<()> {
        let (source, target) = direction.endpoints(session);
        let span = spans::phase_span(session.id, SyncPhase::Migration.as_str(), direction.as_str());
        let _enter = span.enter();

        let released = self.store.release_backlog(source)?;
        if !released.is_empty() {
            debug!(released = released.len(), "backlogged change groups released");
        }
        let migration = self.endpoint(target)?.migration;
        let mut blocked: BlockedPaths = self
            .store
            .get_blocked_groups(source)?
            .iter()
            .map(|g| (g.id, touched(g)))
            .collect();

        // Groups held by a retry stay pending; widen each batch past them.
        let mut seen = HashSet::new();
        loop {
            let limit = seen.len() + self.config.migration_batch_size.max(1);
            let fresh: Vec<ChangeGroup> = self
                .store
                .get_pending_groups(source, limit)?
                .into_iter()
                .filter(|g| seen.insert(g.id))
                .collect();
            if fresh.is_empty() {
                break;
            }
            for group in fresh {
                if let Some(stop) = self.interruption(control) {
                    report.interruption = Some(stop);
                    return Ok(());
                }
                let step = Step {
                    session_id: session.id,
                    direction,
                    source,
                    target,
                };
                self.migrate_group(&step, migration.as_ref(), group, &mut blocked, control, report)?;
            }
        }
        Ok(())
    }

    fn migrate_group(
        &mut self,
        step: &Step,
        migration: &dyn IMigrationProvider,
        group: ChangeGroup,
        blocked: &mut BlockedPaths,
        control: &watch::Receiver<ControlSignal>,
        report: &mut PassReport,
    ) -> TandemResult<()> {
        let span = spans::change_group_span(group.id.0, &group.name);
        let _enter = span.enter();

        let earlier = blocked
            .iter()
            .find(|(id, paths)| {
                *id < group.id && group.touched_paths().any(|p| paths.iter().any(|b| paths_overlap(b, p)))
            })
            .map(|(id, _)| *id);
        if let Some(earlier) = earlier {
            self.store.mark_contains_backlog(group.id)?;
            let reason = format!("touches a path of blocked change group {earlier}");
            events::change_group_deferred(group.id.0, &group.name, &reason);
            blocked.push((group.id, touched(&group)));
            report.deferred += 1;
            return Ok(());
        }

        let unsupported: Vec<NewConflict> = self
            .change_actions
            .get(&step.target)
            .map(|registry| {
                registry
                    .unsupported(&group)
                    .into_iter()
                    .map(|a| {
                        NewConflict::new(
                            UNSUPPORTED_CHANGE_ACTION_CONFLICT_TYPE,
                            step.session_id,
                            step.source,
                            a.path.clone(),
                            format!("target endpoint does not support {} actions", a.kind),
                        )
                        .for_group(group.id, Some(a.id))
                    })
                    .collect()
            })
            .unwrap_or_default();
        let group = if unsupported.is_empty() {
            group
        } else {
            for conflict in unsupported {
                self.raise(conflict)?;
            }
            match self.store.get_group(group.id)? {
                Some(g) => g,
                None => return Ok(()),
            }
        };
        if self.settle(&group, blocked, report)? {
            return Ok(());
        }

        self.store.mark_in_progress(group.id)?;
        let conversion = match retry::with_retry(&self.config, "process_change_group", control, || {
            migration.process_change_group(&group)
        }) {
            Ok(conversion) => conversion,
            Err(e) => {
                let context = format!("migration of {}", group.name);
                self.raise_adapter_failure(step.session_id, step.source, Some(group.id), &context, &e)?;
                return self.hold(group.id, blocked, report);
            }
        };

        let mut held = false;
        for conflict in conversion.conflicts.iter().cloned() {
            let result = self.raise(in_session(conflict, step.session_id, step.source, group.id))?;
            held |= result.status != ConflictStatus::Resolved;
        }
        if held {
            return self.hold(group.id, blocked, report);
        }

        if let Some(target_change_id) = &conversion.target_change_id {
            self.store.record_conversion(&ConversionHistoryEntry {
                session_id: step.session_id,
                source_id: step.source,
                source_change_id: group.name.clone(),
                target_source_id: step.target,
                target_change_id: target_change_id.clone(),
                items: conversion.item_conversions.clone(),
                recorded_at: Utc::now(),
            })?;
        }
        self.conflicts.resolve_retried_for_group(group.id)?;
        self.store.complete(group.id)?;
        self.checkpoint(step.session_id, SyncPhase::Migration, step.direction, Some(group.id))?;

        events::change_group_migrated(
            group.id.0,
            &group.name,
            conversion.target_change_id.as_deref(),
            group.effective_actions().count(),
        );
        report.migrated += 1;
        Ok(())
    }

    /// Count a group that cannot be applied now. Returns true if it was
    /// blocked, skipped or left with nothing to apply.
    fn settle(&self, group: &ChangeGroup, blocked: &mut BlockedPaths, report: &mut PassReport) -> TandemResult<bool> {
        if group.status.is_blocked() {
            blocked.push((group.id, touched(group)));
            report.blocked += 1;
            return Ok(true);
        }
        if group.status == ChangeGroupStatus::Skipped {
            report.skipped += 1;
            return Ok(true);
        }
        if group.effective_actions().next().is_none() {
            self.store.skip(group.id)?;
            debug!(group_id = group.id.0, "change group has no actions left, skipped");
            report.skipped += 1;
            return Ok(true);
        }
        Ok(false)
    }

    /// Re-read a group a conflict just touched and count where it ended up.
    fn hold(&self, id: ChangeGroupId, blocked: &mut BlockedPaths, report: &mut PassReport) -> TandemResult<()> {
        let Some(group) = self.store.get_group(id)? else {
            return Ok(());
        };
        if !self.settle(&group, blocked, report)? {
            report.awaiting_retry += 1;
        }
        Ok(())
    }

    // ── Conflicts ───────────────────────────────────────────────────────────

    /// Detect and resolve, remembering an escalation that asks to stop.
    fn raise(&mut self, conflict: NewConflict) -> TandemResult<ConflictResolutionResult> {
        let result = self.conflicts.detect_and_resolve(&conflict)?;
        if let ResolutionOutcome::Blocked { orchestration } = result.outcome {
            match orchestration {
                SyncOrchestrationOption::Continue => {}
                SyncOrchestrationOption::StopCurrentTrip => {
                    if self.conflict_stop.is_none() {
                        self.conflict_stop = Some(PassInterruption::TripStopped);
                    }
                }
                SyncOrchestrationOption::StopSession => {
                    self.conflict_stop = Some(PassInterruption::PausedByConflict);
                }
            }
        }
        Ok(result)
    }

    /// Adapter failures surface as generic conflicts. The session keeps going
    /// until the failure's error signature reaches its occurrence limit.
    fn raise_adapter_failure(
        &mut self,
        session_id: Uuid,
        source: Uuid,
        group: Option<ChangeGroupId>,
        context: &str,
        error: &AdapterError,
    ) -> TandemResult<ConflictResolutionResult> {
        warn!(%session_id, %source, context, error = %error, "adapter call failed");
        let conflict = NewConflict::new(
            GENERIC_CONFLICT_TYPE,
            session_id,
            source,
            format!("{context}: {error}"),
            error.to_string(),
        );
        let conflict = match group {
            Some(id) => conflict.for_group(id, None),
            None => conflict,
        };
        let result = self.raise(conflict)?;

        match self.errors.route(error) {
            ErrorRoute::Conflict { occurrences, limit } => {
                debug!(%session_id, occurrences, limit, "adapter failure routed to conflict");
                Ok(result)
            }
            ErrorRoute::StopSession {
                signature,
                occurrences,
                limit,
            } => {
                events::error_limit_reached(self.group.id, &signature, occurrences, limit);
                Err(SessionError::ErrorLimitExceeded {
                    signature,
                    occurrences,
                    limit,
                }
                .into())
            }
        }
    }

    fn checkpoint(
        &self,
        session_id: Uuid,
        phase: SyncPhase,
        direction: SyncDirection,
        last_group: Option<ChangeGroupId>,
    ) -> TandemResult<()> {
        self.store.save_checkpoint(&SessionCheckpoint {
            session_id,
            phase,
            direction,
            last_group_id: last_group.map(|g| g.0),
            updated_at: Utc::now(),
        })
    }
}

/// Endpoints of the session direction being migrated.
struct Step {
    session_id: Uuid,
    direction: SyncDirection,
    source: Uuid,
    target: Uuid,
}

fn directions(session: &SessionDefinition) -> &'static [SyncDirection] {
    match session.direction {
        SessionDirection::Unidirectional => &[SyncDirection::LeftToRight],
        SessionDirection::Bidirectional => &[SyncDirection::LeftToRight, SyncDirection::RightToLeft],
    }
}

fn touched(group: &ChangeGroup) -> Vec<String> {
    group.touched_paths().map(str::to_string).collect()
}

/// Adapters report conflicts without knowing the session: scope them to it
/// and link the group being processed unless another link was given.
fn in_session(mut conflict: NewConflict, session_id: Uuid, source: Uuid, group: ChangeGroupId) -> NewConflict {
    conflict.scope_id = session_id;
    conflict.source_id = source;
    if conflict.change_group_id.is_none() {
        conflict.change_group_id = Some(group);
    }
    conflict
}
