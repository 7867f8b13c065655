//! JobScheduler: one background worker per running session group.
//!
//! A worker runs passes on the blocking pool (adapter calls block), so a
//! slow endpoint never stalls the runtime. Pause, stop and trip requests
//! travel over a watch channel and take effect between change groups. A
//! failing pass faults only its own group, which is retried after
//! `fault_retry_delay_secs` up to `max_fault_retries` times. A pass stopped
//! by an error signature's occurrence limit is not retried.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use tandem_conflict::handler::panic_message;
use tandem_conflict::ConflictManager;
use tandem_core::config::{SchedulerConfig, SessionGroupConfig};
use tandem_core::errors::{AdapterError, SessionError, TandemError, TandemResult};
use tandem_core::models::{PipelineState, SessionGroup, SessionGroupState, SyncCommand, WorkflowFrequency};
use tandem_observability::events;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::control::{self, ControlSignal};
use crate::orchestrator::{PassInterruption, SessionOrchestrator};
use crate::provider::EndpointRegistry;
use crate::state_machine::PipelineStateMachine;
use crate::store::SyncStore;

/// Persisted pipeline state machine shared by the scheduler and a worker.
struct Pipeline {
    group_id: Uuid,
    machine: Mutex<PipelineStateMachine>,
    store: Arc<dyn SyncStore>,
}

impl Pipeline {
    fn new(group_id: Uuid, store: Arc<dyn SyncStore>) -> Self {
        Self {
            group_id,
            machine: Mutex::new(PipelineStateMachine::default()),
            store,
        }
    }

    fn command(&self, command: SyncCommand) -> TandemResult<PipelineState> {
        let to = {
            let mut machine = self.machine.lock().unwrap_or_else(PoisonError::into_inner);
            machine.apply(command)?.1
        };
        self.store.save_pipeline_state(self.group_id, to)?;
        debug!(session_group_id = %self.group_id, %command, state = %to, "pipeline command applied");
        Ok(to)
    }

    /// Settle an intermittent state once the worker reached a boundary.
    fn settle(&self) {
        let settled = {
            let mut machine = self.machine.lock().unwrap_or_else(PoisonError::into_inner);
            machine.finish()
        };
        if let Some((_, to)) = settled {
            if let Err(e) = self.store.save_pipeline_state(self.group_id, to) {
                warn!(session_group_id = %self.group_id, error = %e, "failed to persist pipeline state");
            }
        }
    }

    fn state(&self) -> PipelineState {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner).state()
    }
}

/// Move a session group to `next`, emitting the state change. Re-entering
/// the current state is a no-op.
fn transition_group(store: &dyn SyncStore, group_id: Uuid, next: SessionGroupState) -> TandemResult<()> {
    let group = store
        .get_session_group(group_id)?
        .ok_or_else(|| SessionError::SessionGroupNotFound(group_id.to_string()))?;
    if group.state == next {
        return Ok(());
    }
    if !group.state.can_transition_to(next) {
        return Err(SessionError::InvalidTransition {
            group_id: group_id.to_string(),
            from: group.state.to_string(),
            to: next.to_string(),
        }
        .into());
    }
    store.set_session_group_state(group_id, next)?;
    events::session_state_changed(group_id, group.state.as_str(), next.as_str());
    Ok(())
}

struct WorkerHandle {
    control: Arc<watch::Sender<ControlSignal>>,
    pipeline: Arc<Pipeline>,
    task: JoinHandle<()>,
}

struct WorkerContext {
    group_id: Uuid,
    frequency: WorkflowFrequency,
    idle: Duration,
    config: SchedulerConfig,
    store: Arc<dyn SyncStore>,
    pipeline: Arc<Pipeline>,
    control: Arc<watch::Sender<ControlSignal>>,
}

impl WorkerContext {
    fn set_state(&self, next: SessionGroupState) {
        if let Err(e) = transition_group(self.store.as_ref(), self.group_id, next) {
            warn!(session_group_id = %self.group_id, error = %e, "session group state not updated");
        }
    }

    /// Worker-initiated command; an illegal one only means a user command
    /// got there first.
    fn command(&self, command: SyncCommand) {
        if let Err(e) = self.pipeline.command(command) {
            debug!(session_group_id = %self.group_id, error = %e, "pipeline command skipped");
        }
    }
}

/// Wait until the signal leaves `signal`. False once a stop is requested.
async fn wait_while(control: &mut watch::Receiver<ControlSignal>, signal: ControlSignal) -> bool {
    loop {
        let current = *control.borrow_and_update();
        if current == ControlSignal::Stop {
            return false;
        }
        if current != signal {
            return true;
        }
        if control.changed().await.is_err() {
            return false;
        }
    }
}

/// Cancellable sleep: any control change ends it early, and a pending
/// non-run signal skips it. False once a stop is requested.
async fn sleep_or_signal(control: &mut watch::Receiver<ControlSignal>, duration: Duration) -> bool {
    match *control.borrow_and_update() {
        ControlSignal::Stop => return false,
        ControlSignal::Run => {}
        ControlSignal::Pause | ControlSignal::StopCurrentTrip => return true,
    }
    let changed = tokio::select! {
        _ = tokio::time::sleep(duration) => return true,
        changed = control.changed() => changed.is_ok(),
    };
    changed && control::current(control) != ControlSignal::Stop
}

async fn run_worker(
    ctx: WorkerContext,
    mut orchestrator: SessionOrchestrator,
    mut control: watch::Receiver<ControlSignal>,
) {
    ctx.pipeline.settle();
    let mut faults = 0u32;

    loop {
        match control::current(&control) {
            ControlSignal::Stop => break,
            ControlSignal::Pause => {
                ctx.pipeline.settle();
                ctx.set_state(SessionGroupState::Paused);
                if !wait_while(&mut control, ControlSignal::Pause).await {
                    break;
                }
                ctx.pipeline.settle();
                ctx.set_state(SessionGroupState::Running);
                continue;
            }
            ControlSignal::StopCurrentTrip => {
                ctx.pipeline.settle();
                if !wait_while(&mut control, ControlSignal::StopCurrentTrip).await {
                    break;
                }
                ctx.pipeline.settle();
                continue;
            }
            ControlSignal::Run => {}
        }

        let rx = control.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let result = catch_unwind(AssertUnwindSafe(|| orchestrator.run_pass(&rx)));
            (orchestrator, result)
        })
        .await;
        let (returned, result) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                error!(session_group_id = %ctx.group_id, error = %e, "session worker lost");
                ctx.set_state(SessionGroupState::Faulted);
                return;
            }
        };
        orchestrator = returned;
        let result = result.unwrap_or_else(|payload| {
            Err(TandemError::AdapterError(AdapterError::Fatal(format!(
                "sync pass panicked: {}",
                panic_message(payload.as_ref())
            ))))
        });

        let report = match result {
            Ok(report) => {
                if faults > 0 {
                    faults = 0;
                    ctx.set_state(SessionGroupState::Running);
                }
                report
            }
            Err(e) => {
                faults += 1;
                events::session_faulted(ctx.group_id, &e.to_string(), faults);
                ctx.set_state(SessionGroupState::Faulted);
                if matches!(e, TandemError::SessionError(SessionError::ErrorLimitExceeded { .. })) {
                    error!(session_group_id = %ctx.group_id, "error limit reached, worker exiting without retry");
                    return;
                }
                if faults > ctx.config.max_fault_retries {
                    error!(session_group_id = %ctx.group_id, faults, "fault retries exhausted, worker exiting");
                    return;
                }
                if !sleep_or_signal(&mut control, ctx.config.fault_retry_delay()).await {
                    break;
                }
                ctx.set_state(SessionGroupState::Running);
                continue;
            }
        };

        match report.interruption {
            Some(PassInterruption::Stopped) => break,
            Some(PassInterruption::Paused) => continue,
            Some(PassInterruption::TripStopped) => {
                ctx.command(SyncCommand::StopCurrentTrip);
                ctx.control.send_replace(ControlSignal::StopCurrentTrip);
                continue;
            }
            Some(PassInterruption::PausedByConflict) => {
                ctx.command(SyncCommand::PauseForConflict);
                ctx.control.send_replace(ControlSignal::Pause);
                continue;
            }
            None => {}
        }

        match ctx.frequency {
            WorkflowFrequency::OneTime => {
                if report.is_idle() {
                    ctx.command(SyncCommand::Stop);
                    ctx.pipeline.settle();
                    ctx.set_state(SessionGroupState::OneTimeCompleted);
                    info!(session_group_id = %ctx.group_id, trips = report.trip, "one-time session group completed");
                    return;
                }
            }
            WorkflowFrequency::ContinuousManual => {
                ctx.command(SyncCommand::StopCurrentTrip);
                ctx.control.send_replace(ControlSignal::StopCurrentTrip);
            }
            WorkflowFrequency::ContinuousAutomatic => {
                if !sleep_or_signal(&mut control, ctx.idle).await {
                    break;
                }
            }
        }
    }

    ctx.pipeline.settle();
    debug!(session_group_id = %ctx.group_id, "session worker stopped");
}

pub struct JobScheduler {
    store: Arc<dyn SyncStore>,
    conflicts: Arc<ConflictManager>,
    endpoints: Arc<EndpointRegistry>,
    config: SchedulerConfig,
    workers: DashMap<Uuid, WorkerHandle>,
}

impl JobScheduler {
    pub fn new(
        store: Arc<dyn SyncStore>,
        conflicts: Arc<ConflictManager>,
        endpoints: Arc<EndpointRegistry>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            conflicts,
            endpoints,
            config,
            workers: DashMap::new(),
        }
    }

    pub fn conflicts(&self) -> &Arc<ConflictManager> {
        &self.conflicts
    }

    /// Persist a session group definition. Every session source must have
    /// an endpoint. An existing group keeps its state.
    pub fn register(&self, group: &SessionGroup) -> TandemResult<()> {
        for session in &group.sessions {
            for source in [session.left_source, session.right_source] {
                if !self.endpoints.contains(source) {
                    return Err(SessionError::EndpointNotRegistered(source.to_string()).into());
                }
            }
        }
        self.store.save_session_group(group)?;
        info!(session_group_id = %group.id, name = %group.name, sessions = group.sessions.len(), "session group registered");
        Ok(())
    }

    /// Register every `[[session_groups]]` entry, in file order.
    pub fn register_configured(&self, groups: &[SessionGroupConfig]) -> TandemResult<Vec<Uuid>> {
        groups
            .iter()
            .map(|cfg| {
                let group = SessionGroup::from_config(cfg);
                self.register(&group)?;
                Ok(group.id)
            })
            .collect()
    }

    pub fn is_running(&self, group_id: Uuid) -> bool {
        self.workers
            .get(&group_id)
            .is_some_and(|w| !w.task.is_finished())
    }

    pub fn state(&self, group_id: Uuid) -> TandemResult<SessionGroupState> {
        self.store
            .get_session_group(group_id)?
            .map(|g| g.state)
            .ok_or_else(|| SessionError::SessionGroupNotFound(group_id.to_string()).into())
    }

    pub fn pipeline_state(&self, group_id: Uuid) -> TandemResult<PipelineState> {
        match self.workers.get(&group_id) {
            Some(worker) => Ok(worker.pipeline.state()),
            None => self.store.get_pipeline_state(group_id),
        }
    }

    /// Start a registered group. Resumes from what the store already holds:
    /// completed groups are never re-applied.
    pub async fn start(&self, group_id: Uuid) -> TandemResult<()> {
        if self.is_running(group_id) {
            return Err(SessionError::AlreadyRunning(group_id.to_string()).into());
        }
        self.workers.remove(&group_id);
        let group = self
            .store
            .get_session_group(group_id)?
            .ok_or_else(|| SessionError::SessionGroupNotFound(group_id.to_string()))?;
        if group.state != SessionGroupState::Running && !group.state.can_transition_to(SessionGroupState::Running) {
            return Err(SessionError::InvalidTransition {
                group_id: group_id.to_string(),
                from: group.state.to_string(),
                to: SessionGroupState::Running.to_string(),
            }
            .into());
        }
        self.spawn_worker(group).await
    }

    async fn spawn_worker(&self, group: SessionGroup) -> TandemResult<()> {
        let group_id = group.id;
        let frequency = group.frequency;
        let idle = group
            .interval_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.config.idle_interval());

        let orchestrator = SessionOrchestrator::new(
            group,
            self.store.clone(),
            self.conflicts.clone(),
            &self.endpoints,
            self.config.clone(),
        )?;
        let orchestrator = tokio::task::spawn_blocking(move || {
            let mut orchestrator = orchestrator;
            orchestrator.initialize().map(|()| orchestrator)
        })
        .await
        .map_err(|e| AdapterError::Fatal(format!("endpoint initialization failed: {e}")))??;

        let pipeline = Arc::new(Pipeline::new(group_id, self.store.clone()));
        pipeline.command(SyncCommand::Start)?;
        transition_group(self.store.as_ref(), group_id, SessionGroupState::Running)?;

        let (tx, rx) = control::channel();
        let control = Arc::new(tx);
        let ctx = WorkerContext {
            group_id,
            frequency,
            idle,
            config: self.config.clone(),
            store: self.store.clone(),
            pipeline: pipeline.clone(),
            control: control.clone(),
        };
        let task = tokio::spawn(run_worker(ctx, orchestrator, rx));
        self.workers.insert(
            group_id,
            WorkerHandle {
                control,
                pipeline,
                task,
            },
        );
        info!(session_group_id = %group_id, "session group started");
        Ok(())
    }

    fn running_worker(&self, group_id: Uuid) -> TandemResult<dashmap::mapref::one::Ref<'_, Uuid, WorkerHandle>> {
        self.workers
            .get(&group_id)
            .filter(|w| !w.task.is_finished())
            .ok_or_else(|| SessionError::SessionGroupNotFound(group_id.to_string()).into())
    }

    /// Pause once the in-flight change group is done.
    pub fn pause(&self, group_id: Uuid) -> TandemResult<()> {
        let worker = self.running_worker(group_id)?;
        worker.pipeline.command(SyncCommand::Pause)?;
        worker.control.send_replace(ControlSignal::Pause);
        Ok(())
    }

    /// Resume a paused group, including one paused by a conflict.
    pub fn resume(&self, group_id: Uuid) -> TandemResult<()> {
        let worker = self.running_worker(group_id)?;
        worker.pipeline.command(SyncCommand::Resume)?;
        worker.control.send_replace(ControlSignal::Run);
        Ok(())
    }

    /// Start the next trip now: ends a manual group's wait or an automatic
    /// group's idle interval.
    pub fn start_new_trip(&self, group_id: Uuid) -> TandemResult<()> {
        let worker = self.running_worker(group_id)?;
        worker.pipeline.command(SyncCommand::StartNewTrip)?;
        worker.control.send_replace(ControlSignal::Run);
        Ok(())
    }

    /// End the current trip at the next change-group boundary.
    pub fn stop_current_trip(&self, group_id: Uuid) -> TandemResult<()> {
        let worker = self.running_worker(group_id)?;
        worker.pipeline.command(SyncCommand::StopCurrentTrip)?;
        worker.control.send_replace(ControlSignal::StopCurrentTrip);
        Ok(())
    }

    /// Stop a group and mark it Completed. The worker gets the grace period
    /// to reach a change-group boundary before it is aborted.
    pub async fn stop(&self, group_id: Uuid) -> TandemResult<()> {
        let Some((_, worker)) = self.workers.remove(&group_id) else {
            let state = self.state(group_id)?;
            if state.can_transition_to(SessionGroupState::Completed) {
                transition_group(self.store.as_ref(), group_id, SessionGroupState::Completed)?;
            }
            return Ok(());
        };
        let timed_out = self.stop_worker(group_id, worker).await;
        let state = self.state(group_id)?;
        if state.can_transition_to(SessionGroupState::Completed) {
            transition_group(self.store.as_ref(), group_id, SessionGroupState::Completed)?;
        }
        if timed_out {
            return Err(SessionError::GracePeriodExceeded {
                group_id: group_id.to_string(),
                grace_secs: self.config.stop_grace_period_secs,
            }
            .into());
        }
        Ok(())
    }

    /// Returns true if the worker had to be aborted.
    async fn stop_worker(&self, group_id: Uuid, worker: WorkerHandle) -> bool {
        if let Err(e) = worker.pipeline.command(SyncCommand::Stop) {
            debug!(session_group_id = %group_id, error = %e, "pipeline already stopping");
        }
        worker.control.send_replace(ControlSignal::Stop);

        let mut task = worker.task;
        let timed_out = tokio::time::timeout(self.config.stop_grace_period(), &mut task)
            .await
            .is_err();
        if timed_out {
            warn!(session_group_id = %group_id, "grace period exceeded, aborting session worker");
            task.abort();
        }
        worker.pipeline.settle();
        timed_out
    }

    /// Stop the group if it runs, then mark it for deletion.
    pub async fn mark_for_deletion(&self, group_id: Uuid) -> TandemResult<()> {
        if let Some((_, worker)) = self.workers.remove(&group_id) {
            self.stop_worker(group_id, worker).await;
        }
        transition_group(self.store.as_ref(), group_id, SessionGroupState::MarkedForDeletion)
    }

    /// Restart every group persisted as Running. A group that fails to
    /// start is logged and skipped. Returns the restarted ids.
    pub async fn recover(&self) -> TandemResult<Vec<Uuid>> {
        let mut restarted = Vec::new();
        for group in self.store.list_session_groups()? {
            if group.state != SessionGroupState::Running || self.is_running(group.id) {
                continue;
            }
            let group_id = group.id;
            match self.spawn_worker(group).await {
                Ok(()) => restarted.push(group_id),
                Err(e) => {
                    error!(session_group_id = %group_id, error = %e, "session group recovery failed")
                }
            }
        }
        info!(recovered = restarted.len(), "session groups recovered");
        Ok(restarted)
    }

    /// Stop every worker without changing persisted group state, so the
    /// next `recover` picks the groups up again.
    pub async fn shutdown(&self) {
        let ids: Vec<Uuid> = self.workers.iter().map(|w| *w.key()).collect();
        for group_id in ids {
            if let Some((_, worker)) = self.workers.remove(&group_id) {
                self.stop_worker(group_id, worker).await;
            }
        }
        info!("job scheduler shut down");
    }
}
