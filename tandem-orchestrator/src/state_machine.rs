//! Pipeline state machine.
//!
//! Commands move a settled state into an intermittent one (`Pause` turns
//! `Running` into `Pausing`); `Finish` settles it once the worker reaches a
//! change-group boundary (`Pausing` becomes `Paused`). Any command the table
//! does not list is rejected and leaves the state untouched.

use tandem_core::errors::{SessionError, TandemResult};
use tandem_core::models::{PipelineState, SyncCommand};

/// The transition table. `None` means the command is illegal in `state`.
pub fn next_state(state: PipelineState, command: SyncCommand) -> Option<PipelineState> {
    use PipelineState::*;
    use SyncCommand::*;
    match (state, command) {
        (Default | Stopped, Start) => Some(Starting),
        (Default, StartNewTrip) => Some(Starting),

        (Starting, Finish) => Some(Running),
        (Pausing, Finish) => Some(Paused),
        (PausingForConflict, Finish) => Some(PausedByConflict),
        (Stopping, Finish) => Some(Stopped),
        (StoppingSingleTrip, Finish) => Some(StoppedSingleTrip),

        (Running, Pause) => Some(Pausing),
        (Running, PauseForConflict) => Some(PausingForConflict),
        (Running, StopCurrentTrip) => Some(StoppingSingleTrip),
        // Cuts the idle wait short.
        (Running, StartNewTrip) => Some(Running),

        (Paused | PausedByConflict, Resume) => Some(Starting),
        (StoppedSingleTrip, Start | StartNewTrip) => Some(Starting),
        (StoppedSingleTrip, Pause) => Some(Paused),

        (Stopping | Stopped | Default, Stop) => None,
        (_, Stop) => Some(Stopping),

        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStateMachine {
    state: PipelineState,
}

impl PipelineStateMachine {
    pub fn new(state: PipelineState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn can_apply(&self, command: SyncCommand) -> bool {
        next_state(self.state, command).is_some()
    }

    /// Apply `command`, returning `(from, to)`.
    pub fn apply(&mut self, command: SyncCommand) -> TandemResult<(PipelineState, PipelineState)> {
        let from = self.state;
        let to = next_state(from, command).ok_or_else(|| SessionError::IllegalCommand {
            command: command.to_string(),
            state: from.to_string(),
        })?;
        self.state = to;
        Ok((from, to))
    }

    /// Settle an intermittent state; settled states are left alone.
    pub fn finish(&mut self) -> Option<(PipelineState, PipelineState)> {
        if self.state.is_intermittent() {
            self.apply(SyncCommand::Finish).ok()
        } else {
            None
        }
    }
}
