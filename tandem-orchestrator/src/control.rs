//! Cooperative control of a running pass. Workers read the current signal
//! between change groups, never mid-group.

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlSignal {
    #[default]
    Run,
    Pause,
    /// End the current trip, then wait for a new one.
    StopCurrentTrip,
    Stop,
}

impl ControlSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Pause => "pause",
            Self::StopCurrentTrip => "stop_current_trip",
            Self::Stop => "stop",
        }
    }
}

pub fn channel() -> (watch::Sender<ControlSignal>, watch::Receiver<ControlSignal>) {
    watch::channel(ControlSignal::Run)
}

/// Current signal without marking it seen.
pub fn current(rx: &watch::Receiver<ControlSignal>) -> ControlSignal {
    *rx.borrow()
}
