//! # tandem-observability
//!
//! Structured tracing for the sync engine: subscriber setup driven by
//! `TANDEM_LOG` or the `[observability]` config section, named spans for
//! synchronization passes, and one event function per operator-relevant
//! occurrence (conflict escalation, group migration, session state changes).

pub mod tracing_setup;

pub use tracing_setup::{events, spans};
pub use tracing_setup::{init_from_config, init_tracing};
