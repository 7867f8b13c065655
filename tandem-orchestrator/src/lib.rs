//! # tandem-orchestrator
//!
//! Drives synchronization passes for session groups.
//!
//! ## Modules
//!
//! - `provider` — adapter contracts (`IAnalysisProvider`, `IMigrationProvider`) and the endpoint registry
//! - `change_actions` — per-endpoint catalog of supported change action kinds
//! - `state_machine` — pipeline state transition table
//! - `control` — control signals a worker checks between change groups
//! - `error_routing` — max-occurrence limits per adapter error signature
//! - `retry` — adapter calls with transient-error backoff and panic isolation
//! - `store` — the store surface a session needs
//! - `orchestrator` — `SessionOrchestrator`, one pass of Analysis, ConflictDetection and Migration
//! - `scheduler` — `JobScheduler`, background workers per session group

pub mod change_actions;
pub mod control;
pub mod error_routing;
pub mod orchestrator;
pub mod provider;
pub mod retry;
pub mod scheduler;
pub mod state_machine;
pub mod store;

pub use change_actions::ChangeActionRegistry;
pub use control::ControlSignal;
pub use error_routing::{ErrorRoute, ErrorRouter, ErrorSignature, MaxOccurrencePolicy};
pub use orchestrator::{PassInterruption, PassReport, SessionOrchestrator};
pub use provider::{DeltaGroup, DeltaTable, Endpoint, EndpointRegistry, IAnalysisProvider, IMigrationProvider};
pub use scheduler::JobScheduler;
pub use state_machine::PipelineStateMachine;
pub use store::SyncStore;
