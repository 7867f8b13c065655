//! # tandem-core
//!
//! Foundation crate for the Tandem synchronization engine.
//! Defines the change-group, conflict, rule and session models, the
//! repository traits the durable store implements, errors, config and
//! constants. Every other crate in the workspace depends on this.

pub mod config;
pub mod constants;
pub mod errors;
pub mod models;
pub mod traits;

// Re-export the most commonly used types at the crate root.
pub use config::TandemConfig;
pub use errors::{TandemError, TandemResult};
pub use models::{
    ChangeAction, ChangeActionKind, ChangeGroup, ChangeGroupId, ChangeGroupStatus,
    ConflictResolutionRule, ConflictStatus, MigrationConflict, NewChangeAction, NewConflict,
};
