//! # tandem-conflict
//!
//! Conflict detection and resolution for the sync engine.
//!
//! ## Modules
//!
//! - `scope` — scope interpreters matching a conflict's scope hint against a rule scope
//! - `conflict_type` — `ConflictTypeDescriptor`: interpreter, actions and handler composed per type
//! - `handler` — the `IConflictHandler` contract and the default rule-action handler
//! - `registry` — process-wide catalog of conflict types
//! - `rule_engine` — pure rule selection with configurable precedence
//! - `builtin` — the generic and unsupported-change-action conflict types
//! - `events` — `ConflictUnresolvedEvent`, broadcast on escalation
//! - `manager` — `ConflictManager`, the detect/resolve/escalate dispatcher
//! - `package` — JSON rule packages for export and import

pub mod builtin;
pub mod conflict_type;
pub mod events;
pub mod handler;
pub mod manager;
pub mod package;
pub mod registry;
pub mod rule_engine;
pub mod scope;

pub use conflict_type::{ConflictTypeDescriptor, ResolutionActionDescriptor};
pub use events::ConflictUnresolvedEvent;
pub use handler::{IConflictHandler, ResolutionContext, RuleActionHandler};
pub use manager::ConflictManager;
pub use package::RulePackage;
pub use registry::ConflictRegistry;
pub use rule_engine::RuleEngine;
pub use scope::{
    BasicPathScopeInterpreter, ChangeGroupScopeInterpreter, GlobalScopeInterpreter,
    RegexScopeInterpreter, ScopeInterpreter,
};
