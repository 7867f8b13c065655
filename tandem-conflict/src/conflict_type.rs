//! Conflict types are composed, not subclassed: a descriptor holds the scope
//! interpreter, the supported resolution actions and the handler.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tandem_core::models::SyncOrchestrationOption;
use uuid::Uuid;

use crate::builtin;
use crate::handler::{IConflictHandler, RuleActionHandler};
use crate::scope::ScopeInterpreter;

/// A resolution action a conflict type accepts in its rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionActionDescriptor {
    pub reference_name: Uuid,
    pub friendly_name: String,
    /// Rule data keys that must be present and non-empty.
    pub required_data_keys: Vec<String>,
}

impl ResolutionActionDescriptor {
    pub fn new(reference_name: Uuid, friendly_name: impl Into<String>) -> Self {
        Self {
            reference_name,
            friendly_name: friendly_name.into(),
            required_data_keys: Vec::new(),
        }
    }

    pub fn requires(mut self, key: impl Into<String>) -> Self {
        self.required_data_keys.push(key.into());
        self
    }
}

#[derive(Clone)]
pub struct ConflictTypeDescriptor {
    pub reference_name: Uuid,
    pub friendly_name: String,
    pub scope_interpreter: Arc<dyn ScopeInterpreter>,
    pub actions: Vec<ResolutionActionDescriptor>,
    pub handler: Arc<dyn IConflictHandler>,
    /// Duplicate detections increment the open conflict's count.
    pub countable: bool,
    /// Raised with the escalation event.
    pub orchestration: SyncOrchestrationOption,
    /// Overrides `[conflict] max_retry_attempts` for this type.
    pub max_retries: Option<u32>,
}

impl ConflictTypeDescriptor {
    /// A type supporting the built-in skip, retry and manual actions, resolved
    /// by `RuleActionHandler`.
    pub fn new(
        reference_name: Uuid,
        friendly_name: impl Into<String>,
        scope_interpreter: Arc<dyn ScopeInterpreter>,
    ) -> Self {
        Self {
            reference_name,
            friendly_name: friendly_name.into(),
            scope_interpreter,
            actions: builtin::default_actions(),
            handler: Arc::new(RuleActionHandler),
            countable: true,
            orchestration: SyncOrchestrationOption::Continue,
            max_retries: None,
        }
    }

    pub fn with_action(mut self, action: ResolutionActionDescriptor) -> Self {
        self.actions.retain(|a| a.reference_name != action.reference_name);
        self.actions.push(action);
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn IConflictHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn countable(mut self, countable: bool) -> Self {
        self.countable = countable;
        self
    }

    pub fn with_orchestration(mut self, option: SyncOrchestrationOption) -> Self {
        self.orchestration = option;
        self
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = Some(max);
        self
    }

    pub fn action(&self, reference_name: Uuid) -> Option<&ResolutionActionDescriptor> {
        self.actions.iter().find(|a| a.reference_name == reference_name)
    }

    /// Describe the first difference from `other`, if any. Handlers are
    /// opaque and not compared.
    pub fn shape_difference(&self, other: &ConflictTypeDescriptor) -> Option<String> {
        if self.friendly_name != other.friendly_name {
            return Some(format!(
                "friendly name '{}' vs '{}'",
                self.friendly_name, other.friendly_name
            ));
        }
        if self.scope_interpreter.name() != other.scope_interpreter.name() {
            return Some(format!(
                "scope interpreter {} vs {}",
                self.scope_interpreter.name(),
                other.scope_interpreter.name()
            ));
        }
        let mine: BTreeSet<_> = self.actions.iter().map(|a| a.reference_name).collect();
        let theirs: BTreeSet<_> = other.actions.iter().map(|a| a.reference_name).collect();
        if mine != theirs {
            return Some("supported resolution actions differ".to_string());
        }
        if self.countable != other.countable {
            return Some("countable flag differs".to_string());
        }
        if self.orchestration != other.orchestration {
            return Some("orchestration option differs".to_string());
        }
        None
    }
}

impl fmt::Debug for ConflictTypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConflictTypeDescriptor")
            .field("reference_name", &self.reference_name)
            .field("friendly_name", &self.friendly_name)
            .field("scope_interpreter", &self.scope_interpreter.name())
            .field("actions", &self.actions)
            .field("countable", &self.countable)
            .field("orchestration", &self.orchestration)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}
