pub mod conflict_config;
pub mod defaults;
pub mod error_routing_config;
pub mod observability_config;
pub mod scheduler_config;
pub mod session_config;
pub mod storage_config;

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{TandemError, TandemResult};

pub use conflict_config::{ConflictConfig, RulePrecedence};
pub use error_routing_config::{ErrorRoutingConfig, ErrorSignatureConfig};
pub use observability_config::ObservabilityConfig;
pub use scheduler_config::SchedulerConfig;
pub use session_config::{MigrationSourceConfig, SessionConfig, SessionGroupConfig};
pub use storage_config::StorageConfig;

/// Top-level configuration aggregating all subsystem configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TandemConfig {
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
    pub conflict: ConflictConfig,
    pub observability: ObservabilityConfig,
    pub session_groups: Vec<SessionGroupConfig>,
}

impl TandemConfig {
    /// Parse a TOML string. Missing sections and fields take defaults.
    pub fn from_toml(toml_str: &str) -> TandemResult<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| TandemError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> TandemResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| TandemError::ConfigError(format!("{}: {e}", path.display())))?;
        Self::from_toml(&raw)
    }

    /// Reject definitions the scheduler could not run.
    pub fn validate(&self) -> TandemResult<()> {
        if self.scheduler.migration_batch_size == 0 {
            return Err(TandemError::ConfigError(
                "scheduler.migration_batch_size must be at least 1".to_string(),
            ));
        }

        let routing = &self.scheduler.error_routing;
        if routing.default_max_occurrences == 0 || routing.environmental_max_occurrences == 0 {
            return Err(TandemError::ConfigError(
                "scheduler.error_routing limits must be at least 1".to_string(),
            ));
        }
        for signature in &routing.signatures {
            if signature.max_occurrences == 0 {
                return Err(TandemError::ConfigError(format!(
                    "error signature {:?} must allow at least one occurrence",
                    signature.message.as_deref().unwrap_or("*")
                )));
            }
        }

        let mut group_ids = HashSet::new();
        let mut session_ids = HashSet::new();
        for group in &self.session_groups {
            if group.name.trim().is_empty() {
                return Err(TandemError::ConfigError(format!(
                    "session group {} has an empty name",
                    group.id
                )));
            }
            if !group_ids.insert(group.id) {
                return Err(TandemError::ConfigError(format!(
                    "duplicate session group id {}",
                    group.id
                )));
            }
            for session in &group.sessions {
                if !session_ids.insert(session.id) {
                    return Err(TandemError::ConfigError(format!(
                        "duplicate session id {}",
                        session.id
                    )));
                }
                if session.left_source.id == session.right_source.id {
                    return Err(TandemError::ConfigError(format!(
                        "session {} uses source {} on both sides",
                        session.id, session.left_source.id
                    )));
                }
            }
        }
        Ok(())
    }
}
