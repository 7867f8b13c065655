use serde::{Deserialize, Serialize};

use super::defaults;

/// Precedence applied when several resolution rules match one conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulePrecedence {
    /// Most specific scope first, ties broken by creation order.
    #[default]
    MostSpecificScope,
    /// Oldest rule first regardless of scope.
    CreationOrder,
}

/// Conflict management configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictConfig {
    pub rule_precedence: RulePrecedence,
    /// Retries allowed for a conflict resolved with the retry action before
    /// it is escalated.
    pub max_retry_attempts: u32,
    /// Buffer size of the unresolved-conflict broadcast channel.
    pub event_channel_capacity: usize,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            rule_precedence: RulePrecedence::default(),
            max_retry_attempts: defaults::DEFAULT_MAX_RETRY_ATTEMPTS,
            event_channel_capacity: defaults::DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}
