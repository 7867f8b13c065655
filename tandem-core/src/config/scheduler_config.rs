use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults;
use super::ErrorRoutingConfig;

/// Job scheduler and session pass configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Idle time between passes when a session group does not set its own.
    pub idle_interval_secs: u64,
    /// How long `stop` waits for a worker to reach a checkpoint.
    pub stop_grace_period_secs: u64,
    /// Attempts for an adapter call failing with a transient error.
    pub adapter_retry_limit: u32,
    /// First backoff delay; doubles per attempt.
    pub adapter_backoff_base_ms: u64,
    /// Backoff ceiling.
    pub adapter_backoff_max_ms: u64,
    /// Pending groups loaded per migration batch.
    pub migration_batch_size: usize,
    /// Delay before a faulted session group is retried.
    pub fault_retry_delay_secs: u64,
    /// Consecutive faults after which the group stays faulted.
    pub max_fault_retries: u32,
    /// `[scheduler.error_routing]`
    pub error_routing: ErrorRoutingConfig,
}

impl SchedulerConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }

    pub fn stop_grace_period(&self) -> Duration {
        Duration::from_secs(self.stop_grace_period_secs)
    }

    pub fn fault_retry_delay(&self) -> Duration {
        Duration::from_secs(self.fault_retry_delay_secs)
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ms = self
            .adapter_backoff_base_ms
            .saturating_mul(1u64 << exp)
            .min(self.adapter_backoff_max_ms);
        Duration::from_millis(ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_interval_secs: defaults::DEFAULT_IDLE_INTERVAL_SECS,
            stop_grace_period_secs: defaults::DEFAULT_STOP_GRACE_PERIOD_SECS,
            adapter_retry_limit: defaults::DEFAULT_ADAPTER_RETRY_LIMIT,
            adapter_backoff_base_ms: defaults::DEFAULT_ADAPTER_BACKOFF_BASE_MS,
            adapter_backoff_max_ms: defaults::DEFAULT_ADAPTER_BACKOFF_MAX_MS,
            migration_batch_size: defaults::DEFAULT_MIGRATION_BATCH_SIZE,
            fault_retry_delay_secs: defaults::DEFAULT_FAULT_RETRY_DELAY_SECS,
            max_fault_retries: defaults::DEFAULT_MAX_FAULT_RETRIES,
            error_routing: ErrorRoutingConfig::default(),
        }
    }
}
