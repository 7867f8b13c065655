//! Subscriber installation plus the span and event vocabulary the
//! orchestrator and conflict manager log with.

pub mod events;
pub mod spans;

use tandem_core::config::ObservabilityConfig;
use tandem_core::errors::{TandemError, TandemResult};
use tracing_subscriber::EnvFilter;

/// Environment variable consulted for the log filter.
pub const LOG_ENV_VAR: &str = "TANDEM_LOG";

/// Install the default subscriber: JSON lines at `info`, or whatever
/// `TANDEM_LOG` asks for.
pub fn init_tracing() -> TandemResult<()> {
    init_from_config(&ObservabilityConfig::default())
}

/// Initialize from the `[observability]` section. `TANDEM_LOG` still wins
/// over `log_level` when set. Fails if a global subscriber is already
/// installed.
pub fn init_from_config(config: &ObservabilityConfig) -> TandemResult<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TandemError::ConfigError(format!("observability.log_level: {e}")))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| TandemError::ConfigError(format!("tracing already initialized: {e}")))
}
