//! Global subscriber installation. One test: the subscriber is process-wide.

use tandem_core::config::ObservabilityConfig;
use tandem_core::errors::TandemError;
use tandem_observability::tracing_setup::LOG_ENV_VAR;
use tandem_observability::{init_from_config, init_tracing};

#[test]
fn subscriber_installs_once_from_config() {
    if std::env::var_os(LOG_ENV_VAR).is_none() {
        let bad = ObservabilityConfig {
            log_level: "tandem=loud".to_string(),
            json: true,
        };
        assert!(matches!(init_from_config(&bad), Err(TandemError::ConfigError(_))));
    }

    init_tracing().unwrap();
    tracing::info!(target: "tandem", "subscriber installed");

    let again = init_from_config(&ObservabilityConfig {
        json: false,
        ..ObservabilityConfig::default()
    });
    assert!(matches!(again, Err(TandemError::ConfigError(msg)) if msg.contains("already initialized")));
}
