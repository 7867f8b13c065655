//! Adapter invocation. Transient errors are retried with exponential backoff
//! up to `adapter_retry_limit` attempts; a panicking adapter becomes a fatal
//! error instead of unwinding through the session worker.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tandem_conflict::handler::panic_message;
use tandem_core::config::SchedulerConfig;
use tandem_core::errors::AdapterError;
use tokio::sync::watch;
use tracing::warn;

use crate::control::{self, ControlSignal};

/// Call `op` once, converting a panic into `AdapterError::Fatal`.
pub fn guarded<T>(operation: &str, op: impl FnOnce() -> Result<T, AdapterError>) -> Result<T, AdapterError> {
    catch_unwind(AssertUnwindSafe(op)).unwrap_or_else(|payload| {
        Err(AdapterError::Fatal(format!(
            "{operation} panicked: {}",
            panic_message(payload.as_ref())
        )))
    })
}

/// Call `op` until it succeeds, fails fatally, or the attempts run out.
/// A stop request ends the backoff early with the last error.
pub fn with_retry<T>(
    config: &SchedulerConfig,
    operation: &str,
    control: &watch::Receiver<ControlSignal>,
    mut op: impl FnMut() -> Result<T, AdapterError>,
) -> Result<T, AdapterError> {
    let limit = config.adapter_retry_limit.max(1);
    let mut attempt = 1;
    loop {
        match guarded(operation, &mut op) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < limit => {
                let delay = config.backoff_for_attempt(attempt);
                warn!(operation, attempt, delay_ms = delay.as_millis() as u64, error = %e, "transient adapter error, retrying");
                if control::current(control) == ControlSignal::Stop {
                    return Err(e);
                }
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
