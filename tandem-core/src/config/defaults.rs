// Single source of truth for all default values.

// --- Storage ---
pub const DEFAULT_DB_FILENAME: &str = "tandem.db";
pub const DEFAULT_BUSY_TIMEOUT_MS: u32 = 5_000;
pub const DEFAULT_READ_POOL_SIZE: usize = 4;
pub const DEFAULT_COMPLETED_GROUP_RETENTION_DAYS: u32 = 30;

// --- Scheduler ---
pub const DEFAULT_IDLE_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_STOP_GRACE_PERIOD_SECS: u64 = 30;
pub const DEFAULT_ADAPTER_RETRY_LIMIT: u32 = 3;
pub const DEFAULT_ADAPTER_BACKOFF_BASE_MS: u64 = 200;
pub const DEFAULT_ADAPTER_BACKOFF_MAX_MS: u64 = 10_000;
pub const DEFAULT_MIGRATION_BATCH_SIZE: usize = 100;
pub const DEFAULT_FAULT_RETRY_DELAY_SECS: u64 = 60;
pub const DEFAULT_MAX_FAULT_RETRIES: u32 = 5;

// --- Error routing ---
pub const DEFAULT_ERROR_MAX_OCCURRENCES: u32 = 10;
pub const DEFAULT_ENVIRONMENTAL_ERROR_MAX_OCCURRENCES: u32 = 50;

// --- Conflict ---
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

// --- Observability ---
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_JSON_LOGS: bool = true;
