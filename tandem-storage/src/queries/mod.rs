//! Raw SQL operations grouped by table family.

pub mod change_group_ops;
pub mod conflict_ops;
pub mod conversion_ops;
pub mod rule_ops;
pub mod session_ops;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use tandem_core::errors::{StorageError, TandemError, TandemResult};


/// Fixed-width RFC 3339 text so timestamps compare lexicographically.
pub(crate) fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn now_ts() -> String {
    ts(Utc::now())
}

pub(crate) fn parse_ts(s: &str) -> TandemResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| corrupt("timestamp", s))
}

pub(crate) fn parse_uuid(s: &str) -> TandemResult<Uuid> {
    Uuid::parse_str(s).map_err(|_| corrupt("uuid", s))
}

pub(crate) fn corrupt(column: &str, value: &str) -> TandemError {
    StorageError::CorruptValue {
        column: column.to_string(),
        value: value.to_string(),
    }
    .into()
}
