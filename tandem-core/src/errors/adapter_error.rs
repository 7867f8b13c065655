use serde::{Deserialize, Serialize};

/// Errors surfaced by endpoint adapters.
///
/// `Transient` errors are retried by the calling phase with backoff;
/// everything else is converted into a generic conflict at the phase
/// boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    #[error("endpoint temporarily unavailable: {0}")]
    Transient(String),

    #[error("adapter failure: {0}")]
    Fatal(String),
}

impl AdapterError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn kind(&self) -> AdapterErrorKind {
        match self {
            Self::Transient(_) => AdapterErrorKind::Transient,
            Self::Fatal(_) => AdapterErrorKind::Fatal,
        }
    }

    /// The adapter's own message, without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Transient(msg) | Self::Fatal(msg) => msg,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterErrorKind {
    Transient,
    Fatal,
}

impl AdapterErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Fatal => "fatal",
        }
    }
}
