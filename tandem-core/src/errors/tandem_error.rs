use super::{AdapterError, ChangeGroupError, ConflictError, SessionError, StorageError};

/// Top-level error for every Tandem crate.
#[derive(Debug, thiserror::Error)]
pub enum TandemError {
    #[error("storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("change group error: {0}")]
    ChangeGroupError(#[from] ChangeGroupError),

    #[error("conflict error: {0}")]
    ConflictError(#[from] ConflictError),

    #[error("session error: {0}")]
    SessionError(#[from] SessionError),

    #[error("adapter error: {0}")]
    AdapterError(#[from] AdapterError),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

pub type TandemResult<T> = Result<T, TandemError>;
