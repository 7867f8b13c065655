//! # tandem-storage
//!
//! SQLite durable store shared by every session worker.
//!
//! ## Modules
//!
//! - `connection` — single writer plus round-robin readers
//! - `migrations` — versioned schema creation
//! - `queries` — raw SQL per table family, no business logic
//! - `engine` — `StorageEngine`, implementing every repository trait

pub mod connection;
pub mod engine;
pub mod migrations;
pub mod queries;

pub use engine::StorageEngine;

use tandem_core::errors::{StorageError, TandemError};

/// Convert a raw SQLite (or row decoding) failure into a `TandemError`.
pub(crate) fn to_storage_err(message: String) -> TandemError {
    TandemError::StorageError(StorageError::SqliteError { message })
}
