//! # tandem-serverdiff
//!
//! Validation-only consumer of the sync engine. Walks both endpoints of a
//! session, compares them item by item through the configured path
//! mappings, and checks that every change the conversion history claims was
//! written still exists on its target.
//!
//! - `provider` — `IDiffProvider`, the listing an endpoint exposes
//! - `mapping` — path mappings between roots and cloaked paths
//! - `report` — the diff report
//! - `engine` — `ServerDiffEngine`

pub mod engine;
pub mod mapping;
pub mod provider;
pub mod report;

pub use engine::ServerDiffEngine;
pub use mapping::{normalize_path, DiffScope, PathMapping};
pub use provider::{DiffItem, IDiffProvider};
pub use report::{ContentMismatch, DiffReport, MissingConversion};
