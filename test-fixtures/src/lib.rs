//! Shared test support for the Tandem workspace: an in-memory endpoint that
//! plays both adapter roles, session group builders, and a loader for the
//! JSON scenario files kept next to this crate.

pub mod fake_endpoint;
pub mod scenario;

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

pub use fake_endpoint::{adapter_conflict, FakeChange, FakeEndpoint, Failure};
pub use scenario::{replay, session_group, FixtureAction, FixtureChange, ScenarioFixture};

/// Directory holding this crate's JSON files, fixed at compile time so
/// dependents resolve it regardless of their own manifest directory.
pub fn fixtures_root() -> &'static Path {
    Path::new(env!("CARGO_MANIFEST_DIR"))
}

fn fixture_path(relative_path: &str) -> PathBuf {
    fixtures_root().join(relative_path)
}

/// Load and deserialize a JSON fixture.
///
/// # Panics
/// On a missing or malformed file; fixtures are part of the test suite.
pub fn load_fixture<T: DeserializeOwned>(relative_path: &str) -> T {
    let path = fixture_path(relative_path);
    let raw = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("cannot read fixture {}: {e}", path.display()));
    serde_json::from_str(&raw).unwrap_or_else(|e| panic!("malformed fixture {}: {e}", path.display()))
}

pub fn fixture_exists(relative_path: &str) -> bool {
    fixture_path(relative_path).is_file()
}

/// Load `scenarios/<name>.json`.
pub fn load_scenario(name: &str) -> ScenarioFixture {
    load_fixture(&format!("scenarios/{name}.json"))
}
