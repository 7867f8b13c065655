use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentMismatch {
    pub source_path: String,
    pub target_path: String,
    /// Hex blake3 digest; `None` for a folder.
    pub source_digest: Option<String>,
    pub target_digest: Option<String>,
}

/// A recorded conversion whose target change the endpoint no longer holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingConversion {
    pub target_source_id: Uuid,
    pub source_change_id: String,
    pub target_change_id: String,
}

/// Result of one server diff. Paths are reported as the endpoints list them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffReport {
    pub only_in_source: Vec<String>,
    pub only_in_target: Vec<String>,
    pub content_mismatches: Vec<ContentMismatch>,
    pub matched: usize,
    pub missing_conversions: Vec<MissingConversion>,
}

impl DiffReport {
    pub fn is_consistent(&self) -> bool {
        self.only_in_source.is_empty()
            && self.only_in_target.is_empty()
            && self.content_mismatches.is_empty()
            && self.missing_conversions.is_empty()
    }

    pub fn difference_count(&self) -> usize {
        self.only_in_source.len()
            + self.only_in_target.len()
            + self.content_mismatches.len()
            + self.missing_conversions.len()
    }
}
