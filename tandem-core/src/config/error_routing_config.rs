use serde::{Deserialize, Serialize};

use super::defaults;
use crate::errors::AdapterErrorKind;

/// Max-occurrence limits for adapter errors, per error signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorRoutingConfig {
    /// Limit for errors no registered signature matches.
    pub default_max_occurrences: u32,
    /// Limit for transient errors that outlived their retries.
    pub environmental_max_occurrences: u32,
    /// Extra signatures. They win over built-ins of equal specificity.
    pub signatures: Vec<ErrorSignatureConfig>,
}

impl Default for ErrorRoutingConfig {
    fn default() -> Self {
        Self {
            default_max_occurrences: defaults::DEFAULT_ERROR_MAX_OCCURRENCES,
            environmental_max_occurrences: defaults::DEFAULT_ENVIRONMENTAL_ERROR_MAX_OCCURRENCES,
            signatures: Vec::new(),
        }
    }
}

/// `[[scheduler.error_routing.signatures]]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSignatureConfig {
    /// Absent: any kind.
    #[serde(default)]
    pub kind: Option<AdapterErrorKind>,
    /// Regex over the adapter's message. Absent: any message.
    #[serde(default)]
    pub message: Option<String>,
    pub max_occurrences: u32,
}
