//! Rule packages: a serializable set of resolution rules for moving rule
//! sets between deployments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use tandem_core::errors::{TandemError, TandemResult};
use tandem_core::models::ConflictResolutionRule;

use crate::manager::ConflictManager;

pub const RULE_PACKAGE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulePackage {
    pub format_version: u32,
    pub exported_at: DateTime<Utc>,
    pub rules: Vec<ConflictResolutionRule>,
}

impl RulePackage {
    pub fn new(rules: Vec<ConflictResolutionRule>) -> Self {
        Self {
            format_version: RULE_PACKAGE_FORMAT_VERSION,
            exported_at: Utc::now(),
            rules,
        }
    }

    pub fn to_json(&self) -> TandemResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> TandemResult<Self> {
        let package: Self = serde_json::from_str(json)?;
        if package.format_version != RULE_PACKAGE_FORMAT_VERSION {
            return Err(TandemError::ValidationError(format!(
                "unsupported rule package format {}",
                package.format_version
            )));
        }
        Ok(package)
    }
}

impl ConflictManager {
    pub fn export_rules(&self, include_inactive: bool) -> TandemResult<RulePackage> {
        Ok(RulePackage::new(self.rules.list_rules(include_inactive)?))
    }

    /// Import with the same validation as `add_rule`. Every rule is validated
    /// before any is written; rules already present are left untouched.
    /// Returns the number of rules written.
    pub fn import_rules(&self, package: &RulePackage) -> TandemResult<usize> {
        for rule in &package.rules {
            self.validate_rule(rule)?;
        }
        let mut imported = 0;
        for rule in &package.rules {
            if self.rules.get_rule(rule.reference_name)?.is_some() {
                continue;
            }
            self.rules.insert_rule(rule)?;
            imported += 1;
        }
        info!(imported, total = package.rules.len(), "rule package imported");
        Ok(imported)
    }
}
