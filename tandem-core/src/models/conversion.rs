//! Conversion results and history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::conflict::NewConflict;

/// Mapping of one source item to the item written on the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemConversion {
    pub source_item: String,
    pub target_item: String,
}

/// What a migration provider reports after applying a change group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    /// Change identifier created on the target endpoint.
    pub target_change_id: Option<String>,
    pub item_conversions: Vec<ItemConversion>,
    /// Conflicts detected while applying. Any blocking one leaves the group
    /// conflicted instead of completed.
    pub conflicts: Vec<NewConflict>,
}

impl ConversionResult {
    pub fn applied(target_change_id: impl Into<String>) -> Self {
        Self {
            target_change_id: Some(target_change_id.into()),
            ..Self::default()
        }
    }

    pub fn with_item(mut self, source_item: impl Into<String>, target_item: impl Into<String>) -> Self {
        self.item_conversions.push(ItemConversion {
            source_item: source_item.into(),
            target_item: target_item.into(),
        });
        self
    }
}

/// Persisted record of a migrated change group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionHistoryEntry {
    pub session_id: Uuid,
    pub source_id: Uuid,
    pub source_change_id: String,
    pub target_source_id: Uuid,
    pub target_change_id: String,
    pub items: Vec<ItemConversion>,
    pub recorded_at: DateTime<Utc>,
}
