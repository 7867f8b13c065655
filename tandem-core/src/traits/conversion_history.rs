use uuid::Uuid;

use crate::errors::TandemResult;
use crate::models::ConversionHistoryEntry;

/// Record of which source changes produced which target changes.
pub trait IConversionHistory: Send + Sync {
    fn record_conversion(&self, entry: &ConversionHistoryEntry) -> TandemResult<()>;

    fn find_conversion(
        &self,
        source_id: Uuid,
        source_change_id: &str,
    ) -> TandemResult<Option<ConversionHistoryEntry>>;

    /// True if `change_id` on `source_id` was written by a migration.
    fn is_migrated_change(&self, source_id: Uuid, change_id: &str) -> TandemResult<bool>;

    fn list_conversions(&self, session_id: Uuid) -> TandemResult<Vec<ConversionHistoryEntry>>;
}
