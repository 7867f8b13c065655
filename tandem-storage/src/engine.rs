//! StorageEngine: owns the store's connections and implements every repository
//! trait the conflict manager and orchestrator depend on.

use std::path::Path;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use tandem_core::config::StorageConfig;
use tandem_core::errors::TandemResult;
use tandem_core::models::{
    ChangeGroup, ChangeGroupHandle, ChangeGroupId, ChangeGroupStatus, ConflictLink,
    ConflictResolutionRule, ConflictStatus, ConversionHistoryEntry, MigrationConflict,
    NewChangeAction, NewConflict, PipelineState, RuleStatus, SessionCheckpoint, SessionGroup,
    SessionGroupState,
};
use tandem_core::traits::{
    IChangeGroupStore, IConflictStore, IConversionHistory, IRuleStore, ISessionStateStore,
    RecordedConflict,
};

use crate::connection::Connections;
use crate::migrations;
use crate::queries::{change_group_ops, conflict_ops, conversion_ops, rule_ops, session_ops};

/// The main storage engine.
pub struct StorageEngine {
    conn: Connections,
    retention_days: u32,
}

impl StorageEngine {
    /// Open a file-backed store with default storage settings.
    pub fn open(path: &Path) -> TandemResult<Self> {
        Self::open_at(path, &StorageConfig::default())
    }

    /// Open using the `[storage]` section of the configuration.
    pub fn open_with_config(config: &StorageConfig) -> TandemResult<Self> {
        Self::open_at(Path::new(&config.db_path), config)
    }

    fn open_at(path: &Path, config: &StorageConfig) -> TandemResult<Self> {
        let busy_timeout = StdDuration::from_millis(u64::from(config.busy_timeout_ms));
        let engine = Self {
            conn: Connections::open(path, config.read_pool_size, busy_timeout)?,
            retention_days: config.completed_group_retention_days,
        };
        engine.initialize()?;
        Ok(engine)
    }

    /// Open an in-memory storage engine (for testing).
    pub fn open_in_memory() -> TandemResult<Self> {
        let engine = Self {
            conn: Connections::open_in_memory()?,
            retention_days: StorageConfig::default().completed_group_retention_days,
        };
        engine.initialize()?;
        Ok(engine)
    }

    /// Run migrations. A read-only reader opened before the schema existed
    /// still sees it through WAL.
    fn initialize(&self) -> TandemResult<()> {
        self.conn.write(|conn| {
            let version = migrations::run_migrations(conn)?;
            tracing::info!(schema_version = version, "storage initialized");
            Ok(())
        })
    }

    pub fn connections(&self) -> &Connections {
        &self.conn
    }

    /// Retention job: purge terminal groups older than the configured
    /// `completed_group_retention_days`.
    pub fn purge_expired(&self) -> TandemResult<usize> {
        let cutoff = Utc::now() - Duration::days(i64::from(self.retention_days));
        self.purge_completed(cutoff)
    }
}

impl IChangeGroupStore for StorageEngine {
    fn create_group(&self, source_id: Uuid, name: &str, owner: &str) -> TandemResult<ChangeGroupHandle> {
        self.conn.write(|conn| change_group_ops::insert_group(conn, source_id, name, owner))
    }

    fn create_group_with_actions(
        &self,
        source_id: Uuid,
        name: &str,
        owner: &str,
        actions: &[NewChangeAction],
    ) -> TandemResult<ChangeGroupHandle> {
        self.conn.write(|conn| {
            change_group_ops::insert_group_with_actions(conn, source_id, name, owner, actions)
        })
    }

    fn append_action(&self, group: ChangeGroupHandle, action: &NewChangeAction) -> TandemResult<i64> {
        self.conn.write(|conn| change_group_ops::append_action(conn, group, action))
    }

    fn mark_in_progress(&self, group: ChangeGroupId) -> TandemResult<()> {
        self.conn.write(|conn| {
            change_group_ops::transition(conn, group, ChangeGroupStatus::InProgress, "start")
        })
    }

    fn mark_contains_backlog(&self, group: ChangeGroupId) -> TandemResult<()> {
        self.conn.write(|conn| change_group_ops::mark_contains_backlog(conn, group))
    }

    fn mark_conflicted(&self, group: ChangeGroupId) -> TandemResult<()> {
        self.conn.write(|conn| {
            change_group_ops::transition(conn, group, ChangeGroupStatus::Conflicted, "mark conflicted")
        })
    }

    fn complete(&self, group: ChangeGroupId) -> TandemResult<()> {
        self.conn.write(|conn| change_group_ops::complete_group(conn, group))
    }

    fn skip(&self, group: ChangeGroupId) -> TandemResult<()> {
        self.conn.write(|conn| {
            change_group_ops::transition(conn, group, ChangeGroupStatus::Skipped, "skip")
        })
    }

    fn unblock(&self, group: ChangeGroupId) -> TandemResult<()> {
        self.conn.write(|conn| change_group_ops::unblock_group(conn, group))
    }

    fn mark_action_backlogged(&self, action_id: i64) -> TandemResult<()> {
        self.conn.write(|conn| change_group_ops::mark_action_backlogged(conn, action_id))
    }

    fn skip_action(&self, action_id: i64) -> TandemResult<()> {
        self.conn.write(|conn| change_group_ops::skip_action(conn, action_id))
    }

    fn replace_action(&self, action_id: i64, replacements: &[NewChangeAction]) -> TandemResult<()> {
        self.conn.write(|conn| change_group_ops::replace_action(conn, action_id, replacements))
    }

    fn get_group(&self, group: ChangeGroupId) -> TandemResult<Option<ChangeGroup>> {
        self.conn.read(|conn| change_group_ops::get_group(conn, group))
    }

    fn find_group_by_name(&self, source_id: Uuid, name: &str) -> TandemResult<Option<ChangeGroup>> {
        self.conn.read(|conn| change_group_ops::find_group_by_name(conn, source_id, name))
    }

    fn get_pending_groups(&self, source_id: Uuid, limit: usize) -> TandemResult<Vec<ChangeGroup>> {
        self.conn.read(|conn| change_group_ops::get_pending_groups(conn, source_id, limit))
    }

    fn get_blocked_groups(&self, source_id: Uuid) -> TandemResult<Vec<ChangeGroup>> {
        self.conn.read(|conn| change_group_ops::get_blocked_groups(conn, source_id))
    }

    fn release_backlog(&self, source_id: Uuid) -> TandemResult<Vec<ChangeGroupId>> {
        self.conn.write(|conn| change_group_ops::release_backlog(conn, source_id))
    }

    fn purge_completed(&self, older_than: DateTime<Utc>) -> TandemResult<usize> {
        self.conn.write(|conn| change_group_ops::purge_completed(conn, older_than))
    }
}

impl IConflictStore for StorageEngine {
    fn record_conflict(&self, conflict: &NewConflict, countable: bool) -> TandemResult<RecordedConflict> {
        self.conn.write(|conn| conflict_ops::record_conflict(conn, conflict, countable))
    }

    fn get_conflict(&self, id: i64) -> TandemResult<Option<MigrationConflict>> {
        self.conn.read(|conn| conflict_ops::get_conflict(conn, id))
    }

    fn find_active_conflicts(&self, scope_id: Uuid) -> TandemResult<Vec<MigrationConflict>> {
        self.conn.read(|conn| conflict_ops::find_active_conflicts(conn, scope_id))
    }

    fn find_open_conflicts_for_group(&self, group: ChangeGroupId) -> TandemResult<Vec<MigrationConflict>> {
        self.conn.read(|conn| conflict_ops::find_open_conflicts_for_group(conn, group))
    }

    fn conflict_links(&self, conflict_id: i64) -> TandemResult<Vec<ConflictLink>> {
        self.conn.read(|conn| conflict_ops::conflict_links(conn, conflict_id))
    }

    fn set_conflict_status(&self, id: i64, status: ConflictStatus, rule: Option<Uuid>) -> TandemResult<()> {
        self.conn.write(|conn| conflict_ops::set_conflict_status(conn, id, status, rule))
    }

    fn increment_retry(&self, id: i64) -> TandemResult<u32> {
        self.conn.write(|conn| conflict_ops::increment_retry(conn, id))
    }

    fn acknowledge_active_conflicts(&self, scope_id: Uuid, conflict_type: Uuid) -> TandemResult<Vec<i64>> {
        self.conn.write(|conn| {
            conflict_ops::acknowledge_active_conflicts(conn, scope_id, conflict_type)
        })
    }

    fn count_unresolved(&self, scope_id: Uuid) -> TandemResult<usize> {
        self.conn.read(|conn| conflict_ops::count_unresolved(conn, scope_id))
    }
}

impl IRuleStore for StorageEngine {
    fn insert_rule(&self, rule: &ConflictResolutionRule) -> TandemResult<ConflictResolutionRule> {
        self.conn.write(|conn| rule_ops::insert_rule(conn, rule))
    }

    fn get_rule(&self, reference_name: Uuid) -> TandemResult<Option<ConflictResolutionRule>> {
        self.conn.read(|conn| rule_ops::get_rule(conn, reference_name))
    }

    fn find_applicable_rules(
        &self,
        conflict_type: Uuid,
        scope_id: Uuid,
    ) -> TandemResult<Vec<ConflictResolutionRule>> {
        self.conn.read(|conn| rule_ops::find_applicable_rules(conn, conflict_type, scope_id))
    }

    fn set_rule_status(&self, reference_name: Uuid, status: RuleStatus) -> TandemResult<()> {
        self.conn.write(|conn| rule_ops::set_rule_status(conn, reference_name, status))
    }

    fn list_rules(&self, include_inactive: bool) -> TandemResult<Vec<ConflictResolutionRule>> {
        self.conn.read(|conn| rule_ops::list_rules(conn, include_inactive))
    }
}

impl ISessionStateStore for StorageEngine {
    fn save_session_group(&self, group: &SessionGroup) -> TandemResult<()> {
        self.conn.write(|conn| session_ops::upsert_session_group(conn, group))
    }

    fn get_session_group(&self, id: Uuid) -> TandemResult<Option<SessionGroup>> {
        self.conn.read(|conn| session_ops::get_session_group(conn, id))
    }

    fn list_session_groups(&self) -> TandemResult<Vec<SessionGroup>> {
        self.conn.read(session_ops::list_session_groups)
    }

    fn set_session_group_state(&self, id: Uuid, state: SessionGroupState) -> TandemResult<()> {
        self.conn.write(|conn| session_ops::set_session_group_state(conn, id, state))
    }

    fn save_pipeline_state(&self, id: Uuid, state: PipelineState) -> TandemResult<()> {
        self.conn.write(|conn| session_ops::save_pipeline_state(conn, id, state))
    }

    fn get_pipeline_state(&self, id: Uuid) -> TandemResult<PipelineState> {
        self.conn.read(|conn| session_ops::get_pipeline_state(conn, id))
    }

    fn save_checkpoint(&self, checkpoint: &SessionCheckpoint) -> TandemResult<()> {
        self.conn.write(|conn| session_ops::save_checkpoint(conn, checkpoint))
    }

    fn get_checkpoint(&self, session_id: Uuid) -> TandemResult<Option<SessionCheckpoint>> {
        self.conn.read(|conn| session_ops::get_checkpoint(conn, session_id))
    }

    fn get_high_water_mark(&self, session_id: Uuid, source_id: Uuid) -> TandemResult<Option<String>> {
        self.conn.read(|conn| session_ops::get_high_water_mark(conn, session_id, source_id))
    }

    fn set_high_water_mark(&self, session_id: Uuid, source_id: Uuid, value: &str) -> TandemResult<()> {
        self.conn.write(|conn| {
            session_ops::set_high_water_mark(conn, session_id, source_id, value)
        })
    }
}

impl IConversionHistory for StorageEngine {
    fn record_conversion(&self, entry: &ConversionHistoryEntry) -> TandemResult<()> {
        self.conn.write(|conn| conversion_ops::record_conversion(conn, entry))
    }

    fn find_conversion(
        &self,
        source_id: Uuid,
        source_change_id: &str,
    ) -> TandemResult<Option<ConversionHistoryEntry>> {
        self.conn.read(|conn| conversion_ops::find_conversion(conn, source_id, source_change_id))
    }

    fn is_migrated_change(&self, source_id: Uuid, change_id: &str) -> TandemResult<bool> {
        self.conn.read(|conn| conversion_ops::is_migrated_change(conn, source_id, change_id))
    }

    fn list_conversions(&self, session_id: Uuid) -> TandemResult<Vec<ConversionHistoryEntry>> {
        self.conn.read(|conn| conversion_ops::list_conversions(conn, session_id))
    }
}
