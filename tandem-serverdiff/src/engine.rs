//! ServerDiffEngine: compares the latest state of two endpoints.
//!
//! Items are keyed by their path relative to a mapping's root, so a source
//! item and the target item it was migrated to share a key. Content is
//! compared by blake3 digest. The conversion history is then replayed
//! against the endpoints: every recorded target change must still exist.

use std::collections::BTreeMap;
use std::sync::Arc;

use tandem_core::errors::TandemResult;
use tandem_core::traits::IConversionHistory;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::mapping::{DiffScope, PathMapping};
use crate::provider::IDiffProvider;
use crate::report::{ContentMismatch, DiffReport, MissingConversion};

struct Listed {
    path: String,
    is_folder: bool,
    digest: Option<blake3::Hash>,
}

impl Listed {
    fn hex(&self) -> Option<String> {
        self.digest.map(|d| d.to_hex().to_string())
    }
}

#[derive(Clone, Copy)]
enum Side {
    Source,
    Target,
}

impl Side {
    fn relative(self, mapping: &PathMapping, path: &str) -> Option<String> {
        match self {
            Side::Source => mapping.source_relative(path),
            Side::Target => mapping.target_relative(path),
        }
    }

    fn root(self, mapping: &PathMapping) -> &str {
        match self {
            Side::Source => &mapping.source_root,
            Side::Target => &mapping.target_root,
        }
    }
}

pub struct ServerDiffEngine {
    source_id: Uuid,
    source: Arc<dyn IDiffProvider>,
    target_id: Uuid,
    target: Arc<dyn IDiffProvider>,
    history: Arc<dyn IConversionHistory>,
    scope: DiffScope,
}

impl ServerDiffEngine {
    pub fn new(
        source_id: Uuid,
        source: Arc<dyn IDiffProvider>,
        target_id: Uuid,
        target: Arc<dyn IDiffProvider>,
        history: Arc<dyn IConversionHistory>,
        scope: DiffScope,
    ) -> Self {
        Self {
            source_id,
            source,
            target_id,
            target,
            history,
            scope,
        }
    }

    /// Diff the two endpoints and check `session_id`'s conversion history.
    #[instrument(skip(self), fields(source = %self.source_id, target = %self.target_id))]
    pub fn run(&self, session_id: Uuid) -> TandemResult<DiffReport> {
        let mut report = DiffReport::default();

        for mapping in &self.scope.mappings {
            let source_items = self.list(Side::Source, mapping)?;
            let target_items = self.list(Side::Target, mapping)?;
            self.compare(mapping, &source_items, &target_items, &mut report);
        }
        self.check_history(session_id, &mut report)?;

        report.only_in_source.sort();
        report.only_in_target.sort();
        report.content_mismatches.sort_by(|a, b| a.source_path.cmp(&b.source_path));

        info!(
            matched = report.matched,
            only_in_source = report.only_in_source.len(),
            only_in_target = report.only_in_target.len(),
            mismatches = report.content_mismatches.len(),
            missing_conversions = report.missing_conversions.len(),
            "server diff completed"
        );
        Ok(report)
    }

    /// Items under the mapping's root on one side, keyed by relative path.
    fn list(&self, side: Side, mapping: &PathMapping) -> TandemResult<BTreeMap<String, Listed>> {
        let provider = match side {
            Side::Source => &self.source,
            Side::Target => &self.target,
        };
        let root = side.root(mapping);
        let items = provider.list_items(root)?;
        debug!(root, count = items.len(), "endpoint listed");

        let mut listed = BTreeMap::new();
        for item in items {
            let Some(key) = side.relative(mapping, &item.path) else {
                continue;
            };
            let digest = (!item.is_folder).then(|| blake3::hash(&item.content));
            listed.insert(
                key,
                Listed {
                    path: item.path,
                    is_folder: item.is_folder,
                    digest,
                },
            );
        }
        Ok(listed)
    }

    fn compare(
        &self,
        mapping: &PathMapping,
        source: &BTreeMap<String, Listed>,
        target: &BTreeMap<String, Listed>,
        report: &mut DiffReport,
    ) {
        let compared = |key: &String| !key.is_empty() && !self.scope.is_cloaked(mapping, key);

        for (key, s) in source.iter().filter(|(k, _)| compared(k)) {
            match target.get(key) {
                None => report.only_in_source.push(s.path.clone()),
                Some(t) if s.is_folder != t.is_folder || s.digest != t.digest => {
                    report.content_mismatches.push(ContentMismatch {
                        source_path: s.path.clone(),
                        target_path: t.path.clone(),
                        source_digest: s.hex(),
                        target_digest: t.hex(),
                    });
                }
                Some(_) => report.matched += 1,
            }
        }
        for (key, t) in target.iter().filter(|(k, _)| compared(k)) {
            if !source.contains_key(key) {
                report.only_in_target.push(t.path.clone());
            }
        }
    }

    fn check_history(&self, session_id: Uuid, report: &mut DiffReport) -> TandemResult<()> {
        for entry in self.history.list_conversions(session_id)? {
            let provider = if entry.target_source_id == self.target_id {
                &self.target
            } else if entry.target_source_id == self.source_id {
                &self.source
            } else {
                continue;
            };
            if !provider.change_exists(&entry.target_change_id)? {
                report.missing_conversions.push(MissingConversion {
                    target_source_id: entry.target_source_id,
                    source_change_id: entry.source_change_id.clone(),
                    target_change_id: entry.target_change_id.clone(),
                });
            }
        }
        Ok(())
    }
}
