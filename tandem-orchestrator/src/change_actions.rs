//! Change action kinds an endpoint can apply.

use std::collections::HashSet;

use tandem_core::models::{ChangeAction, ChangeActionKind, ChangeGroup};

#[derive(Debug, Clone, Default)]
pub struct ChangeActionRegistry {
    supported: HashSet<ChangeActionKind>,
}

impl ChangeActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ChangeActionKind) {
        self.supported.insert(kind);
    }

    pub fn register_all(&mut self, kinds: impl IntoIterator<Item = ChangeActionKind>) {
        self.supported.extend(kinds);
    }

    pub fn supports(&self, kind: &ChangeActionKind) -> bool {
        self.supported.contains(kind)
    }

    /// Effective actions of `group` this endpoint cannot apply.
    pub fn unsupported<'g>(&self, group: &'g ChangeGroup) -> Vec<&'g ChangeAction> {
        group
            .effective_actions()
            .filter(|a| !self.supports(&a.kind))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.supported.len()
    }

    pub fn is_empty(&self) -> bool {
        self.supported.is_empty()
    }
}

/// Case-insensitive path overlap: equal, or one is a folder containing the other.
pub fn paths_overlap(a: &str, b: &str) -> bool {
    let a = a.trim_end_matches(['/', '\\']).to_lowercase().replace('\\', "/");
    let b = b.trim_end_matches(['/', '\\']).to_lowercase().replace('\\', "/");
    let contains = |outer: &str, inner: &str| {
        inner.len() > outer.len() && inner.starts_with(outer) && inner.as_bytes()[outer.len()] == b'/'
    };
    a == b || contains(&a, &b) || contains(&b, &a)
}
