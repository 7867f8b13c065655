//! Atomic operations carried by a change group.

use serde::{Deserialize, Serialize};

/// Kind of a change action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeActionKind {
    Add,
    Edit,
    Delete,
    Rename,
    Branch,
    Merge,
    Undelete,
    AddFileProperties,
    /// Adapter-specific action identified by name.
    Custom(String),
}

impl ChangeActionKind {
    /// Stable textual form used for persistence.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Add => "add",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::Rename => "rename",
            Self::Branch => "branch",
            Self::Merge => "merge",
            Self::Undelete => "undelete",
            Self::AddFileProperties => "add_file_properties",
            Self::Custom(name) => name,
        }
    }

    /// Inverse of [`ChangeActionKind::as_str`]. Unknown names map to `Custom`.
    pub fn parse(s: &str) -> Self {
        match s {
            "add" => Self::Add,
            "edit" => Self::Edit,
            "delete" => Self::Delete,
            "rename" => Self::Rename,
            "branch" => Self::Branch,
            "merge" => Self::Merge,
            "undelete" => Self::Undelete,
            "add_file_properties" => Self::AddFileProperties,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl std::fmt::Display for ChangeActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-action processing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeActionState {
    #[default]
    Active,
    /// Blocked by an open conflict.
    Backlogged,
    /// Dropped by a skip resolution or replaced by other actions.
    Skipped,
}

impl ChangeActionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Backlogged => "backlogged",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "backlogged" => Some(Self::Backlogged),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// A persisted change action. Owned exclusively by its parent group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeAction {
    pub id: i64,
    /// Position within the group; actions apply in ascending order.
    pub sequence: u32,
    pub kind: ChangeActionKind,
    pub path: String,
    /// Previous path for renames.
    pub from_path: Option<String>,
    pub version: String,
    pub item_type_reference_name: String,
    /// Endpoint-native item reference.
    pub source_item: Option<String>,
    pub state: ChangeActionState,
}

impl ChangeAction {
    /// True if the action still has to be applied to the target.
    pub fn is_effective(&self) -> bool {
        self.state != ChangeActionState::Skipped
    }

    /// Paths this action touches (its path plus the rename origin).
    pub fn touched_paths(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.path.as_str()).chain(self.from_path.as_deref())
    }
}

/// A change action before it is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChangeAction {
    pub kind: ChangeActionKind,
    pub path: String,
    pub from_path: Option<String>,
    pub version: String,
    pub item_type_reference_name: String,
    pub source_item: Option<String>,
}

impl NewChangeAction {
    pub fn new(kind: ChangeActionKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            from_path: None,
            version: String::new(),
            item_type_reference_name: String::new(),
            source_item: None,
        }
    }

    pub fn with_from_path(mut self, from_path: impl Into<String>) -> Self {
        self.from_path = Some(from_path.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_item_type(mut self, item_type: impl Into<String>) -> Self {
        self.item_type_reference_name = item_type.into();
        self
    }

    pub fn with_source_item(mut self, source_item: impl Into<String>) -> Self {
        self.source_item = Some(source_item.into());
        self
    }
}

impl From<&ChangeAction> for NewChangeAction {
    fn from(action: &ChangeAction) -> Self {
        Self {
            kind: action.kind.clone(),
            path: action.path.clone(),
            from_path: action.from_path.clone(),
            version: action.version.clone(),
            item_type_reference_name: action.item_type_reference_name.clone(),
            source_item: action.source_item.clone(),
        }
    }
}
