use tandem_core::errors::AdapterError;

/// One item as an endpoint currently holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffItem {
    pub path: String,
    pub is_folder: bool,
    /// Empty for folders.
    pub content: Vec<u8>,
}

impl DiffItem {
    pub fn file(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            is_folder: false,
            content: content.into(),
        }
    }

    pub fn folder(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_folder: true,
            content: Vec::new(),
        }
    }
}

/// Read-only view of an endpoint's latest state.
pub trait IDiffProvider: Send + Sync {
    /// Every item at or below `root`.
    fn list_items(&self, root: &str) -> Result<Vec<DiffItem>, AdapterError>;

    /// True if the endpoint holds the change `change_id`.
    fn change_exists(&self, change_id: &str) -> Result<bool, AdapterError>;
}
