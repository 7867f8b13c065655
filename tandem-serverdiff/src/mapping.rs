/// Canonical form used for every comparison: lowercase, forward slashes,
/// no trailing separator.
pub fn normalize_path(path: &str) -> String {
    let lowered = path.replace('\\', "/").to_lowercase();
    lowered.trim_end_matches('/').to_string()
}

/// Path of `path` relative to `root`, both normalized. `None` when `path`
/// lies outside `root`.
fn relative_to(root: &str, path: &str) -> Option<String> {
    if root.is_empty() {
        return Some(path.trim_start_matches('/').to_string());
    }
    if path == root {
        return Some(String::new());
    }
    path.strip_prefix(root)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(str::to_string)
}

/// A source root and the target root it is migrated to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    pub source_root: String,
    pub target_root: String,
}

impl PathMapping {
    pub fn new(source_root: impl Into<String>, target_root: impl Into<String>) -> Self {
        Self {
            source_root: source_root.into(),
            target_root: target_root.into(),
        }
    }

    pub fn source_relative(&self, path: &str) -> Option<String> {
        relative_to(&normalize_path(&self.source_root), &normalize_path(path))
    }

    pub fn target_relative(&self, path: &str) -> Option<String> {
        relative_to(&normalize_path(&self.target_root), &normalize_path(path))
    }
}

/// What is compared: the mapped roots minus the cloaked source paths.
#[derive(Debug, Clone, Default)]
pub struct DiffScope {
    pub mappings: Vec<PathMapping>,
    /// Source-side paths excluded with everything below them. Target items
    /// are cloaked through the mapping that covers them.
    pub cloaked: Vec<String>,
}

impl DiffScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(mut self, source_root: impl Into<String>, target_root: impl Into<String>) -> Self {
        self.mappings.push(PathMapping::new(source_root, target_root));
        self
    }

    pub fn cloak(mut self, source_path: impl Into<String>) -> Self {
        self.cloaked.push(source_path.into());
        self
    }

    /// True if `relative` (relative to `mapping`) falls under a cloak.
    pub fn is_cloaked(&self, mapping: &PathMapping, relative: &str) -> bool {
        self.cloaked.iter().any(|cloak| match mapping.source_relative(cloak) {
            Some(cloak) if cloak.is_empty() => true,
            Some(cloak) => relative == cloak || relative.starts_with(&format!("{cloak}/")),
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_ignores_case_and_separators() {
        assert_eq!(normalize_path("$/Proj\\Src\\Main.cs"), "$/proj/src/main.cs");
        assert_eq!(normalize_path("/vobs/App/"), "/vobs/app");
    }

    #[test]
    fn relative_paths_respect_folder_boundaries() {
        let mapping = PathMapping::new("$/Proj", "/vobs/proj");
        assert_eq!(mapping.source_relative("$/proj/a/b.cs").as_deref(), Some("a/b.cs"));
        assert_eq!(mapping.source_relative("$/Proj").as_deref(), Some(""));
        assert_eq!(mapping.source_relative("$/Project/b.cs"), None);
        assert_eq!(mapping.target_relative("/VOBS/proj/a").as_deref(), Some("a"));
    }

    #[test]
    fn root_mapping_covers_everything() {
        let mapping = PathMapping::new("/", "/mirror");
        assert_eq!(mapping.source_relative("/a/b").as_deref(), Some("a/b"));
    }

    #[test]
    fn cloaks_cover_their_subtree_only() {
        let scope = DiffScope::new().map("$/Proj", "/vobs/proj").cloak("$/Proj/Bin");
        let mapping = &scope.mappings[0];
        assert!(scope.is_cloaked(mapping, "bin"));
        assert!(scope.is_cloaked(mapping, "bin/app.dll"));
        assert!(!scope.is_cloaked(mapping, "binaries/readme"));
        assert!(!scope.is_cloaked(mapping, "src/main.cs"));
    }
}
