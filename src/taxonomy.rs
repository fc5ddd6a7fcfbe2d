//! Note types derived from folder placement.
//!
//! A type is a folder under one of the configured roots. With
//! [`DepthPolicy::Leaf`] only folders without (non-excluded) subfolders count;
//! with [`DepthPolicy::All`] every folder does. The computed set is cached and
//! only recomputed after [`TypeTaxonomy::invalidate`].

use nucleo::{
    Matcher, Utf32Str,
    pattern::{CaseMatching, Normalization, Pattern},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Entry, Result, Settings, Vault, VaultPath};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthPolicy {
    All,
    #[default]
    Leaf,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRecord {
    /// Same as `path`.
    pub id: String,
    /// Folder basename.
    pub name: String,
    pub path: String,
}

impl TypeRecord {
    pub fn from_folder(path: &str) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        Self {
            id: path.to_string(),
            name,
            path: path.to_string(),
        }
    }

    pub fn icon(&self) -> TypeIcon {
        type_icon(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TypeIcon {
    Project,
    Task,
    Event,
    Reference,
    Idea,
    Mind,
    List,
    Note,
}

impl TypeIcon {
    pub fn as_str(self) -> &'static str {
        match self {
            TypeIcon::Project => "folder-kanban",
            TypeIcon::Task => "check-square",
            TypeIcon::Event => "calendar",
            TypeIcon::Reference => "book-open",
            TypeIcon::Idea => "lightbulb",
            TypeIcon::Mind => "brain",
            TypeIcon::List => "list",
            TypeIcon::Note => "file-text",
        }
    }
}

const ICON_RULES: &[(&[&str], TypeIcon)] = &[
    (&["project"], TypeIcon::Project),
    (&["todo", "task"], TypeIcon::Task),
    (&["event"], TypeIcon::Event),
    (&["reference"], TypeIcon::Reference),
    (&["topic", "brainstorm"], TypeIcon::Idea),
    (&["keep", "mind"], TypeIcon::Mind),
    (&["thing", "list"], TypeIcon::List),
];

/// First rule whose keyword occurs in the lowercased type name.
pub fn type_icon(t: &TypeRecord) -> TypeIcon {
    let name = t.name.to_lowercase();
    ICON_RULES
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| name.contains(n)))
        .map(|(_, icon)| *icon)
        .unwrap_or(TypeIcon::Note)
}

/// Read access to the folder tree types are derived from.
pub trait FolderTree {
    fn folder_exists(&self, path: &str) -> bool;
    /// Full paths of the immediate subfolders, in a stable order.
    fn subfolders(&self, path: &str) -> Result<Vec<String>>;
}

impl FolderTree for Vault {
    fn folder_exists(&self, path: &str) -> bool {
        VaultPath::try_from(path)
            .ok()
            .and_then(|p| self.entry(&p))
            .is_some_and(|e| matches!(e, Entry::Folder(_)))
    }

    fn subfolders(&self, path: &str) -> Result<Vec<String>> {
        let rel = VaultPath::try_from(path)?;
        let subs = Vault::subfolders(self, &rel)?;
        Ok(subs.iter().map(VaultPath::as_str_lossy).collect())
    }
}

#[derive(Debug, Clone)]
pub struct TypeTaxonomy {
    roots: Vec<String>,
    excluded: Vec<String>,
    depth: DepthPolicy,
    cached: Vec<TypeRecord>,
    valid: bool,
}

impl TypeTaxonomy {
    pub fn new(settings: &Settings) -> Self {
        Self {
            roots: settings.type_folders.clone(),
            excluded: settings.excluded_folders.clone(),
            depth: settings.type_depth,
            cached: Vec::new(),
            valid: false,
        }
    }

    /// Adopts new settings; the next read recomputes.
    pub fn configure(&mut self, settings: &Settings) {
        self.roots = settings.type_folders.clone();
        self.excluded = settings.excluded_folders.clone();
        self.depth = settings.type_depth;
        self.invalidate();
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The current type set. If a rebuild fails, the last complete set is
    /// returned and the cache stays invalid so the next read retries.
    pub fn all_types(&mut self, tree: &impl FolderTree) -> &[TypeRecord] {
        if !self.valid {
            if let Err(err) = self.rebuild(tree) {
                warn!(error = %err, "type rebuild failed; keeping previous types");
            }
        }
        &self.cached
    }

    /// Recomputes the full set; the cache is replaced only once the walk is done.
    pub fn rebuild(&mut self, tree: &impl FolderTree) -> Result<()> {
        let mut out = Vec::new();
        for root in &self.roots {
            let root = root.trim().trim_matches('/');
            if root.is_empty() || !tree.folder_exists(root) {
                debug!(root, "type root missing; skipped");
                continue;
            }
            self.scan(tree, root, &mut out)?;
        }
        debug!(types = out.len(), depth = ?self.depth, "type cache refreshed");
        self.cached = out;
        self.valid = true;
        Ok(())
    }

    fn scan(&self, tree: &impl FolderTree, folder: &str, out: &mut Vec<TypeRecord>) -> Result<()> {
        if self.is_excluded(folder) {
            return Ok(());
        }
        let subs: Vec<String> = tree
            .subfolders(folder)?
            .into_iter()
            .filter(|s| !self.is_excluded(s))
            .collect();

        match self.depth {
            DepthPolicy::All => {
                out.push(TypeRecord::from_folder(folder));
                for sub in &subs {
                    self.scan(tree, sub, out)?;
                }
            }
            DepthPolicy::Leaf => {
                if subs.is_empty() {
                    out.push(TypeRecord::from_folder(folder));
                } else {
                    for sub in &subs {
                        self.scan(tree, sub, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Segment-aware prefix match: `Sys` excludes `Sys/x` but not `System`.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded.iter().any(|ex| {
            let ex = ex.trim().trim_end_matches('/');
            if ex.is_empty() {
                return false;
            }
            path == ex || path.strip_prefix(ex).is_some_and(|rest| rest.starts_with('/'))
        })
    }

    pub fn type_for_path(&mut self, tree: &impl FolderTree, path: &str) -> Option<TypeRecord> {
        self.all_types(tree).iter().find(|t| t.path == path).cloned()
    }

    pub fn type_by_name(&mut self, tree: &impl FolderTree, name: &str) -> Option<TypeRecord> {
        let needle = name.to_lowercase();
        self.all_types(tree)
            .iter()
            .find(|t| t.name.to_lowercase() == needle)
            .cloned()
    }
}

/// Fuzzy-matches type names, best score first.
pub fn search_types(types: &[TypeRecord], query: &str, limit: usize) -> Vec<TypeRecord> {
    let q = query.trim();
    if q.is_empty() || limit == 0 {
        return Vec::new();
    }

    let pattern = Pattern::parse(q, CaseMatching::Smart, Normalization::Smart);
    let mut matcher = Matcher::new(nucleo::Config::DEFAULT);
    let mut utf32_buf = Vec::new();
    let mut hits: Vec<(u32, usize)> = types
        .iter()
        .enumerate()
        .filter_map(|(i, t)| {
            pattern
                .score(Utf32Str::new(&t.name, &mut utf32_buf), &mut matcher)
                .map(|score| (score, i))
        })
        .collect();

    // Ties keep taxonomy order.
    hits.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    hits.truncate(limit);
    hits.into_iter().map(|(_, i)| types[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[derive(Default)]
    struct MemTree {
        dirs: BTreeSet<String>,
        unreadable: BTreeSet<String>,
    }

    impl MemTree {
        fn with(paths: &[&str]) -> Self {
            let mut t = Self::default();
            for p in paths {
                t.add(p);
            }
            t
        }

        fn add(&mut self, path: &str) {
            let mut acc = String::new();
            for seg in path.split('/') {
                if !acc.is_empty() {
                    acc.push('/');
                }
                acc.push_str(seg);
                self.dirs.insert(acc.clone());
            }
        }
    }

    impl FolderTree for MemTree {
        fn folder_exists(&self, path: &str) -> bool {
            self.dirs.contains(path)
        }

        fn subfolders(&self, path: &str) -> Result<Vec<String>> {
            if self.unreadable.contains(path) {
                return Err(crate::Error::io(
                    path,
                    std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                ));
            }
            let prefix = format!("{path}/");
            Ok(self
                .dirs
                .iter()
                .filter(|p| p.strip_prefix(&prefix).is_some_and(|rest| !rest.contains('/')))
                .cloned()
                .collect())
        }
    }

    fn taxonomy(roots: &[&str], excluded: &[&str], depth: DepthPolicy) -> TypeTaxonomy {
        TypeTaxonomy::new(&Settings {
            type_folders: roots.iter().map(|s| s.to_string()).collect(),
            excluded_folders: excluded.iter().map(|s| s.to_string()).collect(),
            type_depth: depth,
            ..Settings::default()
        })
    }

    fn names(types: &[TypeRecord]) -> Vec<&str> {
        types.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn leaf_mode_records_only_leaves_in_preorder() {
        let tree = MemTree::with(&["Root/X", "Root/Y/Z"]);
        let mut tax = taxonomy(&["Root"], &[], DepthPolicy::Leaf);
        assert_eq!(names(tax.all_types(&tree)), vec!["X", "Z"]);
    }

    #[test]
    fn unreadable_folder_fails_the_whole_rebuild() {
        let mut tree = MemTree::with(&["Root/X", "Root/Y/Z"]);
        let mut tax = taxonomy(&["Root"], &[], DepthPolicy::Leaf);
        assert_eq!(names(tax.all_types(&tree)), vec!["X", "Z"]);

        tree.add("Root/W");
        tree.unreadable.insert("Root/Y".into());
        tax.invalidate();
        assert!(tax.rebuild(&tree).is_err());
        assert!(!tax.is_valid());
        // Y must not turn into a leaf type; the last complete set stays.
        assert_eq!(names(tax.all_types(&tree)), vec!["X", "Z"]);
        assert!(!tax.is_valid());

        tree.unreadable.clear();
        assert_eq!(names(tax.all_types(&tree)), vec!["W", "X", "Z"]);
        assert!(tax.is_valid());
    }

    #[test]
    fn all_mode_records_every_folder() {
        let tree = MemTree::with(&["Root/X", "Root/Y/Z"]);
        let mut tax = taxonomy(&["Root"], &[], DepthPolicy::All);
        assert_eq!(names(tax.all_types(&tree)), vec!["Root", "X", "Y", "Z"]);
        let z = tax.type_for_path(&tree, "Root/Y/Z").unwrap();
        assert_eq!(z.id, "Root/Y/Z");
        assert_eq!(z.name, "Z");
    }

    #[test]
    fn exclusion_prunes_subtree() {
        let tree = MemTree::with(&["Root/X", "Root/Y/Z"]);
        let mut tax = taxonomy(&["Root"], &["Root/Y"], DepthPolicy::All);
        assert_eq!(names(tax.all_types(&tree)), vec!["Root", "X"]);
    }

    #[test]
    fn excluded_children_make_a_leaf() {
        let tree = MemTree::with(&["Root/A/Archive", "Root/B"]);
        let mut tax = taxonomy(&["Root"], &["Root/A/Archive"], DepthPolicy::Leaf);
        assert_eq!(names(tax.all_types(&tree)), vec!["A", "B"]);
    }

    #[test]
    fn exclusion_is_segment_aware() {
        let tax = taxonomy(&[], &["Sys", " ", "Root/Y/"], DepthPolicy::Leaf);
        assert!(tax.is_excluded("Sys"));
        assert!(tax.is_excluded("Sys/Logs"));
        assert!(!tax.is_excluded("System"));
        assert!(tax.is_excluded("Root/Y/Z"));
        assert!(!tax.is_excluded(""));
    }

    #[test]
    fn missing_roots_are_skipped_in_order() {
        let tree = MemTree::with(&["B/b1", "A/a1"]);
        let mut tax = taxonomy(&["B", "Missing", "A"], &[], DepthPolicy::Leaf);
        assert_eq!(names(tax.all_types(&tree)), vec!["b1", "a1"]);
    }

    #[test]
    fn cache_is_stale_until_invalidated() {
        let mut tree = MemTree::with(&["Root/X"]);
        let mut tax = taxonomy(&["Root"], &[], DepthPolicy::Leaf);
        assert_eq!(names(tax.all_types(&tree)), vec!["X"]);

        tree.add("Root/W");
        assert_eq!(names(tax.all_types(&tree)), vec!["X"]);

        tax.invalidate();
        assert!(!tax.is_valid());
        assert_eq!(names(tax.all_types(&tree)), vec!["W", "X"]);
        assert!(tax.is_valid());
    }

    #[test]
    fn lookup_by_name_ignores_case() {
        let tree = MemTree::with(&["Root/Tasks"]);
        let mut tax = taxonomy(&["Root"], &[], DepthPolicy::Leaf);
        assert_eq!(tax.type_by_name(&tree, "tasks").unwrap().path, "Root/Tasks");
        assert!(tax.type_by_name(&tree, "nope").is_none());
    }

    #[test]
    fn icon_priority_follows_rule_order() {
        let icon = |n: &str| type_icon(&TypeRecord::from_folder(n));
        assert_eq!(icon("Projects"), TypeIcon::Project);
        assert_eq!(icon("Project Tasks"), TypeIcon::Project);
        assert_eq!(icon("TODO"), TypeIcon::Task);
        assert_eq!(icon("Events"), TypeIcon::Event);
        assert_eq!(icon("References"), TypeIcon::Reference);
        assert_eq!(icon("Brainstorms"), TypeIcon::Idea);
        assert_eq!(icon("Mindset"), TypeIcon::Mind);
        assert_eq!(icon("Shopping List"), TypeIcon::List);
        assert_eq!(icon("Misc"), TypeIcon::Note);
        assert_eq!(TypeIcon::Note.as_str(), "file-text");
    }

    #[test]
    fn fuzzy_type_search() {
        let types: Vec<TypeRecord> = ["A/Tasks", "A/Events", "B/Task Lists"]
            .iter()
            .map(|p| TypeRecord::from_folder(p))
            .collect();
        let hits = search_types(&types, "evt", 5);
        assert_eq!(names(&hits), vec!["Events"]);
        assert!(search_types(&types, "tsk", 5).len() >= 2);
        assert!(search_types(&types, "zzz", 5).is_empty());
        assert!(search_types(&types, "  ", 5).is_empty());
    }
}
