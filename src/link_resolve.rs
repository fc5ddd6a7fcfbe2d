use std::collections::HashMap;

use crate::{VaultIndex, VaultPath};

/// Best-match resolution of a link target against the notes in an index.
#[derive(Debug, Clone)]
pub struct LinkResolver {
    by_rel: HashMap<String, VaultPath>,
    by_rel_lower: HashMap<String, VaultPath>,
    by_stem: HashMap<String, Vec<VaultPath>>,
    by_stem_lower: HashMap<String, Vec<VaultPath>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveResult {
    Resolved(VaultPath),
    Ambiguous(Vec<VaultPath>),
    Missing,
}

impl ResolveResult {
    /// The single resolved path; ambiguity counts as no answer.
    pub fn resolved(self) -> Option<VaultPath> {
        match self {
            ResolveResult::Resolved(p) => Some(p),
            _ => None,
        }
    }
}

impl LinkResolver {
    pub fn new(index: &VaultIndex) -> Self {
        let mut by_rel = HashMap::new();
        let mut by_rel_lower = HashMap::new();
        let mut by_stem: HashMap<String, Vec<VaultPath>> = HashMap::new();
        let mut by_stem_lower: HashMap<String, Vec<VaultPath>> = HashMap::new();

        for path in index.note_paths() {
            let rel = path.as_str_lossy();
            by_rel.insert(rel.clone(), path.clone());
            by_rel_lower.insert(rel.to_lowercase(), path.clone());

            let stem = path.basename();
            by_stem_lower
                .entry(stem.to_lowercase())
                .or_default()
                .push(path.clone());
            by_stem.entry(stem).or_default().push(path.clone());
        }

        Self {
            by_rel,
            by_rel_lower,
            by_stem,
            by_stem_lower,
        }
    }

    pub fn resolve(&self, reference: &str, source: &VaultPath) -> ResolveResult {
        let r = reference.trim();
        if r.is_empty() {
            return ResolveResult::Missing;
        }

        if r.starts_with("./") || r.starts_with("../") {
            let Some(joined) = resolve_relative(&source.folder(), r) else {
                return ResolveResult::Missing;
            };
            return self.resolve_path(&joined);
        }

        // Path-ish: contains a slash.
        if r.contains('/') {
            return self.resolve_path(r.trim_start_matches('/'));
        }

        let mut candidates: Vec<VaultPath> = Vec::new();
        if let Some(v) = self.by_stem.get(r) {
            candidates.extend(v.iter().cloned());
        }
        if candidates.is_empty() {
            if let Some(v) = self.by_stem_lower.get(&r.to_lowercase()) {
                candidates.extend(v.iter().cloned());
            }
        }
        if !candidates.is_empty() {
            return pick_prefer_source(candidates, source);
        }

        // Last resort: a root-level file named with its extension.
        self.resolve_path(r)
    }

    fn resolve_path(&self, r: &str) -> ResolveResult {
        if let Some(p) = self.by_rel.get(r) {
            return ResolveResult::Resolved(p.clone());
        }
        if let Some(p) = self.by_rel_lower.get(&r.to_lowercase()) {
            return ResolveResult::Resolved(p.clone());
        }
        let with_ext = format!("{r}.md");
        if let Some(p) = self.by_rel.get(&with_ext) {
            return ResolveResult::Resolved(p.clone());
        }
        if let Some(p) = self.by_rel_lower.get(&with_ext.to_lowercase()) {
            return ResolveResult::Resolved(p.clone());
        }
        ResolveResult::Missing
    }
}

/// Joins a `./` or `../` reference onto a folder; `None` if it climbs above the vault root.
fn resolve_relative(folder: &str, reference: &str) -> Option<String> {
    let mut segments: Vec<&str> = folder.split('/').filter(|s| !s.is_empty()).collect();
    for part in reference.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}

fn pick(mut candidates: Vec<VaultPath>) -> ResolveResult {
    candidates.sort();
    candidates.dedup();
    match candidates.len() {
        0 => ResolveResult::Missing,
        1 => ResolveResult::Resolved(candidates.remove(0)),
        _ => ResolveResult::Ambiguous(candidates),
    }
}

fn pick_prefer_source(mut candidates: Vec<VaultPath>, source: &VaultPath) -> ResolveResult {
    candidates.sort();
    candidates.dedup();
    if candidates.len() <= 1 {
        return pick(candidates);
    }

    let src_dir = source.folder();
    let same_dir: Vec<VaultPath> = candidates
        .iter()
        .filter(|c| c.folder() == src_dir)
        .cloned()
        .collect();
    if !same_dir.is_empty() {
        return pick_shortest_or_ambiguous(same_dir);
    }

    pick_shortest_or_ambiguous(candidates)
}

fn pick_shortest_or_ambiguous(candidates: Vec<VaultPath>) -> ResolveResult {
    let Some(best_len) = candidates.iter().map(|c| c.as_str_lossy().len()).min() else {
        return ResolveResult::Missing;
    };
    let best: Vec<VaultPath> = candidates
        .into_iter()
        .filter(|c| c.as_str_lossy().len() == best_len)
        .collect();
    pick(best)
}
