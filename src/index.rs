use std::collections::HashMap;
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::frontmatter::{Frontmatter, FrontmatterParse, split_frontmatter};
use crate::{Error, Result, Vault, VaultPath};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontmatterStatus {
    None,
    Valid,
    Broken { error: String },
}

#[derive(Debug, Clone)]
pub struct NoteMeta {
    pub path: VaultPath,
    pub mtime: SystemTime,
    pub status: FrontmatterStatus,
    /// Parsed front matter; empty when missing or broken.
    pub frontmatter: Frontmatter,
}

/// Live metadata for every note in the vault, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct VaultIndex {
    notes: HashMap<VaultPath, NoteMeta>,
}

impl VaultIndex {
    pub fn build(vault: &Vault) -> Result<Self> {
        let mut idx = Self::default();
        for rel in vault.note_paths() {
            // One unreadable note must not hide the rest of the vault.
            if let Err(err) = idx.upsert_path(vault, rel.clone()) {
                warn!(path = %rel, error = %err, "skipping unreadable note");
            }
        }
        debug!(notes = idx.notes.len(), "metadata index built");
        Ok(idx)
    }

    /// Re-reads one note. Returns whether its front matter differs from the indexed copy.
    pub fn upsert_path(&mut self, vault: &Vault, rel: VaultPath) -> Result<bool> {
        if !vault.is_note_rel(rel.as_path()) {
            return Ok(false);
        }

        let abs = vault.to_abs(&rel);
        let meta = std::fs::metadata(&abs).map_err(|e| Error::io(&abs, e))?;
        if !meta.is_file() {
            return Ok(false);
        }
        let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let bytes = std::fs::read(&abs).map_err(|e| Error::io(&abs, e))?;

        let (status, frontmatter) = match String::from_utf8(bytes) {
            Ok(content) => parse_status(&content),
            Err(err) => (
                FrontmatterStatus::Broken {
                    error: format!("note is not valid UTF-8: {err}"),
                },
                Frontmatter::new(),
            ),
        };

        let note = NoteMeta {
            path: rel.clone(),
            mtime,
            status,
            frontmatter,
        };
        let changed = self
            .notes
            .get(&rel)
            .is_none_or(|old| old.frontmatter != note.frontmatter || old.status != note.status);
        self.notes.insert(rel, note);
        Ok(changed)
    }

    pub fn remove_path(&mut self, rel: &VaultPath) -> bool {
        self.notes.remove(rel).is_some()
    }

    /// Drops every note below `folder` and returns their paths, sorted.
    pub fn remove_under(&mut self, folder: &VaultPath) -> Vec<VaultPath> {
        let mut gone: Vec<VaultPath> = self
            .notes
            .keys()
            .filter(|p| *p != folder && p.as_path().starts_with(folder.as_path()))
            .cloned()
            .collect();
        for p in &gone {
            self.notes.remove(p);
        }
        gone.sort();
        gone
    }

    pub fn note(&self, path: &VaultPath) -> Option<&NoteMeta> {
        self.notes.get(path)
    }

    pub fn frontmatter(&self, path: &VaultPath) -> Option<&Frontmatter> {
        self.notes.get(path).map(|n| &n.frontmatter)
    }

    pub fn contains(&self, path: &VaultPath) -> bool {
        self.notes.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn note_paths(&self) -> impl Iterator<Item = &VaultPath> {
        self.notes.keys()
    }

    pub(crate) fn notes_iter(&self) -> impl Iterator<Item = (&VaultPath, &NoteMeta)> {
        self.notes.iter()
    }

    pub fn notes_with_broken_frontmatter(&self) -> impl Iterator<Item = (&VaultPath, &str)> {
        self.notes.iter().filter_map(|(p, n)| match &n.status {
            FrontmatterStatus::Broken { error } => Some((p, error.as_str())),
            _ => None,
        })
    }

    pub fn link_resolver(&self) -> crate::LinkResolver {
        crate::LinkResolver::new(self)
    }
}

fn parse_status(content: &str) -> (FrontmatterStatus, Frontmatter) {
    match split_frontmatter(content).0 {
        FrontmatterParse::None => (FrontmatterStatus::None, Frontmatter::new()),
        FrontmatterParse::Valid(v) => match Frontmatter::from_yaml_value(v) {
            Some(fm) => (FrontmatterStatus::Valid, fm),
            None => (
                FrontmatterStatus::Broken {
                    error: "frontmatter is not a mapping".into(),
                },
                Frontmatter::new(),
            ),
        },
        FrontmatterParse::Broken { error } => {
            (FrontmatterStatus::Broken { error }, Frontmatter::new())
        }
    }
}
