use std::cmp::Ordering;

use tracing::debug;

use crate::fields::FieldMap;
use crate::frontmatter::process_frontmatter;
use crate::links::{LinkToken, matches_back, parse_link_field, wikilink_to};
use crate::{Result, TypeRecord, Vault, VaultIndex, VaultPath};

/// A note whose link field points at a given parent.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AttachedNote {
    pub path: VaultPath,
    /// Type of the folder holding the note, if that folder is a type.
    pub note_type: Option<TypeRecord>,
    pub frontmatter: FieldMap,
}

/// Answers "what points at X" and "what does X point at" from the current index.
///
/// Nothing is cached: every call scans the snapshot it was given.
#[derive(Debug, Clone, Copy)]
pub struct Relationships<'a> {
    index: &'a VaultIndex,
    link_key: &'a str,
}

impl<'a> Relationships<'a> {
    pub fn new(index: &'a VaultIndex, link_key: &'a str) -> Self {
        Self { index, link_key }
    }

    /// Raw string entries of a note's link field.
    pub fn link_values(&self, path: &VaultPath) -> Vec<String> {
        let fm = self.index.frontmatter(path);
        parse_link_field(fm.and_then(|fm| fm.get(self.link_key)))
    }

    /// Notes attached to `parent`, sorted by basename.
    pub fn attached_notes(&self, parent: &VaultPath, types: &[TypeRecord]) -> Vec<AttachedNote> {
        let parent_name = parent.basename();
        let parent_path = parent.path_without_extension();
        debug!(parent = %parent, "scanning for attached notes");

        let mut out = Vec::new();
        for (path, note) in self.index.notes_iter() {
            if path == parent {
                continue;
            }
            let values = parse_link_field(note.frontmatter.get(self.link_key));
            if !values
                .iter()
                .any(|raw| matches_back(raw, &parent_name, &parent_path))
            {
                continue;
            }
            let folder = path.folder();
            out.push(AttachedNote {
                path: path.clone(),
                note_type: types.iter().find(|t| t.path == folder).cloned(),
                frontmatter: note.frontmatter.fields(),
            });
        }

        out.sort_by(|a, b| {
            locale_cmp(&a.path.basename(), &b.path.basename()).then_with(|| a.path.cmp(&b.path))
        });
        debug!(parent = %parent, found = out.len(), "attached notes");
        out
    }

    /// Every parent the child's link field resolves to, in field order. Dangling links are skipped.
    pub fn all_parent_notes(&self, child: &VaultPath) -> Vec<VaultPath> {
        let values = self.link_values(child);
        if values.is_empty() {
            return Vec::new();
        }
        let resolver = self.index.link_resolver();
        values
            .iter()
            .filter_map(|raw| {
                let name = LinkToken::parse(raw).target_name();
                let hit = resolver.resolve(&name, child).resolved();
                if hit.is_none() {
                    debug!(child = %child, link = raw.as_str(), "unresolved parent link");
                }
                hit
            })
            .collect()
    }

    pub fn parent_note(&self, child: &VaultPath) -> Option<VaultPath> {
        self.all_parent_notes(child).into_iter().next()
    }
}

/// Points the child's link field at `parent`, replacing whatever it held.
pub fn attach_note(vault: &Vault, link_key: &str, child: &VaultPath, parent: &VaultPath) -> Result<()> {
    let link = wikilink_to(&parent.basename());
    process_frontmatter(vault, child, |fm| fm.set(link_key, link))?;
    debug!(child = %child, parent = %parent, "attached");
    Ok(())
}

/// Removes the child's link field entirely.
pub fn detach_note(vault: &Vault, link_key: &str, child: &VaultPath) -> Result<()> {
    process_frontmatter(vault, child, |fm| {
        fm.remove(link_key);
    })?;
    debug!(child = %child, "detached");
    Ok(())
}

/// Case-insensitive ordering with a case-sensitive tiebreak, close to a locale collation.
pub fn locale_cmp(a: &str, b: &str) -> Ordering {
    let fold = |s: &str| s.chars().flat_map(char::to_lowercase).collect::<String>();
    fold(a).cmp(&fold(b)).then_with(|| b.cmp(a))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_cmp_folds_case() {
        let mut names = vec!["beta", "Alpha", "alpha", "Gamma"];
        names.sort_by(|a, b| locale_cmp(a, b));
        assert_eq!(names, vec!["alpha", "Alpha", "beta", "Gamma"]);
    }
}
