//! Front matter: the `---` fenced YAML block at the top of a note.
//!
//! Reads go through [`Frontmatter`], an order-preserving mapping with typed
//! accessors for the keys this crate cares about. Writes go through
//! [`process_frontmatter`], which applies a closure to the mapping and
//! persists the re-rendered note in one step.

use serde_yaml::{Mapping, Value};

use crate::fields::{FieldMap, extract_top_level_frontmatter_fields};
use crate::{Error, Result, Vault, VaultPath};

#[derive(Debug, Clone)]
pub(crate) enum FrontmatterParse {
    None,
    Valid(Value),
    Broken { error: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter(Mapping);

impl Frontmatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a YAML document; `null` (an empty block) is an empty mapping.
    pub fn from_yaml_value(v: Value) -> Option<Self> {
        match v {
            Value::Mapping(m) => Some(Self(m)),
            Value::Null => Some(Self::default()),
            _ => None,
        }
    }

    pub fn mapping(&self) -> &Mapping {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// True if the key is absent or holds a falsy value (null, false, empty string).
    pub fn is_unset(&self, key: &str) -> bool {
        match self.get(key) {
            None | Some(Value::Null) | Some(Value::Bool(false)) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(Value::String(key.to_string()), value.into());
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.0.shift_remove(key).is_some()
    }

    pub fn title(&self) -> Option<&str> {
        self.get_str("title").map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn status(&self) -> Option<&str> {
        self.get_str("status")
    }

    pub fn priority(&self) -> Option<&str> {
        self.get_str("priority")
    }

    pub fn fields(&self) -> FieldMap {
        extract_top_level_frontmatter_fields(&self.0)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.0)?)
    }
}

pub(crate) fn split_frontmatter(content: &str) -> (FrontmatterParse, &str) {
    let Some(rest) = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
    else {
        return (FrontmatterParse::None, content);
    };

    // The closing fence must sit on its own line.
    let mut idx = 0usize;
    while idx < rest.len() {
        let line_end = match rest[idx..].find('\n') {
            Some(off) => idx + off + 1,
            None => rest.len(),
        };
        let line = &rest[idx..line_end];
        if line.trim_end_matches(['\r', '\n']) == "---" {
            let fm_text = &rest[..idx];
            let body = &rest[line_end..];
            return match serde_yaml::from_str::<Value>(fm_text) {
                Ok(v) => (FrontmatterParse::Valid(v), body),
                Err(err) => (
                    FrontmatterParse::Broken {
                        error: err.to_string(),
                    },
                    body,
                ),
            };
        }
        idx = line_end;
    }

    (
        FrontmatterParse::Broken {
            error: "frontmatter fence not closed".to_string(),
        },
        content,
    )
}

/// Renders a note from its front matter and body. An empty mapping drops the fence.
pub fn render_note(fm: &Frontmatter, body: &str) -> Result<String> {
    if fm.is_empty() {
        return Ok(body.to_string());
    }
    let yaml = fm.to_yaml()?;
    Ok(format!("---\n{yaml}---\n{body}"))
}

/// Applies `f` to a note's front matter and writes the result back.
///
/// Broken front matter is reported instead of overwritten.
pub fn process_frontmatter(
    vault: &Vault,
    path: &VaultPath,
    f: impl FnOnce(&mut Frontmatter),
) -> Result<()> {
    let content = vault.read(path)?;
    let (parsed, body) = split_frontmatter(&content);
    let mut fm = match parsed {
        FrontmatterParse::None => Frontmatter::new(),
        FrontmatterParse::Valid(v) => {
            Frontmatter::from_yaml_value(v).ok_or_else(|| Error::FrontmatterShape(path.clone()))?
        }
        FrontmatterParse::Broken { error } => {
            return Err(Error::FrontmatterBroken {
                path: path.clone(),
                error,
            });
        }
    };
    f(&mut fm);
    vault.modify(path, &render_note(&fm, body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_reads_valid_block_and_body() {
        let (fm, body) = split_frontmatter("---\ntitle: Hello\n---\n\n# Body\n");
        let FrontmatterParse::Valid(v) = fm else {
            panic!("expected valid frontmatter");
        };
        let fm = Frontmatter::from_yaml_value(v).unwrap();
        assert_eq!(fm.title(), Some("Hello"));
        assert_eq!(body, "\n# Body\n");
    }

    #[test]
    fn unclosed_fence_is_broken() {
        let (fm, body) = split_frontmatter("---\ntitle: x\nno close\n");
        assert!(matches!(fm, FrontmatterParse::Broken { .. }));
        assert_eq!(body, "---\ntitle: x\nno close\n");
    }

    #[test]
    fn no_fence_means_no_frontmatter() {
        let (fm, body) = split_frontmatter("# Just text\n");
        assert!(matches!(fm, FrontmatterParse::None));
        assert_eq!(body, "# Just text\n");
    }

    #[test]
    fn empty_block_is_empty_mapping() {
        let (fm, _) = split_frontmatter("---\n---\nbody");
        let FrontmatterParse::Valid(v) = fm else {
            panic!("expected valid frontmatter");
        };
        assert!(Frontmatter::from_yaml_value(v).unwrap().is_empty());
    }

    #[test]
    fn render_keeps_insertion_order() {
        let mut fm = Frontmatter::new();
        fm.set("title", "T");
        fm.set("attachments", "[[P]]");
        let text = render_note(&fm, "\nbody\n").unwrap();
        assert!(text.starts_with("---\ntitle: T\nattachments:"));
        assert!(text.ends_with("---\n\nbody\n"));
        let (parsed, _) = split_frontmatter(&text);
        let FrontmatterParse::Valid(v) = parsed else {
            panic!("expected valid frontmatter");
        };
        let back = Frontmatter::from_yaml_value(v).unwrap();
        assert_eq!(back.get_str("attachments"), Some("[[P]]"));
    }

    #[test]
    fn unset_treats_falsy_values_as_missing() {
        let mut fm = Frontmatter::new();
        fm.set("status", "");
        fm.set("priority", "high");
        assert!(fm.is_unset("status"));
        assert!(fm.is_unset("missing"));
        assert!(!fm.is_unset("priority"));
    }
}
