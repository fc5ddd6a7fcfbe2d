//! Link field parsing.
//!
//! A link field holds one string or a list of strings. Only strings that are
//! exactly one well-formed wikilink count as a relationship when scanning for
//! children; forward resolution is more lenient and also accepts a wikilink
//! embedded in text, or the raw string as a note name.

use std::sync::LazyLock;

use regex::Regex;
use serde_yaml::Value;

static WIKILINK_EXACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[\[([^\]|#]+)(?:#([^\]|]*))?(?:\|([^\]]+))?\]\]$").expect("valid regex")
});

static WIKILINK_ANYWHERE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[([^\]|#]+)(?:#([^\]|]*))?(?:\|([^\]]+))?\]\]").expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WikiLink {
    /// Trimmed note name or path, without fragment or alias.
    pub target: String,
    pub fragment: Option<String>,
    pub alias: Option<String>,
}

impl WikiLink {
    fn from_captures(caps: regex::Captures<'_>) -> Option<Self> {
        let target = caps.get(1)?.as_str().trim();
        if target.is_empty() {
            return None;
        }
        Some(Self {
            target: target.to_string(),
            fragment: caps
                .get(2)
                .map(|m| m.as_str().to_string())
                .filter(|s| !s.is_empty()),
            alias: caps.get(3).map(|m| m.as_str().to_string()),
        })
    }
}

/// One entry of a link field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LinkToken {
    Wiki(WikiLink),
    /// Anything that is not a whole-string wikilink.
    Raw(String),
}

impl LinkToken {
    pub fn parse(raw: &str) -> Self {
        match parse_wikilink(raw) {
            Some(w) => LinkToken::Wiki(w),
            None => LinkToken::Raw(raw.to_string()),
        }
    }

    /// The name forward resolution looks up.
    pub fn target_name(&self) -> String {
        match self {
            LinkToken::Wiki(w) => w.target.clone(),
            LinkToken::Raw(raw) => match find_wikilink(raw) {
                Some(w) => w.target,
                None => raw.trim().to_string(),
            },
        }
    }
}

/// Normalizes a link field value into its string entries, in order.
///
/// Non-string entries are dropped; they are never links.
pub fn parse_link_field(value: Option<&Value>) -> Vec<String> {
    let push = |out: &mut Vec<String>, v: &Value| {
        if let Some(s) = v.as_str() {
            if !s.trim().is_empty() {
                out.push(s.to_string());
            }
        }
    };

    let mut out = Vec::new();
    match value {
        Some(Value::Sequence(seq)) => {
            for item in seq {
                push(&mut out, item);
            }
        }
        Some(v) => push(&mut out, v),
        None => {}
    }
    out
}

/// Matches a string that is exactly one wikilink and returns it.
pub fn parse_wikilink(raw: &str) -> Option<WikiLink> {
    WIKILINK_EXACT
        .captures(raw)
        .and_then(WikiLink::from_captures)
}

/// First wikilink anywhere in the string.
pub fn find_wikilink(raw: &str) -> Option<WikiLink> {
    WIKILINK_ANYWHERE
        .captures(raw)
        .and_then(WikiLink::from_captures)
}

/// Whether `raw` is a wikilink naming the candidate by basename or by extensionless path.
///
/// Comparison is exact and case-sensitive.
pub fn matches_back(raw: &str, basename: &str, path_without_ext: &str) -> bool {
    parse_wikilink(raw).is_some_and(|w| w.target == basename || w.target == path_without_ext)
}

pub fn wikilink_to(name: &str) -> String {
    format!("[[{name}]]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_wikilink_shapes() {
        for raw in ["[[Foo]]", "[[Foo#Heading]]", "[[Foo|Alias]]", "[[ Foo #h|A]]"] {
            let w = parse_wikilink(raw).unwrap_or_else(|| panic!("{raw} should match"));
            assert_eq!(w.target, "Foo");
        }
        let w = parse_wikilink("[[Dir/Foo#Sec|Shown]]").unwrap();
        assert_eq!(w.target, "Dir/Foo");
        assert_eq!(w.fragment.as_deref(), Some("Sec"));
        assert_eq!(w.alias.as_deref(), Some("Shown"));
    }

    #[test]
    fn non_wikilinks_are_rejected() {
        for raw in [
            "Foo",
            "See [[Foo]] in passing",
            "[[Foo]] trailing",
            "[Foo](Foo.md)",
            "[[Foo]",
            "[[]]",
            "[[   ]]",
            "[[Foo|]]",
        ] {
            assert!(parse_wikilink(raw).is_none(), "{raw} should not match");
        }
    }

    #[test]
    fn matches_back_by_basename_or_path() {
        assert!(matches_back("[[Alpha]]", "Alpha", "Projects/Alpha"));
        assert!(matches_back("[[Projects/Alpha|A]]", "Alpha", "Projects/Alpha"));
        assert!(!matches_back("[[alpha]]", "Alpha", "Projects/Alpha"));
        assert!(!matches_back("Alpha", "Alpha", "Projects/Alpha"));
        assert!(!matches_back("See [[Alpha]]", "Alpha", "Projects/Alpha"));
    }

    #[test]
    fn link_field_drops_non_strings() {
        let v: Value = serde_yaml::from_str("[\"[[A]]\", 3, null, \"[[B]]\", [x], \"\"]").unwrap();
        assert_eq!(parse_link_field(Some(&v)), vec!["[[A]]", "[[B]]"]);

        let scalar: Value = serde_yaml::from_str("\"[[A]]\"").unwrap();
        assert_eq!(parse_link_field(Some(&scalar)), vec!["[[A]]"]);

        let number: Value = serde_yaml::from_str("42").unwrap();
        assert!(parse_link_field(Some(&number)).is_empty());
        assert!(parse_link_field(None).is_empty());
    }

    #[test]
    fn forward_target_name_falls_back_to_raw_text() {
        assert_eq!(LinkToken::parse("[[A#x|y]]").target_name(), "A");
        assert_eq!(LinkToken::parse("see [[B]] here").target_name(), "B");
        assert_eq!(LinkToken::parse(" Plain Name ").target_name(), "Plain Name");
        assert!(matches!(LinkToken::parse("Plain"), LinkToken::Raw(_)));
    }
}
