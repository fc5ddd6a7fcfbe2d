//! What the attachments panel under a note shows.
//!
//! Rendering is left to the host; this only computes the content.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::relations::AttachedNote;
use crate::{Relationships, Settings, TypeIcon, TypeRecord, VaultIndex, VaultPath};

static DATE_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));
static DATE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" \d{4}-\d{2}-\d{2}$").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewMode {
    Reading,
    LivePreview,
}

impl ViewMode {
    pub fn enabled(self, settings: &Settings) -> bool {
        match self {
            ViewMode::Reading => settings.show_in_reading_view,
            ViewMode::LivePreview => settings.show_in_live_preview,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentLink {
    pub path: VaultPath,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelItem {
    pub path: VaultPath,
    pub title: String,
    pub type_name: Option<String>,
    pub icon: String,
    pub badges: Vec<Badge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Panel {
    pub path: VaultPath,
    pub parents: Vec<ParentLink>,
    pub attached: Vec<PanelItem>,
    /// Types offered when adding a new attached note.
    pub types: Vec<TypeRecord>,
}

impl Panel {
    pub fn count(&self) -> usize {
        self.attached.len()
    }
}

/// Builds the panel for `path`, or `None` if the mode is turned off or the note is unknown.
pub fn build_panel(
    index: &VaultIndex,
    settings: &Settings,
    types: &[TypeRecord],
    path: &VaultPath,
    mode: ViewMode,
) -> Option<Panel> {
    if !mode.enabled(settings) || !index.contains(path) {
        return None;
    }
    let rel = Relationships::new(index, settings.link_key());

    let parents = rel
        .all_parent_notes(path)
        .into_iter()
        .map(|p| {
            let fm_title = index.frontmatter(&p).and_then(|fm| fm.title());
            ParentLink {
                title: display_title(fm_title, &p.basename()),
                path: p,
            }
        })
        .collect();

    let attached = rel
        .attached_notes(path, types)
        .into_iter()
        .map(|note| panel_item(note, &settings.badge_properties))
        .collect();

    Some(Panel {
        path: path.clone(),
        parents,
        attached,
        types: types.to_vec(),
    })
}

fn panel_item(note: AttachedNote, badge_keys: &[String]) -> PanelItem {
    let fm_title = note.frontmatter.get("title").and_then(|v| v.as_str());
    let title = display_title(fm_title, &note.path.basename());
    let icon = note.note_type.as_ref().map_or(TypeIcon::Note, TypeRecord::icon);
    let badges = badge_keys
        .iter()
        .filter_map(|key| {
            let value = note.frontmatter.get(key)?.scalar_text()?;
            Some(Badge {
                key: key.clone(),
                value,
            })
        })
        .collect();

    PanelItem {
        path: note.path,
        title,
        type_name: note.note_type.map(|t| t.name),
        icon: icon.as_str().to_string(),
        badges,
    }
}

/// Front matter title or basename, with a trailing ` YYYY-MM-DD` dropped unless the title is only a date.
pub fn display_title(fm_title: Option<&str>, basename: &str) -> String {
    let title = fm_title.filter(|t| !t.is_empty()).unwrap_or(basename);
    if DATE_ONLY.is_match(title) {
        return title.to_string();
    }
    DATE_SUFFIX.replace(title, "").into_owned()
}

/// Choices offered when editing a badge.
pub fn property_options(key: &str) -> &'static [&'static str] {
    match key {
        "status" => &["open", "working", "blocked", "wont-do", "complete"],
        "priority" => &["high", "medium", "normal", "low"],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_suffix_is_hidden() {
        assert_eq!(display_title(None, "Standup 2024-03-01"), "Standup");
        assert_eq!(display_title(Some("Plan 2024-03-01"), "x"), "Plan");
        assert_eq!(display_title(None, "2024-03-01"), "2024-03-01");
        assert_eq!(display_title(Some(""), "Base"), "Base");
        assert_eq!(display_title(None, "Standup2024-03-01"), "Standup2024-03-01");
    }

    #[test]
    fn known_property_options() {
        assert_eq!(property_options("status").len(), 5);
        assert_eq!(property_options("priority")[0], "high");
        assert!(property_options("owner").is_empty());
    }

    #[test]
    fn disabled_mode_yields_nothing() {
        let settings = Settings {
            show_in_live_preview: false,
            ..Settings::default()
        };
        assert!(ViewMode::Reading.enabled(&settings));
        assert!(!ViewMode::LivePreview.enabled(&settings));
    }
}
