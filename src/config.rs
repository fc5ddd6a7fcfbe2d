use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{DepthPolicy, Error, Result, Vault};

pub const DEFAULT_ATTACHMENT_KEY: &str = "attachments";

#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Directory names to ignore anywhere in the path.
    pub ignore_dirs: Vec<String>,
    /// File extension (without dot) of notes.
    pub note_extension: String,
    /// Coalescing window for active-view switches.
    pub view_debounce: Duration,
    /// Coalescing window for front matter edits.
    pub metadata_debounce: Duration,
    /// Coalescing window for create/delete/rename.
    pub structure_debounce: Duration,
    /// Whether a burst suppressed by a window gets one catch-up run once it is quiet.
    pub trailing_refresh: bool,
    /// How long note creation waits for a templating step before writing front matter.
    pub template_wait: Duration,
    /// Settings TOML path (relative to vault root).
    pub settings_path: PathBuf,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            ignore_dirs: vec![
                ".obsidian".into(),
                ".git".into(),
                ".trash".into(),
                "node_modules".into(),
            ],
            note_extension: "md".into(),
            view_debounce: Duration::from_millis(200),
            metadata_debounce: Duration::from_millis(300),
            structure_debounce: Duration::from_millis(500),
            trailing_refresh: true,
            template_wait: Duration::from_millis(100),
            settings_path: PathBuf::from(".obsidian/oxattach/settings.toml"),
        }
    }
}

/// Maps a folder to the note whose content seeds new notes created in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderTemplate {
    pub folder: String,
    pub template: String,
}

/// The persisted settings record. Missing keys fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub enable_logging: bool,
    /// Front matter key that carries parent links.
    pub attachment_key: String,
    pub type_depth: DepthPolicy,
    pub excluded_folders: Vec<String>,
    /// Root folders scanned for types, in order.
    pub type_folders: Vec<String>,
    pub show_in_reading_view: bool,
    pub show_in_live_preview: bool,
    /// Front matter keys rendered as badges on attached notes.
    pub badge_properties: Vec<String>,
    pub folder_templates: Vec<FolderTemplate>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable_logging: false,
            attachment_key: DEFAULT_ATTACHMENT_KEY.into(),
            type_depth: DepthPolicy::Leaf,
            excluded_folders: vec!["System".into(), ".obsidian".into(), ".trash".into()],
            type_folders: vec!["01 Action Items".into(), "02 Pages".into()],
            show_in_reading_view: true,
            show_in_live_preview: true,
            badge_properties: vec!["status".into(), "priority".into()],
            folder_templates: Vec::new(),
        }
    }
}

impl Settings {
    /// The link field key, never empty.
    pub fn link_key(&self) -> &str {
        let k = self.attachment_key.trim();
        if k.is_empty() { DEFAULT_ATTACHMENT_KEY } else { k }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|err| Error::SettingsToml(err.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|err| Error::SettingsToml(err.to_string()))
    }

    /// Loads settings from the vault, or defaults if the file does not exist.
    pub fn load(vault: &Vault) -> Result<Self> {
        let path = vault.root().join(&vault.config().settings_path);
        match std::fs::read_to_string(&path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(Error::io(&path, err)),
        }
    }

    pub fn save(&self, vault: &Vault) -> Result<PathBuf> {
        let path = vault.root().join(&vault.config().settings_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        std::fs::write(&path, self.to_toml_string()?).map_err(|e| Error::io(&path, e))?;
        Ok(path)
    }
}
