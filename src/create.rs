//! Creating a note that is already attached to a parent.
//!
//! A [`TemplateHook`] may seed the empty note before its front matter is
//! written. The hook gets a bounded amount of time; if it fails, the half-made
//! note is removed and recreated with its front matter embedded directly.
//! Once the wait is over the hook can no longer write through its
//! [`TemplateTarget`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::frontmatter::{Frontmatter, process_frontmatter, render_note};
use crate::links::wikilink_to;
use crate::{Error, FolderTemplate, Result, Settings, TypeRecord, Vault, VaultPath};

pub const DEFAULT_STATUS: &str = "open";
pub const DEFAULT_PRIORITY: &str = "normal";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOptions {
    /// Appended after the front matter; empty means no body.
    pub body: String,
    pub status: String,
    pub priority: String,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            body: String::new(),
            status: DEFAULT_STATUS.into(),
            priority: DEFAULT_PRIORITY.into(),
        }
    }
}

/// The note a [`TemplateHook`] is allowed to fill.
#[derive(Debug)]
pub struct TemplateTarget {
    vault: Vault,
    path: VaultPath,
    title: String,
    closed: Mutex<bool>,
}

impl TemplateTarget {
    pub fn new(vault: Vault, path: VaultPath, title: impl Into<String>) -> Self {
        Self {
            vault,
            path,
            title: title.into(),
            closed: Mutex::new(false),
        }
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    pub fn path(&self) -> &VaultPath {
        &self.path
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn read(&self) -> Result<String> {
        self.vault.read(&self.path)
    }

    /// Replaces the note content. Returns `false` without writing once the
    /// target is closed.
    pub fn write(&self, content: &str) -> Result<bool> {
        let closed = self.closed.lock().unwrap_or_else(|e| e.into_inner());
        if *closed {
            return Ok(false);
        }
        self.vault.modify(&self.path, content)?;
        Ok(true)
    }

    /// Blocks until any in-flight write is done; later writes are dropped.
    pub fn close(&self) {
        *self.closed.lock().unwrap_or_else(|e| e.into_inner()) = true;
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Something that fills a freshly created, empty note.
///
/// All writes must go through [`TemplateTarget::write`].
pub trait TemplateHook: Send + Sync {
    fn apply(&self, target: &TemplateTarget) -> Result<()>;
}

/// Seeds new notes from a per-folder template note. `{{title}}` is replaced with the note title.
#[derive(Debug, Clone, Default)]
pub struct FolderTemplates {
    templates: Vec<FolderTemplate>,
}

impl FolderTemplates {
    pub fn new(templates: Vec<FolderTemplate>) -> Self {
        Self { templates }
    }

    pub fn from_settings(settings: &Settings) -> Option<Self> {
        if settings.folder_templates.is_empty() {
            None
        } else {
            Some(Self::new(settings.folder_templates.clone()))
        }
    }

    /// Template note for a folder; the longest matching folder prefix wins.
    pub fn template_for(&self, folder: &str) -> Option<&str> {
        self.templates
            .iter()
            .filter(|t| {
                let f = t.folder.trim().trim_matches('/');
                !f.is_empty()
                    && (folder == f
                        || folder.strip_prefix(f).is_some_and(|rest| rest.starts_with('/')))
            })
            .max_by_key(|t| t.folder.trim().trim_matches('/').len())
            .map(|t| t.template.as_str())
    }
}

impl TemplateHook for FolderTemplates {
    fn apply(&self, target: &TemplateTarget) -> Result<()> {
        let vault = target.vault();
        let path = target.path();
        let Some(template) = self.template_for(&path.folder()) else {
            return Ok(());
        };
        let template_path = VaultPath::try_from(template)?;
        let template_path = if template_path.as_path().extension().is_some() {
            template_path
        } else {
            VaultPath::try_from(format!("{template}.{}", vault.config().note_extension).as_str())?
        };
        let text = vault
            .read(&template_path)
            .map_err(|err| Error::Template(format!("{template_path}: {err}")))?;

        // Someone else already filled the note.
        if !target.read()?.is_empty() {
            return Ok(());
        }
        if target.write(&text.replace("{{title}}", target.title()))? {
            debug!(path = %path, template = %template_path, "template applied");
        } else {
            debug!(path = %path, template = %template_path, "template arrived too late; dropped");
        }
        Ok(())
    }
}

/// Creates `type.path/title.md` linked to `parent`.
///
/// Fails with [`Error::DuplicateName`] without touching anything if the note exists.
pub async fn create_attached_note(
    vault: &Vault,
    link_key: &str,
    hook: Option<Arc<dyn TemplateHook>>,
    parent: &VaultPath,
    note_type: &TypeRecord,
    title: &str,
    opts: &CreateOptions,
) -> Result<VaultPath> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::InvalidVaultPath("note title is empty".into()));
    }
    let path = VaultPath::try_from(
        format!(
            "{}/{title}.{}",
            note_type.path.trim_matches('/'),
            vault.config().note_extension
        )
        .as_str(),
    )?;
    if vault.to_abs(&path).exists() {
        return Err(Error::DuplicateName(path));
    }

    let link = wikilink_to(&parent.basename());
    match hook {
        Some(hook) => {
            vault.create(&path, "")?;
            if let Err(err) = create_with_hook(vault, link_key, hook, &path, title, &link, opts).await
            {
                warn!(path = %path, error = %err, "templated creation failed; using standard creation");
                vault.remove(&path)?;
                create_embedded(vault, link_key, &path, title, &link, opts)?;
            }
        }
        None => create_embedded(vault, link_key, &path, title, &link, opts)?,
    }

    info!(path = %path, parent = %parent, "created attached note");
    Ok(path)
}

async fn create_with_hook(
    vault: &Vault,
    link_key: &str,
    hook: Arc<dyn TemplateHook>,
    path: &VaultPath,
    title: &str,
    link: &str,
    opts: &CreateOptions,
) -> Result<()> {
    run_hook(vault, hook, path, title, vault.config().template_wait).await?;

    process_frontmatter(vault, path, |fm| {
        fm.set("title", title);
        fm.set(link_key, link);
        if fm.is_unset("status") {
            fm.set("status", opts.status.as_str());
        }
        if fm.is_unset("priority") {
            fm.set("priority", opts.priority.as_str());
        }
    })?;

    if !opts.body.is_empty() {
        let content = vault.read(path)?;
        vault.modify(path, &format!("{content}\n{}", opts.body))?;
    }
    Ok(())
}

/// Runs the hook off the async runtime. A hook still running after `wait` is
/// left behind with its target closed.
async fn run_hook(
    vault: &Vault,
    hook: Arc<dyn TemplateHook>,
    path: &VaultPath,
    title: &str,
    wait: Duration,
) -> Result<()> {
    let target = Arc::new(TemplateTarget::new(vault.clone(), path.clone(), title));
    let task = {
        let target = Arc::clone(&target);
        tokio::task::spawn_blocking(move || hook.apply(&target))
    };

    let res = match tokio::time::timeout(wait, task).await {
        Ok(Ok(res)) => res.map_err(|err| Error::Template(err.to_string())),
        Ok(Err(join_err)) => Err(Error::Template(join_err.to_string())),
        Err(_) => {
            debug!(wait_ms = wait.as_millis() as u64, "template step still running; proceeding");
            Ok(())
        }
    };
    let closing = Arc::clone(&target);
    tokio::task::spawn_blocking(move || closing.close())
        .await
        .map_err(|err| Error::Task(err.to_string()))?;
    res
}

fn create_embedded(
    vault: &Vault,
    link_key: &str,
    path: &VaultPath,
    title: &str,
    link: &str,
    opts: &CreateOptions,
) -> Result<()> {
    let mut fm = Frontmatter::new();
    fm.set("title", title);
    fm.set(link_key, link);
    fm.set("status", opts.status.as_str());
    fm.set("priority", opts.priority.as_str());
    let content = render_note(&fm, &format!("\n{}", opts.body))?;
    vault.create(path, &content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_template_folder_wins() {
        let t = FolderTemplates::new(vec![
            FolderTemplate {
                folder: "01 Action Items".into(),
                template: "Templates/Generic".into(),
            },
            FolderTemplate {
                folder: "01 Action Items/Tasks/".into(),
                template: "Templates/Task".into(),
            },
        ]);
        assert_eq!(t.template_for("01 Action Items/Tasks"), Some("Templates/Task"));
        assert_eq!(t.template_for("01 Action Items/Events"), Some("Templates/Generic"));
        assert_eq!(t.template_for("01 Action ItemsX"), None);
        assert_eq!(t.template_for(""), None);
    }

    #[test]
    fn closed_target_drops_writes() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::open(dir.path()).unwrap();
        let path = VaultPath::try_from("note.md").unwrap();
        vault.create(&path, "").unwrap();

        let target = TemplateTarget::new(vault.clone(), path.clone(), "note");
        assert!(target.write("first").unwrap());
        target.close();
        assert!(target.is_closed());
        assert!(!target.write("second").unwrap());
        assert_eq!(vault.read(&path).unwrap(), "first");
    }

    #[test]
    fn default_options() {
        let o = CreateOptions::default();
        assert_eq!(o.status, "open");
        assert_eq!(o.priority, "normal");
        assert!(o.body.is_empty());
    }
}
