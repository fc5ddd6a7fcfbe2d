use std::fmt;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::{Error, Result, VaultConfig};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VaultPath(PathBuf);

impl VaultPath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Slash-separated form, the way links and folder types spell paths.
    pub fn as_str_lossy(&self) -> String {
        self.0.to_string_lossy().replace('\\', "/")
    }

    /// File name without extension.
    pub fn basename(&self) -> String {
        self.0
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Containing folder as a slash path; empty for the vault root.
    pub fn folder(&self) -> String {
        self.0
            .parent()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default()
    }

    pub fn path_without_extension(&self) -> String {
        let s = self.as_str_lossy();
        match self.0.extension() {
            Some(ext) => s[..s.len() - ext.len() - 1].to_string(),
            None => s,
        }
    }

    pub fn join(&self, child: &str) -> Result<Self> {
        Self::try_from(self.0.join(child).as_path())
    }
}

impl fmt::Display for VaultPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str_lossy())
    }
}

impl serde::Serialize for VaultPath {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.as_str_lossy())
    }
}

impl TryFrom<&Path> for VaultPath {
    type Error = Error;

    fn try_from(value: &Path) -> Result<Self> {
        if value.as_os_str().is_empty() {
            return Err(Error::InvalidVaultPath("empty path".into()));
        }
        if value.is_absolute() {
            return Err(Error::InvalidVaultPath(
                "absolute paths are not allowed".into(),
            ));
        }

        let mut cleaned = PathBuf::new();
        for c in value.components() {
            match c {
                Component::Prefix(_) | Component::RootDir => {
                    return Err(Error::InvalidVaultPath(
                        "absolute paths are not allowed".into(),
                    ));
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(Error::InvalidVaultPath(
                        "path traversal is not allowed".into(),
                    ));
                }
                Component::Normal(part) => cleaned.push(part),
            }
        }

        if cleaned.as_os_str().is_empty() {
            return Err(Error::InvalidVaultPath("empty path".into()));
        }

        Ok(Self(cleaned))
    }
}

impl TryFrom<&str> for VaultPath {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::try_from(Path::new(value.trim_matches('/')))
    }
}

/// What a vault path currently points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Note(VaultPath),
    Folder(VaultPath),
    Other(VaultPath),
}

#[derive(Debug, Clone)]
pub struct Vault {
    root: PathBuf,
    cfg: VaultConfig,
}

impl Vault {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_config(root, VaultConfig::default())
    }

    pub fn with_config(root: impl Into<PathBuf>, cfg: VaultConfig) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            return Err(Error::VaultNotFound(root));
        }
        let root = std::fs::canonicalize(&root).map_err(|e| Error::io(&root, e))?;
        Ok(Self { root, cfg })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &VaultConfig {
        &self.cfg
    }

    pub fn to_abs(&self, rel: &VaultPath) -> PathBuf {
        self.root.join(rel.as_path())
    }

    pub fn to_rel(&self, abs: &Path) -> Result<VaultPath> {
        let abs = if abs.is_absolute() {
            abs.to_path_buf()
        } else {
            self.root.join(abs)
        };

        let abs = std::fs::canonicalize(&abs).unwrap_or(abs);
        if !abs.starts_with(&self.root) {
            return Err(Error::PathOutsideVault(abs));
        }
        let rel = abs
            .strip_prefix(&self.root)
            .map_err(|_| Error::PathOutsideVault(abs.clone()))?;
        VaultPath::try_from(rel)
    }

    pub fn is_ignored_rel(&self, rel: &Path) -> bool {
        rel.components().any(|c| {
            let Component::Normal(part) = c else {
                return false;
            };
            let s = part.to_string_lossy();
            s.starts_with('.') || self.cfg.ignore_dirs.iter().any(|d| d == &s)
        })
    }

    pub fn is_note_rel(&self, rel: &Path) -> bool {
        if self.is_ignored_rel(rel) {
            return false;
        }
        rel.extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.cfg.note_extension))
    }

    pub fn entry(&self, rel: &VaultPath) -> Option<Entry> {
        if self.is_ignored_rel(rel.as_path()) {
            return None;
        }
        let meta = std::fs::metadata(self.to_abs(rel)).ok()?;
        if meta.is_dir() {
            Some(Entry::Folder(rel.clone()))
        } else if self.is_note_rel(rel.as_path()) {
            Some(Entry::Note(rel.clone()))
        } else {
            Some(Entry::Other(rel.clone()))
        }
    }

    /// Immediate, non-ignored subfolders sorted by name.
    pub fn subfolders(&self, rel: &VaultPath) -> Result<Vec<VaultPath>> {
        let abs = self.to_abs(rel);
        let rd = std::fs::read_dir(&abs).map_err(|e| Error::io(&abs, e))?;
        let mut out = Vec::new();
        for entry in rd {
            let entry = entry.map_err(|e| Error::io(&abs, e))?;
            if !entry.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }
            let child = rel.join(&entry.file_name().to_string_lossy())?;
            if self.is_ignored_rel(child.as_path()) {
                continue;
            }
            out.push(child);
        }
        out.sort();
        Ok(out)
    }

    pub fn note_paths(&self) -> Vec<VaultPath> {
        self.walk_notes(&self.root)
    }

    /// Notes anywhere below `folder`; empty if it is not a folder.
    pub fn note_paths_under(&self, folder: &VaultPath) -> Vec<VaultPath> {
        if self.is_ignored_rel(folder.as_path()) {
            return Vec::new();
        }
        let abs = self.to_abs(folder);
        if !abs.is_dir() {
            return Vec::new();
        }
        self.walk_notes(&abs)
    }

    fn walk_notes(&self, dir: &Path) -> Vec<VaultPath> {
        let mut out = Vec::new();
        for entry in walkdir::WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = self.to_rel(entry.path()) else {
                continue;
            };
            if self.is_note_rel(rel.as_path()) {
                out.push(rel);
            }
        }
        out.sort();
        out
    }

    /// Creates a new file; fails with [`Error::DuplicateName`] if anything already lives there.
    pub fn create(&self, rel: &VaultPath, content: &str) -> Result<()> {
        let abs = self.to_abs(rel);
        if let Some(parent) = abs.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&abs)
        {
            Ok(f) => f,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::DuplicateName(rel.clone()));
            }
            Err(err) => return Err(Error::io(&abs, err)),
        };
        file.write_all(content.as_bytes())
            .map_err(|e| Error::io(&abs, e))?;
        debug!(path = %rel, "created file");
        Ok(())
    }

    pub fn read(&self, rel: &VaultPath) -> Result<String> {
        let abs = self.to_abs(rel);
        std::fs::read_to_string(&abs).map_err(|e| Error::io(&abs, e))
    }

    /// Replaces the content of an existing file.
    pub fn modify(&self, rel: &VaultPath, content: &str) -> Result<()> {
        let abs = self.to_abs(rel);
        if !abs.is_file() {
            return Err(Error::NotFound(rel.clone()));
        }
        std::fs::write(&abs, content).map_err(|e| Error::io(&abs, e))
    }

    pub fn remove(&self, rel: &VaultPath) -> Result<()> {
        let abs = self.to_abs(rel);
        std::fs::remove_file(&abs).map_err(|e| Error::io(&abs, e))
    }
}
