use std::path::PathBuf;

use crate::VaultPath;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("vault root does not exist: {0}")]
    VaultNotFound(PathBuf),

    #[error("invalid vault path: {0}")]
    InvalidVaultPath(String),

    #[error("path is outside vault: {0}")]
    PathOutsideVault(PathBuf),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("frontmatter yaml parse error: {0}")]
    FrontmatterYaml(#[from] serde_yaml::Error),

    #[error("broken frontmatter in {path}: {error}")]
    FrontmatterBroken { path: VaultPath, error: String },

    #[error("frontmatter is not a mapping: {0}")]
    FrontmatterShape(VaultPath),

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("settings toml error: {0}")]
    SettingsToml(String),

    #[error("file already exists: {0}")]
    DuplicateName(VaultPath),

    #[error("not found in vault: {0}")]
    NotFound(VaultPath),

    #[error("template step failed: {0}")]
    Template(String),

    #[error("background task failed: {0}")]
    Task(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
