//! Error types for settings and project files.

use std::path::PathBuf;
use thiserror::Error;

/// File operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoAction {
    /// Reading a settings or project file.
    Read,
    /// Writing a settings or project file.
    Write,
    /// Creating a config or project directory.
    CreateDir,
}

impl core::fmt::Display for IoAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::CreateDir => "create directory",
        })
    }
}

/// Errors from settings and project files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file or directory operation failed.
    #[error("cannot {action} '{}': {source}", path.display())]
    Io {
        /// What was attempted.
        action: IoAction,
        /// Path involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Settings file is not valid TOML for [`EngineSettings`](crate::EngineSettings).
    #[error("invalid settings: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Settings could not be rendered as TOML.
    #[error("cannot encode settings: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Project JSON could not be parsed or produced.
    #[error("invalid project JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Project written by a newer format version.
    #[error("unsupported project version {found} (newest supported is {supported})")]
    UnsupportedVersion {
        /// Version found in the file.
        found: u32,
        /// Newest version this build reads.
        supported: u32,
    },
}

impl ConfigError {
    fn io(action: IoAction, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// A failed read of `path`.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::io(IoAction::Read, path, source)
    }

    /// A failed write of `path`.
    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::io(IoAction::Write, path, source)
    }

    /// A failed directory creation.
    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::io(IoAction::CreateDir, path, source)
    }

    /// Returns `true` if the error is a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}
