//! Domain-specific error types for the sync engine.
//!
//! Internal modules return typed errors (e.g., [`ConfigError`], [`CacheError`])
//! while command handlers at the CLI boundary convert them to [`anyhow::Error`]
//! via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! SyncError
//! ├── NotCompiled            — link/restore before any successful compile
//! ├── Config(ConfigError)    — settings, project config, template index
//! ├── Cache(CacheError)      — slug lock and metadata persistence
//! └── Io { path, source }    — filesystem failure outside per-file batches
//! ```
//!
//! Failures on individual files during a batch are not errors of this type:
//! they are collected as [`FileError`] values inside the operation report.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Top-level error type for the sync engine.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The project has no compiled cache yet.
    #[error("project {} has not been compiled; run `tmplsync compile` first", path.display())]
    NotCompiled {
        /// Project root that was looked up.
        path: PathBuf,
    },

    /// Configuration-related error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Compiled cache error.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// An I/O error that aborts the whole operation.
    #[error("IO error at {}: {source}", path.display())]
    Io {
        /// Path involved in the failing operation.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl SyncError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Errors that arise from settings, project configuration and the template index.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The link mode is not one of `auto`, `symlink`, `copy`.
    #[error("Invalid link mode '{0}': must be one of auto, symlink, copy")]
    InvalidLinkMode(String),

    /// The template source directory could not be located.
    #[error("Template source not found: {0}")]
    SourceNotFound(String),

    /// A configuration file could not be read.
    #[error("IO error reading config file {path}: {source}")]
    Read {
        /// Path to the file that could not be read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration file contains invalid TOML.
    #[error("Invalid TOML in {file}: {message}")]
    Parse {
        /// File that failed to parse.
        file: String,
        /// Parser message.
        message: String,
    },
}

/// Errors that arise from the compiled cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The advisory lock for a project slug could not be acquired.
    #[error("Failed to lock compiled cache {slug}: {source}")]
    Lock {
        /// Project slug whose lock failed.
        slug: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Cache metadata could not be written.
    #[error("Failed to write cache metadata {path}: {message}")]
    Metadata {
        /// Metadata file path.
        path: String,
        /// Description of the failure.
        message: String,
    },
}

/// A failure on a single file during a batch operation.
///
/// Collected into reports; never aborts the batch.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FileError {
    /// Project-tree path the failure relates to.
    pub path: PathBuf,
    /// Human-readable failure description, including the cause chain.
    pub message: String,
}

impl FileError {
    /// Build a file error from any displayable error, keeping the cause chain.
    pub fn new(path: impl AsRef<Path>, err: &anyhow::Error) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            message: format!("{err:#}"),
        }
    }
}

impl std::fmt::Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}
