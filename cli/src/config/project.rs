//! Per-project configuration: the render context for a project's templates.
use std::path::{Path, PathBuf};

use super::toml_loader;
use crate::error::ConfigError;

/// File name of the project configuration, relative to the project root.
pub const PROJECT_CONFIG_FILE: &str = ".tmplsync.toml";

/// A project's configuration, converted to a JSON value for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectConfig {
    /// Where the configuration was (or would be) read from.
    pub path: PathBuf,
    /// Whole document as a JSON object; empty when the file is absent.
    pub values: serde_json::Value,
}

impl ProjectConfig {
    /// Load `<project_root>/.tmplsync.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(project_root: &Path) -> Result<Self, ConfigError> {
        let path = project_root.join(PROJECT_CONFIG_FILE);
        let document: toml::Table = toml_loader::load_config(&path)?;
        let values = serde_json::to_value(document).map_err(|e| ConfigError::Parse {
            file: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { path, values })
    }
}
