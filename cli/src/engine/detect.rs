//! Custom-file detection: entries in the managed directories that no
//! template produces.
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::Engine;
use crate::config::absolute_project_root;
use crate::config::index::Category;
use crate::error::SyncError;

/// A user-created entry inside a managed directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomFile {
    /// Path of the top-level entry in the project tree.
    pub path: PathBuf,
    /// Category whose directory holds it.
    pub category: String,
}

impl Engine {
    /// List every custom entry of the project, category by category.
    ///
    /// Uses only the template source and the project tree; the compiled
    /// cache is never consulted.
    ///
    /// # Errors
    ///
    /// Returns an error if a template directory or a managed directory
    /// exists but cannot be read.
    pub fn detect_custom(&self, project_root: &Path) -> Result<Vec<CustomFile>, SyncError> {
        let root = absolute_project_root(project_root);
        let mut found = Vec::new();
        for category in &self.index.categories {
            let dir = category.project_path(&root);
            for name in self.custom_names(category, &root)? {
                found.push(CustomFile {
                    path: dir.join(name),
                    category: category.name.clone(),
                });
            }
        }
        Ok(found)
    }

    /// Top-level names in the category's project directory that are neither
    /// produced by a template nor dynamic.
    pub(crate) fn custom_names(
        &self,
        category: &Category,
        project_root: &Path,
    ) -> Result<BTreeSet<String>, SyncError> {
        let source_dir = category.source_path(&self.settings.source_root);
        let known = self
            .index
            .known_names(category, &self.settings.source_root)
            .map_err(|e| SyncError::io(&source_dir, e))?;

        let dir = category.project_path(project_root);
        let read = match std::fs::read_dir(&dir) {
            Ok(read) => read,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(SyncError::io(&dir, e)),
        };

        let mut custom = BTreeSet::new();
        for entry in read {
            let entry = entry.map_err(|e| SyncError::io(&dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_staging_name(&name) {
                continue;
            }
            if !known.contains(&name) {
                custom.insert(name);
            }
        }
        Ok(custom)
    }
}

/// Leftover sibling temp files of an interrupted write are not user content.
fn is_staging_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(".tmplsync-tmp")
}
