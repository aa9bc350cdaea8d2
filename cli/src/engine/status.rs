//! Read-only status of a project's managed tree.
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use super::{Engine, slash_path, top_level};
use crate::config::absolute_project_root;
use crate::error::SyncError;
use crate::resources::helpers::fs as fs_helpers;
use crate::resources::managed_file::LinkMethod;

/// How outputs would be placed, as far as is known without probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMethodStatus {
    /// Symbolic links.
    Symlink,
    /// Real copies.
    Copy,
    /// Auto mode with no capability answer on record.
    Undetermined,
}

impl From<Option<LinkMethod>> for LinkMethodStatus {
    fn from(method: Option<LinkMethod>) -> Self {
        match method {
            Some(LinkMethod::Symlink) => Self::Symlink,
            Some(LinkMethod::Copy) => Self::Copy,
            None => Self::Undetermined,
        }
    }
}

impl fmt::Display for LinkMethodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Symlink => "symlink",
            Self::Copy => "copy",
            Self::Undetermined => "undetermined",
        })
    }
}

/// Per-category counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryStatus {
    /// Category name.
    pub name: String,
    /// Outputs recorded in the compiled cache.
    pub compiled: usize,
    /// Working symlinks.
    pub linked: usize,
    /// Managed real files.
    pub real: usize,
    /// Broken symlinks.
    pub broken: usize,
    /// User-created top-level entries.
    pub custom: usize,
}

/// Snapshot of a project's managed tree and compiled cache.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Absolute project root.
    pub project: PathBuf,
    /// Cache key of the project.
    pub slug: String,
    /// Whether a compiled cache exists.
    pub compiled: bool,
    /// Whether the cache matches the current config and tool version.
    pub cache_fresh: bool,
    /// Placement method.
    pub link_method: LinkMethodStatus,
    /// Working symlinks, all categories.
    pub linked: usize,
    /// Managed real files, all categories.
    pub real: usize,
    /// Broken symlinks, all categories.
    pub broken: usize,
    /// User-created entries, all categories.
    pub custom: usize,
    /// Per-category breakdown, in index order.
    pub categories: Vec<CategoryStatus>,
}

impl Engine {
    /// Inspect the project without writing anything or probing symlink
    /// support.
    ///
    /// # Errors
    ///
    /// Returns an error if a managed directory exists but cannot be read.
    pub fn status(&self, project_root: &Path) -> Result<StatusReport, SyncError> {
        let root = absolute_project_root(project_root);
        let layout = self.layout(&root);
        let metadata = layout.load_metadata();

        let mut report = StatusReport {
            project: root.clone(),
            slug: layout.slug().to_string(),
            compiled: metadata.is_some(),
            cache_fresh: self.is_fresh(&root),
            link_method: self.peek_link_method().into(),
            linked: 0,
            real: 0,
            broken: 0,
            custom: 0,
            categories: Vec::new(),
        };

        for category in &self.index.categories {
            let dir = category.project_path(&root);
            let custom = self.custom_names(category, &root)?;
            let mut counts = CategoryStatus {
                name: category.name.clone(),
                compiled: metadata
                    .as_ref()
                    .and_then(|m| m.categories.get(&category.name))
                    .map_or(0, Vec::len),
                custom: custom.len(),
                ..CategoryStatus::default()
            };

            let files = fs_helpers::list_files(&dir).map_err(|e| SyncError::io(&dir, e))?;
            for file in files {
                let rel = slash_path(&file);
                let top = top_level(&rel);
                if self.index.is_dynamic(top) {
                    continue;
                }
                let path = dir.join(&file);
                let link = std::fs::read_link(&path).ok();
                let into_cache = link.as_ref().is_some_and(|t| layout.contains(t));
                if custom.contains(top) && !into_cache {
                    continue;
                }
                if link.is_none() {
                    counts.real += 1;
                } else if fs_helpers::is_broken_symlink(&path) {
                    counts.broken += 1;
                } else {
                    counts.linked += 1;
                }
            }

            report.linked += counts.linked;
            report.real += counts.real;
            report.broken += counts.broken;
            report.custom += counts.custom;
            report.categories.push(counts);
        }
        Ok(report)
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cache = match (self.compiled, self.cache_fresh) {
            (false, _) => "not compiled",
            (true, true) => "fresh",
            (true, false) => "stale",
        };
        writeln!(f, "Project:     {}", self.project.display())?;
        writeln!(f, "Cache:       {} ({cache})", self.slug)?;
        writeln!(f, "Link method: {}", self.link_method)?;
        for c in &self.categories {
            writeln!(
                f,
                "{}: {} compiled, {} linked, {} real, {} broken, {} custom",
                c.name, c.compiled, c.linked, c.real, c.broken, c.custom
            )?;
        }
        write!(
            f,
            "Total: {} linked, {} real, {} broken, {} custom",
            self.linked, self.real, self.broken, self.custom
        )
    }
}
