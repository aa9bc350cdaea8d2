//! Repair: recompile and re-point every broken managed link.
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::{CompileOptions, CompileReport, Engine, slash_path, top_level};
use crate::config::absolute_project_root;
use crate::error::{FileError, SyncError};
use crate::resources::Applicable;
use crate::resources::helpers::fs as fs_helpers;
use crate::resources::managed_file::ManagedFileResource;

/// Options for [`Engine::repair`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RepairOptions {
    /// Report what would be fixed without recompiling or touching links.
    /// Outputs are predicted from the template source.
    pub dry_run: bool,
}

/// Outcome of a repair.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairReport {
    /// Broken links recreated against the fresh cache.
    pub fixed: Vec<PathBuf>,
    /// Broken links deleted because their output no longer exists.
    pub removed: Vec<PathBuf>,
    /// Per-file failures.
    pub errors: Vec<FileError>,
    /// The forced recompile (absent in dry-run mode).
    pub compile: Option<CompileReport>,
}

impl RepairReport {
    /// Whether every broken link was handled.
    #[must_use]
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A broken link found before recompiling.
struct BrokenLink {
    category: String,
    rel: String,
    path: PathBuf,
}

impl Engine {
    /// Repair the project: find broken managed links, force a recompile,
    /// then recreate each link whose output still exists and delete the rest.
    ///
    /// Broken links are collected before recompiling so that links broken
    /// by a stale cache are still found once the cache is regenerated.
    ///
    /// # Errors
    ///
    /// Returns an error if a managed directory cannot be scanned or the
    /// recompile fails as a whole.
    pub fn repair(
        &self,
        project_root: &Path,
        options: RepairOptions,
    ) -> Result<RepairReport, SyncError> {
        let root = absolute_project_root(project_root);
        let broken = self.find_broken_links(&root)?;
        tracing::debug!(target: "tmplsync::engine", count = broken.len(), "broken links found");

        let mut report = RepairReport::default();
        if !options.dry_run {
            report.compile = Some(self.compile(&root, CompileOptions { force: true })?);
        }

        let planned = options.dry_run.then(|| self.planned_outputs());
        let layout = self.layout(&root);
        let method = self.link_method();
        for link in broken {
            let compiled = layout.category_dir(&link.category).join(&link.rel);
            let exists = planned.as_ref().map_or_else(
                || compiled.is_file(),
                |planned| planned.contains(&format!("{}/{}", link.category, link.rel)),
            );
            if options.dry_run {
                let action = if exists { "relink" } else { "remove" };
                tracing::info!(
                    target: "tmplsync::dry_run",
                    "would {action}: {}",
                    link.path.display()
                );
                if exists {
                    report.fixed.push(link.path);
                } else {
                    report.removed.push(link.path);
                }
                continue;
            }

            let result = fs_helpers::remove_symlink(&link.path).and_then(|()| {
                if exists {
                    ManagedFileResource::new(compiled, link.path.clone(), method).apply()?;
                }
                Ok(())
            });
            match result {
                Ok(()) if exists => {
                    tracing::debug!(target: "tmplsync::engine", "relinked {}", link.path.display());
                    report.fixed.push(link.path);
                }
                Ok(()) => {
                    tracing::debug!(target: "tmplsync::engine", "removed {}", link.path.display());
                    report.removed.push(link.path);
                }
                Err(e) => {
                    tracing::warn!(
                        target: "tmplsync::engine",
                        "failed to repair {}: {e:#}",
                        link.path.display()
                    );
                    report.errors.push(FileError::new(&link.path, &e));
                }
            }
        }
        Ok(report)
    }

    /// Broken symlinks in the managed directories, excluding dynamic entries
    /// and custom entries that do not point into the compiled cache.
    fn find_broken_links(&self, root: &Path) -> Result<Vec<BrokenLink>, SyncError> {
        let layout = self.layout(root);
        let mut broken = Vec::new();
        for category in &self.index.categories {
            let dir = category.project_path(root);
            let custom = self.custom_names(category, root)?;
            let files = fs_helpers::list_files(&dir).map_err(|e| SyncError::io(&dir, e))?;
            for file in files {
                let path = dir.join(&file);
                if !fs_helpers::is_broken_symlink(&path) {
                    continue;
                }
                let rel = slash_path(&file);
                let top = top_level(&rel);
                // A link into this project's cache is managed even once its
                // template is gone.
                let into_cache = std::fs::read_link(&path).is_ok_and(|t| layout.contains(&t));
                if self.index.is_dynamic(top) || (custom.contains(top) && !into_cache) {
                    continue;
                }
                broken.push(BrokenLink {
                    category: category.name.clone(),
                    rel,
                    path,
                });
            }
        }
        Ok(broken)
    }
}
