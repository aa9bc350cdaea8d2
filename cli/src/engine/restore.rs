//! Restore missing files from the compiled cache, and removal: freezing
//! managed links into plain files before the engine lets go of a project.
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::{Engine, SkippedFile, slash_path, top_level};
use super::linker::{REASON_DYNAMIC, REASON_USER_CREATED};
use crate::config::absolute_project_root;
use crate::error::{FileError, SyncError};
use crate::resources::helpers::fs as fs_helpers;
use crate::resources::managed_file::{LinkMethod, ManagedFileResource};
use crate::resources::{Applicable, ResourceChange};

/// Skip reason for restore targets that already exist.
pub const REASON_PRESENT: &str = "already present";

/// Outcome of a restore.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RestoreReport {
    /// Files written (or that would be, in dry-run mode).
    pub restored: Vec<PathBuf>,
    /// Entries left alone.
    pub skipped: Vec<SkippedFile>,
    /// Per-file failures.
    pub errors: Vec<FileError>,
}

/// Options for [`Engine::remove`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    /// Report only.
    pub dry_run: bool,
    /// Also delete the project's compiled cache.
    pub purge_cache: bool,
}

/// Outcome of a removal.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RemoveReport {
    /// Links replaced by real copies of their content.
    pub frozen: Vec<PathBuf>,
    /// Broken links deleted.
    pub deleted: Vec<PathBuf>,
    /// Per-file failures.
    pub errors: Vec<FileError>,
    /// Whether the compiled cache was deleted.
    pub purged: bool,
}

impl Engine {
    /// Write a real copy of every compiled output whose project path is
    /// empty. Anything already present, in whatever form, is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotCompiled`] when the project has no compiled
    /// cache.
    pub fn restore(&self, project_root: &Path, dry_run: bool) -> Result<RestoreReport, SyncError> {
        let root = absolute_project_root(project_root);
        let layout = self.layout(&root);
        let metadata = layout
            .load_metadata()
            .ok_or_else(|| SyncError::NotCompiled { path: root.clone() })?;
        let _lock = layout.lock()?;

        let mut report = RestoreReport::default();
        for category in &self.index.categories {
            let Some(outputs) = metadata.categories.get(&category.name) else {
                continue;
            };
            let project_dir = category.project_path(&root);
            let custom = self.custom_names(category, &root)?;
            let compiled_dir = layout.category_dir(&category.name);

            for rel in outputs {
                let target = project_dir.join(rel);
                let top = top_level(rel);
                if self.index.is_dynamic(top) {
                    report.skipped.push(SkippedFile::new(target, REASON_DYNAMIC));
                    continue;
                }
                if custom.contains(top) {
                    report.skipped.push(SkippedFile::new(target, REASON_USER_CREATED));
                    continue;
                }
                if target.symlink_metadata().is_ok() {
                    report.skipped.push(SkippedFile::new(target, REASON_PRESENT));
                    continue;
                }
                if dry_run {
                    tracing::info!(
                        target: "tmplsync::dry_run",
                        "would restore: {}",
                        target.display()
                    );
                    report.restored.push(target);
                    continue;
                }
                let resource = ManagedFileResource::new(
                    compiled_dir.join(rel),
                    target.clone(),
                    LinkMethod::Copy,
                );
                match resource.apply() {
                    Ok(_) => report.restored.push(target),
                    Err(e) => {
                        tracing::warn!(
                            target: "tmplsync::engine",
                            "failed to restore {}: {e:#}",
                            target.display()
                        );
                        report.errors.push(FileError::new(&target, &e));
                    }
                }
            }
        }
        Ok(report)
    }

    /// Detach the project from the engine: every symlink into this
    /// project's compiled cache becomes a plain file with the same content;
    /// broken ones are deleted. Optionally deletes the compiled cache.
    ///
    /// # Errors
    ///
    /// Returns an error if a managed directory cannot be scanned, or the
    /// cache cannot be purged.
    pub fn remove(
        &self,
        project_root: &Path,
        options: RemoveOptions,
    ) -> Result<RemoveReport, SyncError> {
        let root = absolute_project_root(project_root);
        let layout = self.layout(&root);
        let mut report = RemoveReport::default();

        for category in &self.index.categories {
            let dir = category.project_path(&root);
            let files = fs_helpers::list_files(&dir).map_err(|e| SyncError::io(&dir, e))?;
            for file in files {
                let path = dir.join(&file);
                let Ok(target) = fs::read_link(&path) else {
                    continue;
                };
                let target = match path.parent() {
                    Some(parent) if target.is_relative() => parent.join(target),
                    _ => target,
                };
                if !layout.contains(&target) {
                    tracing::debug!(
                        target: "tmplsync::engine",
                        "not managed: {} ({})",
                        slash_path(&file),
                        target.display()
                    );
                    continue;
                }
                self.remove_one(&path, target, options.dry_run, &mut report);
            }
        }

        if options.purge_cache {
            let dir = layout.dir();
            if options.dry_run {
                tracing::info!(
                    target: "tmplsync::dry_run",
                    "would delete cache: {}",
                    dir.display()
                );
            } else {
                let _lock = layout.lock()?;
                if dir.exists() {
                    fs::remove_dir_all(&dir).map_err(|e| SyncError::io(&dir, e))?;
                }
                report.purged = true;
            }
        }
        Ok(report)
    }

    fn remove_one(&self, path: &Path, target: PathBuf, dry_run: bool, report: &mut RemoveReport) {
        let broken = fs_helpers::is_broken_symlink(path);
        if dry_run {
            let action = if broken { "delete" } else { "freeze" };
            tracing::info!(target: "tmplsync::dry_run", "would {action}: {}", path.display());
            if broken {
                report.deleted.push(path.to_path_buf());
            } else {
                report.frozen.push(path.to_path_buf());
            }
            return;
        }

        if broken {
            match fs_helpers::remove_symlink(path) {
                Ok(()) => report.deleted.push(path.to_path_buf()),
                Err(e) => report.errors.push(FileError::new(path, &e)),
            }
            return;
        }

        let resource = ManagedFileResource::new(target, path.to_path_buf(), LinkMethod::Symlink);
        match resource.remove() {
            Ok(ResourceChange::Applied) => {
                tracing::debug!(target: "tmplsync::engine", "froze {}", path.display());
                report.frozen.push(path.to_path_buf());
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    target: "tmplsync::engine",
                    "failed to freeze {}: {e:#}",
                    path.display()
                );
                report.errors.push(FileError::new(path, &e));
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::LinkMode;
    use crate::engine::test_helpers::Fixture;
    use crate::engine::{CompileOptions, LinkOptions};

    fn fixture() -> Fixture {
        let fx = Fixture::new();
        fx.template("commands/deploy.md.tmpl", "deploy\n")
            .template("agents/tester.md.tmpl", "tester\n")
            .template("skills/review/SKILL.md", "review\n");
        fx
    }

    #[test]
    fn restore_requires_compiled_cache() {
        let fx = fixture();
        let engine = fx.engine(LinkMode::Copy);
        assert!(matches!(
            engine.restore(&fx.project, false).unwrap_err(),
            SyncError::NotCompiled { .. }
        ));
    }

    #[test]
    fn restore_writes_only_missing_files() {
        let fx = fixture();
        let engine = fx.engine(LinkMode::Symlink);
        engine.compile(&fx.project, CompileOptions::default()).unwrap();
        let edited = fx.project_file(".claude/commands/deploy.md", "mine\n");

        let report = engine.restore(&fx.project, false).unwrap();
        assert_eq!(report.restored.len(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].reason, REASON_PRESENT);
        assert_eq!(fs::read_to_string(edited).unwrap(), "mine\n");

        let restored = fx.project.join(".claude/skills/review/SKILL.md");
        let meta = restored.symlink_metadata().unwrap();
        assert!(meta.is_file(), "restore writes real files even in symlink mode");
        assert_eq!(fs::read_to_string(restored).unwrap(), "review\n");
    }

    #[test]
    fn restore_dry_run_writes_nothing() {
        let fx = fixture();
        let engine = fx.engine(LinkMode::Copy);
        engine.compile(&fx.project, CompileOptions::default()).unwrap();
        let report = engine.restore(&fx.project, true).unwrap();
        assert_eq!(report.restored.len(), 3);
        assert!(!fx.project.join(".claude").exists());
    }

    #[cfg(unix)]
    #[test]
    fn remove_freezes_links_and_purges_cache() {
        let fx = fixture();
        let engine = fx.engine(LinkMode::Symlink);
        engine.compile(&fx.project, CompileOptions::default()).unwrap();
        engine.link(&fx.project, LinkOptions::default()).unwrap();
        let mine = fx.project_file(".claude/commands/mine.md", "mine\n");

        let report = engine
            .remove(
                &fx.project,
                RemoveOptions {
                    dry_run: false,
                    purge_cache: true,
                },
            )
            .unwrap();
        assert_eq!(report.frozen.len(), 3);
        assert!(report.purged);
        assert!(!engine.layout(&fx.project).dir().exists());

        let deploy = fx.project.join(".claude/commands/deploy.md");
        assert!(!deploy.symlink_metadata().unwrap().is_symlink());
        assert_eq!(fs::read_to_string(deploy).unwrap(), "deploy\n");
        assert_eq!(fs::read_to_string(mine).unwrap(), "mine\n");
    }

    #[cfg(unix)]
    #[test]
    fn remove_deletes_broken_links_and_ignores_foreign_ones() {
        let fx = fixture();
        let engine = fx.engine(LinkMode::Symlink);
        engine.compile(&fx.project, CompileOptions::default()).unwrap();
        engine.link(&fx.project, LinkOptions::default()).unwrap();
        fs::remove_file(engine.layout(&fx.project).dir().join("agents/tester.md")).unwrap();
        let foreign_target = fx.project_file("notes.md", "notes\n");
        let foreign = fx.project.join(".claude/commands/notes.md");
        std::os::unix::fs::symlink(&foreign_target, &foreign).unwrap();

        let report = engine.remove(&fx.project, RemoveOptions::default()).unwrap();
        assert_eq!(report.deleted, vec![fx.project.join(".claude/agents/tester.md")]);
        assert_eq!(report.frozen.len(), 2);
        assert!(!report.purged);
        assert!(foreign.symlink_metadata().unwrap().is_symlink());
    }

    #[cfg(unix)]
    #[test]
    fn remove_dry_run_changes_nothing() {
        let fx = fixture();
        let engine = fx.engine(LinkMode::Symlink);
        engine.compile(&fx.project, CompileOptions::default()).unwrap();
        engine.link(&fx.project, LinkOptions::default()).unwrap();
        let report = engine
            .remove(
                &fx.project,
                RemoveOptions {
                    dry_run: true,
                    purge_cache: true,
                },
            )
            .unwrap();
        assert_eq!(report.frozen.len(), 3);
        assert!(!report.purged);
        assert!(
            fx.project
                .join(".claude/commands/deploy.md")
                .symlink_metadata()
                .unwrap()
                .is_symlink()
        );
        assert!(engine.layout(&fx.project).dir().exists());
    }
}
