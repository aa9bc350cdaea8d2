//! Linker: reconciles the project tree against the compiled cache.
//!
//! Every compiled output is classified against what currently sits at its
//! project path, and only entries that are absent, stale links, or
//! unmodified copies are (re)placed. User edits are never overwritten.
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::ops::AddAssign;
use std::path::Path;

use super::cache::Metadata;
use super::{Engine, SkippedFile, top_level};
use crate::config::{LinkMode, absolute_project_root};
use crate::config::index::Category;
use crate::error::{FileError, SyncError};
use crate::resources::managed_file::{LinkMethod, ManagedFileResource};
use crate::resources::{Applicable, Resource, ResourceChange, ResourceState};

/// Skip reason for dynamically generated names.
pub const REASON_DYNAMIC: &str = "dynamically generated";
/// Skip reason for user-created entries.
pub const REASON_USER_CREATED: &str = "user-created file";
/// Skip reason for entries already in the desired state.
pub const REASON_ALREADY_CORRECT: &str = "already correct";

/// Options for [`Engine::link`].
#[derive(Debug, Clone, Copy)]
pub struct LinkOptions {
    /// Classify only; never touch the project tree.
    pub dry_run: bool,
    /// Process categories concurrently.
    pub parallel: bool,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            parallel: true,
        }
    }
}

/// Outcome of a link run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkReport {
    /// Entries created or replaced (or that would be, in dry-run mode).
    pub created: usize,
    /// Entries left alone.
    pub skipped: Vec<SkippedFile>,
    /// Per-file failures.
    pub errors: Vec<FileError>,
    /// Auto mode fell back to copies because symlinks are unavailable.
    pub fallback_to_copy: bool,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

impl LinkReport {
    /// A run succeeds when it had no errors, or fewer errors than handled
    /// entries.
    #[must_use]
    pub fn success(&self) -> bool {
        self.errors.is_empty() || self.errors.len() < self.created + self.skipped.len()
    }

    /// One-line summary for logs.
    #[must_use]
    pub fn summary(&self) -> String {
        let verb = if self.dry_run { "would create" } else { "created" };
        let mut out = format!("{} {verb}, {} skipped", self.created, self.skipped.len());
        if !self.errors.is_empty() {
            out.push_str(&format!(", {} failed", self.errors.len()));
        }
        out
    }
}

impl AddAssign for LinkReport {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.skipped.extend(other.skipped);
        self.errors.extend(other.errors);
    }
}

/// Everything a category pass needs besides the category itself.
struct LinkPass<'a> {
    root: &'a Path,
    metadata: &'a Metadata,
    layout_dir: &'a Path,
    method: LinkMethod,
    dry_run: bool,
}

impl Engine {
    /// Reconcile the project tree with the compiled cache.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotCompiled`] when the project has no compiled
    /// cache, or a lock error. Per-file failures are collected in the report.
    pub fn link(&self, project_root: &Path, options: LinkOptions) -> Result<LinkReport, SyncError> {
        let root = absolute_project_root(project_root);
        let layout = self.layout(&root);
        let metadata = layout
            .load_metadata()
            .ok_or_else(|| SyncError::NotCompiled { path: root.clone() })?;
        let _lock = layout.lock()?;

        let method = self.link_method();
        let fallback_to_copy =
            self.settings.link_mode == LinkMode::Auto && method == LinkMethod::Copy;
        if fallback_to_copy {
            tracing::warn!(
                target: "tmplsync::engine",
                "symlinks unavailable, copying compiled files instead"
            );
        }

        let layout_dir = layout.dir();
        let pass = LinkPass {
            root: &root,
            metadata: &metadata,
            layout_dir: &layout_dir,
            method,
            dry_run: options.dry_run,
        };

        let per_category: Vec<LinkReport> = if options.parallel {
            self.index
                .categories
                .par_iter()
                .map(|category| self.link_category(category, &pass))
                .collect()
        } else {
            self.index
                .categories
                .iter()
                .map(|category| self.link_category(category, &pass))
                .collect()
        };

        let mut report = LinkReport {
            fallback_to_copy,
            dry_run: options.dry_run,
            ..LinkReport::default()
        };
        for part in per_category {
            report += part;
        }
        Ok(report)
    }

    fn link_category(&self, category: &Category, pass: &LinkPass<'_>) -> LinkReport {
        let mut report = LinkReport::default();
        let Some(outputs) = pass.metadata.categories.get(&category.name) else {
            return report;
        };
        let project_dir = category.project_path(pass.root);
        let custom = match self.custom_names(category, pass.root) {
            Ok(custom) => custom,
            Err(e) => {
                report.errors.push(FileError {
                    path: project_dir,
                    message: e.to_string(),
                });
                return report;
            }
        };
        let compiled_dir = pass.layout_dir.join(&category.name);

        for rel in outputs {
            let target = project_dir.join(rel);
            let resource = ManagedFileResource::new(compiled_dir.join(rel), target, pass.method)
                .with_unstable(pass.metadata.is_unstable(&category.name, rel))
                .with_emitted(pass.metadata.emitted_hashes(&category.name, rel));
            self.link_one(&resource, rel, &custom, pass.dry_run, &mut report);
        }
        report
    }

    fn link_one(
        &self,
        resource: &ManagedFileResource,
        rel: &str,
        custom: &BTreeSet<String>,
        dry_run: bool,
        report: &mut LinkReport,
    ) {
        let target = &resource.target;
        let top = top_level(rel);
        if self.index.is_dynamic(top) {
            report.skipped.push(SkippedFile::new(target, REASON_DYNAMIC));
            return;
        }
        if custom.contains(top) {
            report.skipped.push(SkippedFile::new(target, REASON_USER_CREATED));
            return;
        }

        match resource.current_state() {
            Ok(ResourceState::Correct) => {
                tracing::debug!(
                    target: "tmplsync::engine",
                    "ok: {} ({REASON_ALREADY_CORRECT})",
                    target.display()
                );
                report
                    .skipped
                    .push(SkippedFile::new(target, REASON_ALREADY_CORRECT));
            }
            Ok(ResourceState::Customized { reason }) => {
                tracing::info!(
                    target: "tmplsync::engine",
                    "skip: {} ({reason})",
                    target.display()
                );
                report.skipped.push(SkippedFile::new(target, reason));
            }
            Ok(ResourceState::Invalid { reason }) => {
                report.errors.push(FileError {
                    path: target.clone(),
                    message: reason,
                });
            }
            Ok(ResourceState::Missing | ResourceState::Incorrect { .. }) if dry_run => {
                tracing::info!(
                    target: "tmplsync::dry_run",
                    "would {}: {}",
                    resource.method,
                    resource.description()
                );
                report.created += 1;
            }
            Ok(ResourceState::Missing | ResourceState::Incorrect { .. }) => {
                match resource.apply() {
                    Ok(ResourceChange::Applied) => {
                        tracing::debug!(
                            target: "tmplsync::engine",
                            "{}: {}",
                            resource.method,
                            resource.description()
                        );
                        report.created += 1;
                    }
                    Ok(ResourceChange::AlreadyCorrect) => report
                        .skipped
                        .push(SkippedFile::new(target, REASON_ALREADY_CORRECT)),
                    Ok(ResourceChange::Skipped { reason }) => {
                        report.skipped.push(SkippedFile::new(target, reason));
                    }
                    Err(e) => {
                        tracing::warn!(
                            target: "tmplsync::engine",
                            "failed to place {}: {e:#}",
                            target.display()
                        );
                        report.errors.push(FileError::new(target, &e));
                    }
                }
            }
            Err(e) => report.errors.push(FileError::new(target, &e)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::engine::CompileOptions;
    use crate::engine::test_helpers::Fixture;
    use crate::resources::managed_file::{REASON_CUSTOMIZED, REASON_UNSTABLE};
    use std::fs;
    use std::path::PathBuf;

    fn fixture() -> Fixture {
        let fx = Fixture::new();
        fx.config("[project]\nname = \"app\"\n")
            .template("commands/deploy.md.tmpl", "# Deploy {{project.name}}\n")
            .template("agents/tester.md.tmpl", "tester\n")
            .template("skills/review/SKILL.md", "Review {{project.name}}\n");
        fx
    }

    fn compiled(fx: &Fixture, mode: LinkMode) -> Engine {
        let engine = fx.engine(mode);
        engine.compile(&fx.project, CompileOptions::default()).unwrap();
        engine
    }

    fn reason_for(report: &LinkReport, path: &Path) -> Option<String> {
        report
            .skipped
            .iter()
            .find(|s| s.path == path)
            .map(|s| s.reason.clone())
    }

    #[test]
    fn not_compiled_is_hard_error() {
        let fx = fixture();
        let engine = fx.engine(LinkMode::Copy);
        let err = engine.link(&fx.project, LinkOptions::default()).unwrap_err();
        assert!(matches!(err, SyncError::NotCompiled { .. }));
        assert!(!fx.project.join(".claude").exists());
    }

    #[test]
    fn copy_mode_creates_then_is_idempotent() {
        let fx = fixture();
        let engine = compiled(&fx, LinkMode::Copy);
        let first = engine.link(&fx.project, LinkOptions::default()).unwrap();
        assert_eq!(first.created, 3);
        assert!(first.errors.is_empty());
        assert_eq!(
            fs::read_to_string(fx.project.join(".claude/commands/deploy.md")).unwrap(),
            "# Deploy app\n"
        );

        let second = engine.link(&fx.project, LinkOptions::default()).unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.skipped.len(), 3);
        assert!(
            second
                .skipped
                .iter()
                .all(|s| s.reason == REASON_ALREADY_CORRECT)
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlink_mode_creates_links_into_cache() {
        let fx = fixture();
        let engine = compiled(&fx, LinkMode::Symlink);
        let report = engine.link(&fx.project, LinkOptions::default()).unwrap();
        assert_eq!(report.created, 3);
        let link = fx.project.join(".claude/skills/review/SKILL.md");
        let target = fs::read_link(&link).unwrap();
        assert!(engine.layout(&fx.project).contains(&target));

        let again = engine.link(&fx.project, LinkOptions::default()).unwrap();
        assert_eq!(again.created, 0);
    }

    #[test]
    fn edited_copy_is_never_overwritten() {
        let fx = fixture();
        let engine = compiled(&fx, LinkMode::Copy);
        let path = fx.project_file(".claude/commands/deploy.md", "hand edited\n");
        let report = engine.link(&fx.project, LinkOptions::default()).unwrap();
        assert_eq!(reason_for(&report, &path).as_deref(), Some(REASON_CUSTOMIZED));
        assert_eq!(fs::read_to_string(&path).unwrap(), "hand edited\n");
    }

    #[test]
    fn custom_and_dynamic_entries_are_untouched() {
        let fx = fixture();
        let engine = compiled(&fx, LinkMode::Copy);
        let mine = fx.project_file(".claude/commands/mine.md", "mine\n");
        let readme = fx.project_file(".claude/commands/README.md", "index\n");
        let report = engine.link(&fx.project, LinkOptions::default()).unwrap();
        assert!(report.errors.is_empty());
        assert_eq!(fs::read_to_string(mine).unwrap(), "mine\n");
        assert_eq!(fs::read_to_string(readme).unwrap(), "index\n");
    }

    #[test]
    fn real_directory_at_file_path_is_per_file_error() {
        let fx = fixture();
        let engine = compiled(&fx, LinkMode::Copy);
        fs::create_dir_all(fx.project.join(".claude/agents/tester.md")).unwrap();
        let report = engine.link(&fx.project, LinkOptions::default()).unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.created, 2);
        assert!(report.success());
    }

    #[test]
    fn dry_run_changes_nothing() {
        let fx = fixture();
        let engine = compiled(&fx, LinkMode::Copy);
        let report = engine
            .link(
                &fx.project,
                LinkOptions {
                    dry_run: true,
                    parallel: false,
                },
            )
            .unwrap();
        assert!(report.dry_run);
        assert_eq!(report.created, 3);
        assert!(!fx.project.join(".claude").exists());
    }

    #[test]
    fn sequential_and_parallel_agree() {
        let fx = fixture();
        let engine = compiled(&fx, LinkMode::Copy);
        let seq = engine
            .link(
                &fx.project,
                LinkOptions {
                    dry_run: true,
                    parallel: false,
                },
            )
            .unwrap();
        let par = engine
            .link(
                &fx.project,
                LinkOptions {
                    dry_run: true,
                    parallel: true,
                },
            )
            .unwrap();
        assert_eq!(seq.created, par.created);
        assert_eq!(seq.skipped.len(), par.skipped.len());
    }

    #[test]
    fn unstable_output_reports_distinct_reason() {
        let fx = fixture();
        let engine = compiled(&fx, LinkMode::Copy);
        let layout = engine.layout(&fx.project);
        let mut meta = layout.load_metadata().unwrap();
        meta.unstable.insert("agents/tester.md".to_string());
        layout.save_metadata(&meta).unwrap();
        let path = fx.project_file(".claude/agents/tester.md", "rendered differently\n");
        let report = engine.link(&fx.project, LinkOptions::default()).unwrap();
        assert_eq!(reason_for(&report, &path).as_deref(), Some(REASON_UNSTABLE));
    }

    #[test]
    fn success_rule() {
        let err = FileError {
            path: PathBuf::from("/p/a"),
            message: "boom".to_string(),
        };
        let mut report = LinkReport::default();
        assert!(report.success());
        report.errors.push(err.clone());
        assert!(!report.success());
        report.created = 2;
        assert!(report.success());
        report.errors.push(err.clone());
        report.errors.push(err);
        assert!(!report.success());
    }

    #[test]
    fn summary_text() {
        let report = LinkReport {
            created: 2,
            skipped: vec![SkippedFile::new("/p/x", REASON_ALREADY_CORRECT)],
            dry_run: true,
            ..LinkReport::default()
        };
        assert_eq!(report.summary(), "2 would create, 1 skipped");
    }
}
