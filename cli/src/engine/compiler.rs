//! Compiler: renders every category's templates into the compiled cache.
use anyhow::{Context as _, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use super::cache::{CacheLayout, Metadata};
use super::fingerprint::{fingerprint, source_digest};
use super::{Engine, slash_path, tool_version};
use crate::config::absolute_project_root;
use crate::config::index::{Category, TemplateEntry};
use crate::config::project::ProjectConfig;
use crate::error::{FileError, SyncError};
use crate::resources::helpers::fs as fs_helpers;

/// Number of earlier content hashes remembered per output.
const EMITTED_HISTORY: usize = 8;

/// Options for [`Engine::compile`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    /// Recompile even when the cache is fresh.
    pub force: bool,
}

/// Outcome of a compile.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompileReport {
    /// `<cacheRoot>/<slug>`.
    pub compiled_dir: PathBuf,
    /// Number of compiled outputs.
    pub file_count: usize,
    /// Outputs per category.
    pub categories: BTreeMap<String, usize>,
    /// `true` when the cache was fresh and nothing was written.
    pub skipped: bool,
    /// Templates that could not be compiled.
    pub failures: Vec<FileError>,
    /// Unresolved placeholders per output (`<category>/<path>`).
    pub missing: BTreeMap<String, Vec<String>>,
    /// Outputs whose template rendered differently between passes.
    pub unstable: Vec<String>,
}

impl CompileReport {
    fn from_metadata(layout: &CacheLayout, metadata: &Metadata) -> Self {
        Self {
            compiled_dir: layout.dir(),
            file_count: metadata.file_count(),
            categories: metadata
                .categories
                .iter()
                .map(|(name, files)| (name.clone(), files.len()))
                .collect(),
            skipped: true,
            unstable: metadata.unstable.iter().cloned().collect(),
            ..Self::default()
        }
    }
}

/// Per-category compile results.
#[derive(Debug, Default)]
struct CategoryOutput {
    outputs: Vec<String>,
    failures: Vec<FileError>,
    missing: BTreeMap<String, Vec<String>>,
    unstable: BTreeSet<String>,
}

/// Result of rendering a single file.
struct FileOutcome {
    missing: Vec<String>,
    unstable: bool,
}

impl Engine {
    /// Whether the compiled cache of `project_root` matches the current tool
    /// version, configuration fingerprint and template source.
    #[must_use]
    pub fn is_fresh(&self, project_root: &Path) -> bool {
        let root = absolute_project_root(project_root);
        let Ok(config) = ProjectConfig::load(&root) else {
            return false;
        };
        let current = fingerprint(&config.values, &self.settings.source_root);
        let digest = source_digest(&self.index, &self.settings.source_root);
        self.layout(&root)
            .load_metadata()
            .is_some_and(|meta| meta.matches(tool_version(), &current, &digest))
    }

    /// Outputs a compile would produce, as `<category>/<relative path>`,
    /// read from the template source without rendering.
    pub(crate) fn planned_outputs(&self) -> BTreeSet<String> {
        let root = &self.settings.source_root;
        let mut planned = BTreeSet::new();
        for category in &self.index.categories {
            let Ok(entries) = category.template_entries(root) else {
                continue;
            };
            for entry in entries {
                if self.index.is_dynamic(&entry.project_name) {
                    continue;
                }
                if entry.is_bundle {
                    let members = fs_helpers::list_files(&entry.source).unwrap_or_default();
                    planned.extend(members.iter().map(|member| {
                        format!(
                            "{}/{}/{}",
                            category.name,
                            entry.project_name,
                            slash_path(member)
                        )
                    }));
                } else {
                    planned.insert(format!("{}/{}", category.name, entry.project_name));
                }
            }
        }
        planned
    }

    /// Compile the project's templates into its compiled cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the project configuration is invalid, the cache
    /// lock cannot be taken, or the cache directory or metadata cannot be
    /// written. Per-template failures are reported, not returned.
    pub fn compile(
        &self,
        project_root: &Path,
        options: CompileOptions,
    ) -> Result<CompileReport, SyncError> {
        let root = absolute_project_root(project_root);
        let layout = self.layout(&root);
        let config = ProjectConfig::load(&root)?;
        let current = fingerprint(&config.values, &self.settings.source_root);
        let digest = source_digest(&self.index, &self.settings.source_root);
        let previous = layout.load_metadata();

        if !options.force
            && let Some(meta) = &previous
            && meta.matches(tool_version(), &current, &digest)
        {
            tracing::debug!(
                target: "tmplsync::engine",
                slug = layout.slug(),
                "compiled cache is fresh"
            );
            return Ok(CompileReport::from_metadata(&layout, meta));
        }

        let _lock = layout.lock()?;
        let dir = layout.dir();
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| SyncError::io(&dir, e))?;
        }
        fs::create_dir_all(&dir).map_err(|e| SyncError::io(&dir, e))?;

        let mut report = CompileReport {
            compiled_dir: dir,
            ..CompileReport::default()
        };
        let mut categories = BTreeMap::new();
        let mut unstable = BTreeSet::new();

        for category in &self.index.categories {
            let output = self.compile_category(category, &layout, &config.values);
            tracing::debug!(
                target: "tmplsync::engine",
                category = %category.name,
                files = output.outputs.len(),
                "compiled category"
            );
            report
                .categories
                .insert(category.name.clone(), output.outputs.len());
            report.file_count += output.outputs.len();
            report.failures.extend(output.failures);
            report.missing.extend(output.missing);
            unstable.extend(output.unstable);
            categories.insert(category.name.clone(), output.outputs);
        }

        report.unstable = unstable.iter().cloned().collect();
        let emitted = emitted_hashes(
            &layout,
            &categories,
            previous.as_ref().map(|meta| &meta.emitted),
        );
        let metadata = Metadata {
            project_path: root,
            source_root: self.settings.source_root.clone(),
            tool_version: tool_version().to_string(),
            compiled_at: Utc::now(),
            fingerprint: current,
            source_digest: digest,
            categories,
            unstable,
            emitted,
        };
        layout.save_metadata(&metadata)?;
        Ok(report)
    }

    fn compile_category(
        &self,
        category: &Category,
        layout: &CacheLayout,
        context: &Value,
    ) -> CategoryOutput {
        let mut output = CategoryOutput::default();
        let entries = match category.template_entries(&self.settings.source_root) {
            Ok(entries) => entries,
            Err(e) => {
                let dir = category.source_path(&self.settings.source_root);
                tracing::warn!(
                    target: "tmplsync::engine",
                    "cannot read template directory {}: {e}",
                    dir.display()
                );
                output.failures.push(FileError {
                    path: dir,
                    message: e.to_string(),
                });
                return output;
            }
        };

        let out_dir = layout.category_dir(&category.name);
        for entry in entries {
            if self.index.is_dynamic(&entry.project_name) {
                tracing::debug!(
                    target: "tmplsync::engine",
                    "skipping dynamic name {}/{}",
                    category.name,
                    entry.project_name
                );
                continue;
            }
            if entry.is_bundle {
                self.compile_bundle(category, &entry, &out_dir, context, &mut output);
            } else {
                let dest = out_dir.join(&entry.project_name);
                record(
                    category,
                    entry.project_name.clone(),
                    &entry.source,
                    self.compile_text_file(&entry.source, &dest, context),
                    &mut output,
                );
            }
        }
        output
    }

    fn compile_bundle(
        &self,
        category: &Category,
        entry: &TemplateEntry,
        out_dir: &Path,
        context: &Value,
        output: &mut CategoryOutput,
    ) {
        let members = match fs_helpers::list_files(&entry.source) {
            Ok(members) => members,
            Err(e) => {
                tracing::warn!(
                    target: "tmplsync::engine",
                    "cannot read bundle {}: {e}",
                    entry.source.display()
                );
                output.failures.push(FileError {
                    path: entry.source.clone(),
                    message: e.to_string(),
                });
                return;
            }
        };
        let bundle_dir = out_dir.join(&entry.project_name);
        for member in members {
            let source = entry.source.join(&member);
            let dest = bundle_dir.join(&member);
            let rel = format!("{}/{}", entry.project_name, slash_path(&member));
            let result = self.compile_bundle_member(&source, &dest, context);
            record(category, rel, &source, result, output);
        }
    }

    fn compile_text_file(
        &self,
        source: &Path,
        dest: &Path,
        context: &Value,
    ) -> Result<FileOutcome> {
        let text = fs::read_to_string(source)
            .with_context(|| format!("read template {}", source.display()))?;
        self.render_to(&text, source, dest, context)
    }

    fn compile_bundle_member(
        &self,
        source: &Path,
        dest: &Path,
        context: &Value,
    ) -> Result<FileOutcome> {
        let bytes =
            fs::read(source).with_context(|| format!("read bundle file {}", source.display()))?;
        match String::from_utf8(bytes) {
            Ok(text) if !text.contains('\0') => self.render_to(&text, source, dest, context),
            Ok(text) => copy_to(text.as_bytes(), source, dest),
            Err(e) => copy_to(e.as_bytes(), source, dest),
        }
    }

    /// Render twice, write the first result, and flag divergence.
    fn render_to(
        &self,
        text: &str,
        source: &Path,
        dest: &Path,
        context: &Value,
    ) -> Result<FileOutcome> {
        let first = self
            .renderer
            .render(text, context)
            .with_context(|| format!("render {}", source.display()))?;
        let second = self
            .renderer
            .render(text, context)
            .with_context(|| format!("render {}", source.display()))?;
        write_output(dest, first.text.as_bytes(), source)?;
        Ok(FileOutcome {
            missing: first.missing,
            unstable: first.text != second.text,
        })
    }
}

/// Content hash of every output appended to the hashes the same output had
/// in earlier compiles, capped at [`EMITTED_HISTORY`] entries.
fn emitted_hashes(
    layout: &CacheLayout,
    categories: &BTreeMap<String, Vec<String>>,
    previous: Option<&BTreeMap<String, Vec<String>>>,
) -> BTreeMap<String, Vec<String>> {
    let mut emitted = BTreeMap::new();
    for (category, outputs) in categories {
        let dir = layout.category_dir(category);
        for rel in outputs {
            let key = format!("{category}/{rel}");
            let mut history = previous
                .and_then(|previous| previous.get(&key))
                .cloned()
                .unwrap_or_default();
            match fs_helpers::hash_file(&dir.join(rel)) {
                Ok(hash) => {
                    history.retain(|h| *h != hash);
                    history.push(hash);
                }
                Err(e) => {
                    tracing::debug!(target: "tmplsync::engine", "cannot hash {key}: {e}");
                }
            }
            let excess = history.len().saturating_sub(EMITTED_HISTORY);
            history.drain(..excess);
            emitted.insert(key, history);
        }
    }
    emitted
}

/// Record one file's outcome into the category output.
fn record(
    category: &Category,
    rel: String,
    source: &Path,
    result: Result<FileOutcome>,
    output: &mut CategoryOutput,
) {
    let key = format!("{}/{rel}", category.name);
    match result {
        Ok(outcome) => {
            if !outcome.missing.is_empty() {
                tracing::warn!(
                    target: "tmplsync::engine",
                    "{key}: unresolved placeholders: {}",
                    outcome.missing.join(", ")
                );
                output.missing.insert(key.clone(), outcome.missing);
            }
            if outcome.unstable {
                tracing::warn!(
                    target: "tmplsync::engine",
                    "{key}: template output differs between renders"
                );
                output.unstable.insert(key);
            }
            output.outputs.push(rel);
        }
        Err(e) => {
            tracing::warn!(
                target: "tmplsync::engine",
                "skipping template {}: {e:#}",
                source.display()
            );
            output.failures.push(FileError::new(source, &e));
        }
    }
}

/// Write bytes that are not rendered.
fn copy_to(bytes: &[u8], source: &Path, dest: &Path) -> Result<FileOutcome> {
    write_output(dest, bytes, source)?;
    Ok(FileOutcome {
        missing: Vec::new(),
        unstable: false,
    })
}

/// Write a compiled output, carrying over the template's permission bits.
fn write_output(dest: &Path, bytes: &[u8], source: &Path) -> Result<()> {
    fs_helpers::ensure_parent_dir(dest)?;
    fs::write(dest, bytes).with_context(|| format!("write {}", dest.display()))?;
    let permissions = fs::metadata(source)
        .with_context(|| format!("stat {}", source.display()))?
        .permissions();
    fs::set_permissions(dest, permissions)
        .with_context(|| format!("set permissions on {}", dest.display()))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::LinkMode;
    use crate::engine::render::{MockRenderer, RenderError, Rendered};
    use crate::engine::test_helpers::Fixture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fixture() -> Fixture {
        let fx = Fixture::new();
        fx.config("[project]\nname = \"app\"\n")
            .template("commands/deploy.md.tmpl", "# Deploy {{project.name}}\n")
            .template("hooks/pre.sh.tmpl", "#!/bin/sh\necho {{project.name}}\n")
            .template("skills/review/SKILL.md", "Review {{project.name}}\n")
            .template("skills/review/scripts/run.sh", "run\n");
        fx
    }

    #[test]
    fn compiles_all_categories() {
        let fx = fixture();
        let engine = fx.engine(LinkMode::Copy);
        let report = engine.compile(&fx.project, CompileOptions::default()).unwrap();

        assert!(!report.skipped);
        assert_eq!(report.file_count, 4);
        assert_eq!(report.categories["commands"], 1);
        assert_eq!(report.categories["skills"], 2);
        assert_eq!(report.categories["agents"], 0);
        assert!(report.failures.is_empty());

        let dir = &report.compiled_dir;
        assert_eq!(
            fs::read_to_string(dir.join("commands/deploy.md")).unwrap(),
            "# Deploy app\n"
        );
        assert_eq!(
            fs::read_to_string(dir.join("skills/review/SKILL.md")).unwrap(),
            "Review app\n"
        );
        let meta = engine.layout(&fx.project).load_metadata().unwrap();
        assert_eq!(meta.categories["skills"], vec!["review/SKILL.md", "review/scripts/run.sh"]);
        assert_eq!(meta.tool_version, tool_version());
    }

    #[test]
    fn fresh_cache_is_skipped_without_writes() {
        let fx = fixture();
        let engine = fx.engine(LinkMode::Copy);
        let first = engine.compile(&fx.project, CompileOptions::default()).unwrap();
        let meta_before = engine.layout(&fx.project).load_metadata().unwrap();

        let second = engine.compile(&fx.project, CompileOptions::default()).unwrap();
        assert!(second.skipped);
        assert_eq!(second.file_count, first.file_count);
        assert_eq!(engine.layout(&fx.project).load_metadata().unwrap(), meta_before);
        assert!(engine.is_fresh(&fx.project));
    }

    #[test]
    fn force_recompiles() {
        let fx = fixture();
        let engine = fx.engine(LinkMode::Copy);
        engine.compile(&fx.project, CompileOptions::default()).unwrap();
        let report = engine
            .compile(&fx.project, CompileOptions { force: true })
            .unwrap();
        assert!(!report.skipped);
    }

    #[test]
    fn template_edit_triggers_recompile() {
        let fx = fixture();
        let engine = fx.engine(LinkMode::Copy);
        engine.compile(&fx.project, CompileOptions::default()).unwrap();
        fx.template("skills/review/scripts/run.sh", "run --fast\n");
        assert!(!engine.is_fresh(&fx.project));
        let report = engine.compile(&fx.project, CompileOptions::default()).unwrap();
        assert!(!report.skipped);
        assert_eq!(
            fs::read_to_string(report.compiled_dir.join("skills/review/scripts/run.sh")).unwrap(),
            "run --fast\n"
        );
    }

    #[test]
    fn emitted_hashes_accumulate_across_compiles() {
        let fx = fixture();
        let engine = fx.engine(LinkMode::Copy);
        engine.compile(&fx.project, CompileOptions::default()).unwrap();
        fx.config("[project]\nname = \"renamed\"\n");
        engine.compile(&fx.project, CompileOptions::default()).unwrap();
        let meta = engine.layout(&fx.project).load_metadata().unwrap();
        assert_eq!(
            meta.emitted_hashes("commands", "deploy.md"),
            [
                fs_helpers::hash_bytes(b"# Deploy app\n"),
                fs_helpers::hash_bytes(b"# Deploy renamed\n"),
            ]
        );
        assert_eq!(meta.emitted_hashes("skills", "review/scripts/run.sh").len(), 1);
    }

    #[test]
    fn planned_outputs_follow_the_source() {
        let fx = fixture();
        fx.template("commands/README.md.tmpl", "dynamic\n");
        let engine = fx.engine(LinkMode::Copy);
        let planned: Vec<String> = engine.planned_outputs().into_iter().collect();
        assert_eq!(
            planned,
            [
                "commands/deploy.md",
                "hooks/pre.sh",
                "skills/review/SKILL.md",
                "skills/review/scripts/run.sh",
            ]
        );
    }

    #[test]
    fn config_change_triggers_recompile() {
        let fx = fixture();
        let engine = fx.engine(LinkMode::Copy);
        engine.compile(&fx.project, CompileOptions::default()).unwrap();
        fx.config("[project]\nname = \"renamed\"\n");
        assert!(!engine.is_fresh(&fx.project));
        let report = engine.compile(&fx.project, CompileOptions::default()).unwrap();
        assert!(!report.skipped);
        assert_eq!(
            fs::read_to_string(report.compiled_dir.join("commands/deploy.md")).unwrap(),
            "# Deploy renamed\n"
        );
    }

    #[test]
    fn volatile_config_change_keeps_cache() {
        let fx = fixture();
        let engine = fx.engine(LinkMode::Copy);
        engine.compile(&fx.project, CompileOptions::default()).unwrap();
        fx.config("[project]\nname = \"app\"\n[sync]\nlast_synced_at = \"2025-01-01T00:00:00Z\"\n");
        assert!(engine.compile(&fx.project, CompileOptions::default()).unwrap().skipped);
    }

    #[test]
    fn corrupt_metadata_forces_recompile() {
        let fx = fixture();
        let engine = fx.engine(LinkMode::Copy);
        engine.compile(&fx.project, CompileOptions::default()).unwrap();
        fs::write(engine.layout(&fx.project).metadata_path(), "garbage").unwrap();
        assert!(!engine.compile(&fx.project, CompileOptions::default()).unwrap().skipped);
    }

    #[test]
    fn recompile_drops_removed_templates() {
        let fx = fixture();
        let engine = fx.engine(LinkMode::Copy);
        let report = engine.compile(&fx.project, CompileOptions::default()).unwrap();
        fs::remove_file(fx.source.join("hooks/pre.sh.tmpl")).unwrap();
        engine.compile(&fx.project, CompileOptions { force: true }).unwrap();
        assert!(!report.compiled_dir.join("hooks/pre.sh").exists());
    }

    #[test]
    fn dynamic_names_are_never_compiled() {
        let fx = fixture();
        fx.template("commands/README.md.tmpl", "generated elsewhere\n");
        let engine = fx.engine(LinkMode::Copy);
        let report = engine.compile(&fx.project, CompileOptions::default()).unwrap();
        assert!(!report.compiled_dir.join("commands/README.md").exists());
        assert_eq!(report.categories["commands"], 1);
    }

    #[test]
    fn missing_placeholders_are_reported() {
        let fx = fixture();
        fx.template("agents/tester.md.tmpl", "use {{tools.test_runner}}\n");
        let engine = fx.engine(LinkMode::Copy);
        let report = engine.compile(&fx.project, CompileOptions::default()).unwrap();
        assert_eq!(
            report.missing["agents/tester.md"],
            vec!["tools.test_runner".to_string()]
        );
    }

    #[test]
    fn binary_bundle_members_are_copied_verbatim() {
        let fx = fixture();
        let bytes = [0x89_u8, b'P', b'N', b'G', 0, 0xff, b'{', b'{'];
        let path = fx.source.join("skills/review/logo.png");
        fs::write(&path, bytes).unwrap();
        let engine = fx.engine(LinkMode::Copy);
        let report = engine.compile(&fx.project, CompileOptions::default()).unwrap();
        assert_eq!(
            fs::read(report.compiled_dir.join("skills/review/logo.png")).unwrap(),
            bytes
        );
    }

    #[cfg(unix)]
    #[test]
    fn permissions_are_preserved() {
        use std::os::unix::fs::PermissionsExt;
        let fx = fixture();
        let src = fx.source.join("skills/review/scripts/run.sh");
        fs::set_permissions(&src, fs::Permissions::from_mode(0o755)).unwrap();
        let engine = fx.engine(LinkMode::Copy);
        let report = engine.compile(&fx.project, CompileOptions::default()).unwrap();
        let mode = fs::metadata(report.compiled_dir.join("skills/review/scripts/run.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn render_error_skips_template_and_continues() {
        let fx = fixture();
        fx.template("commands/bad.md.tmpl", "{{ never closed\n");
        let engine = fx.engine(LinkMode::Copy);
        let report = engine.compile(&fx.project, CompileOptions::default()).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("bad.md.tmpl"));
        assert_eq!(report.categories["commands"], 1);
        assert!(!report.compiled_dir.join("commands/bad.md").exists());
    }

    #[test]
    fn missing_source_category_yields_nothing() {
        let fx = Fixture::new();
        let engine = fx.engine(LinkMode::Copy);
        let report = engine.compile(&fx.project, CompileOptions::default()).unwrap();
        assert_eq!(report.file_count, 0);
        assert!(report.failures.is_empty());
        assert!(engine.layout(&fx.project).load_metadata().is_some());
    }

    static CALLS: AtomicUsize = AtomicUsize::new(0);

    #[test]
    fn divergent_renders_are_flagged_unstable() {
        let fx = Fixture::new();
        fx.template("commands/now.md.tmpl", "time\n");
        let mut mock = MockRenderer::new();
        mock.expect_render().returning(|text, _| {
            let n = CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(Rendered {
                text: format!("{text}{n}"),
                missing: vec![],
            })
        });
        let engine = fx.engine(LinkMode::Copy).with_renderer(Box::new(mock));
        let report = engine.compile(&fx.project, CompileOptions::default()).unwrap();
        assert_eq!(report.unstable, vec!["commands/now.md".to_string()]);
        let meta = engine.layout(&fx.project).load_metadata().unwrap();
        assert!(meta.is_unstable("commands", "now.md"));
    }

    #[test]
    fn renderer_receives_project_config() {
        let fx = Fixture::new();
        fx.config("[project]\nname = \"ctx\"\n")
            .template("commands/a.md.tmpl", "a");
        let mut mock = MockRenderer::new();
        mock.expect_render()
            .withf(|_, ctx| ctx["project"]["name"] == "ctx")
            .times(1)
            .returning(|_, _| Err(RenderError::Other("nope".to_string())));
        let engine = fx.engine(LinkMode::Copy).with_renderer(Box::new(mock));
        let report = engine.compile(&fx.project, CompileOptions::default()).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].message.contains("nope"));
    }
}
