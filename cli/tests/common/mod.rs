// Shared helpers for integration tests.
//
// Provides a temporary template source, project, cache and state directory,
// plus a fluent builder so each integration test can set up an isolated
// environment without repeating filesystem boilerplate.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tmplsync_cli::cli::GlobalOpts;
use tmplsync_cli::commands::CommandSetup;
use tmplsync_cli::config::{LinkMode, Settings, SettingsOverrides};
use tmplsync_cli::engine::Engine;
use tmplsync_cli::logging::Logger;

/// An isolated template source and project backed by a [`tempfile::TempDir`].
///
/// Everything is deleted when dropped.
pub struct IntegrationTestContext {
    /// Keeps every directory alive.
    pub root: tempfile::TempDir,
    /// Template source root.
    pub source: PathBuf,
    /// Project root (symlink-resolved).
    pub project: PathBuf,
}

impl IntegrationTestContext {
    /// Create a context with an empty template source and project.
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        let source = root.path().join("templates");
        let project = root.path().join("project");
        std::fs::create_dir_all(&source).expect("create source dir");
        std::fs::create_dir_all(&project).expect("create project dir");
        let project = dunce::canonicalize(&project).expect("canonicalize project");
        Self {
            root,
            source,
            project,
        }
    }

    /// Compiled cache root.
    pub fn cache_dir(&self) -> PathBuf {
        self.root.path().join("cache")
    }

    /// State directory (capability record).
    pub fn state_dir(&self) -> PathBuf {
        self.root.path().join("state")
    }

    /// Settings pointing into this context.
    pub fn settings(&self, mode: LinkMode) -> Settings {
        let mut settings = Settings::new(self.source.clone(), self.cache_dir(), self.state_dir());
        settings.link_mode = mode;
        settings
    }

    /// Engine with the built-in renderer.
    pub fn engine(&self, mode: LinkMode) -> Engine {
        Engine::new(self.settings(mode)).expect("build engine")
    }

    /// Global options as the command line would produce them.
    pub fn global(&self, mode: LinkMode, dry_run: bool) -> GlobalOpts {
        GlobalOpts {
            project: Some(self.project.clone()),
            source: Some(self.source.clone()),
            cache_dir: Some(self.cache_dir()),
            link_mode: Some(mode),
            dry_run,
            parallel: true,
        }
    }

    /// Command setup that never touches the user's state directory.
    pub fn setup(&self, global: &GlobalOpts, log: &Logger) -> CommandSetup {
        let overrides = SettingsOverrides {
            source: global.source.clone(),
            cache_dir: global.cache_dir.clone(),
            state_dir: Some(self.state_dir()),
            link_mode: global.link_mode,
        };
        CommandSetup::with_overrides(global, &overrides, log).expect("command setup")
    }

    /// Path of `rel` inside the project.
    pub fn project_path(&self, rel: &str) -> PathBuf {
        self.project.join(rel)
    }

    /// Read a project file as text.
    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.project_path(rel)).expect("read project file")
    }

    /// Write a project file, creating parents.
    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.project_path(rel);
        write_file(&path, content);
        path
    }
}

/// Logger that records a summary but writes no log file.
pub fn quiet_logger() -> Logger {
    Logger::with_log_file(None)
}

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(path, content).expect("write file");
}

/// Fluent builder for [`IntegrationTestContext`].
pub struct TestContextBuilder {
    ctx: IntegrationTestContext,
}

impl TestContextBuilder {
    /// Begin building a new context.
    pub fn new() -> Self {
        Self {
            ctx: IntegrationTestContext::new(),
        }
    }

    /// Write a template relative to the source root.
    pub fn with_template(self, rel: &str, content: &str) -> Self {
        write_file(&self.ctx.source.join(rel), content);
        self
    }

    /// Write the project's `.tmplsync.toml`.
    pub fn with_project_config(self, toml: &str) -> Self {
        write_file(&self.ctx.project.join(".tmplsync.toml"), toml);
        self
    }

    /// Write the source's `index.toml`.
    pub fn with_index(self, toml: &str) -> Self {
        write_file(&self.ctx.source.join("index.toml"), toml);
        self
    }

    /// Finish building and return the configured context.
    pub fn build(self) -> IntegrationTestContext {
        self.ctx
    }
}
