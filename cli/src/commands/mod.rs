pub mod repair;
pub mod restore;
pub mod status;
pub mod sync;
pub mod unlink;
pub mod version;

use anyhow::{Context as _, Result};
use std::io::Write as _;
use std::path::PathBuf;

use crate::cli::GlobalOpts;
use crate::config::absolute_project_root;
use crate::config::validation::validate_source;
use crate::config::{Settings, SettingsOverrides};
use crate::engine::Engine;
use crate::logging::{Logger, TaskStatus};

/// Shared state produced by the common command setup sequence.
///
/// Resolves settings, loads the template index and locates the project so
/// that each command does not have to repeat the boilerplate. Nothing but
/// warnings is logged above debug level, keeping stdout free for `status`.
#[derive(Debug)]
pub struct CommandSetup {
    /// Engine built from the resolved settings.
    pub engine: Engine,
    /// Absolute project root.
    pub project: PathBuf,
}

impl CommandSetup {
    /// Resolve settings from the command line, environment and settings
    /// file, and build the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if no template source can be found, a settings value
    /// is invalid, or the template index fails to parse.
    pub fn init(global: &GlobalOpts, log: &Logger) -> Result<Self> {
        let overrides = SettingsOverrides {
            source: global.source.clone(),
            cache_dir: global.cache_dir.clone(),
            state_dir: None,
            link_mode: global.link_mode,
        };
        Self::with_overrides(global, &overrides, log)
    }

    /// Like [`init`](Self::init) with explicit overrides.
    ///
    /// # Errors
    ///
    /// See [`init`](Self::init).
    pub fn with_overrides(
        global: &GlobalOpts,
        overrides: &SettingsOverrides,
        log: &Logger,
    ) -> Result<Self> {
        let settings = Settings::resolve(overrides).context("failed to resolve settings")?;
        log.debug(&format!("source: {}", settings.source_root.display()));
        log.debug(&format!("cache: {}", settings.cache_root.display()));
        log.debug(&format!("link mode: {}", settings.link_mode));

        let project = match &global.project {
            Some(path) => path.clone(),
            None => std::env::current_dir().context("cannot determine current directory")?,
        };
        let project = absolute_project_root(&project);
        if !project.is_dir() {
            anyhow::bail!("project directory not found: {}", project.display());
        }
        log.debug(&format!("project: {}", project.display()));

        let engine = Engine::new(settings)?;
        log.debug(&format!(
            "{} categories, {} dynamic names",
            engine.index().categories.len(),
            engine.index().dynamic.len()
        ));

        let warnings = validate_source(engine.index(), &engine.settings().source_root);
        if !warnings.is_empty() {
            log.warn(&format!(
                "found {} template source warning(s); run `tmplsync validate` for details",
                warnings.len()
            ));
        }

        Ok(Self { engine, project })
    }
}

/// Status to record for an operation that touched files.
///
/// `ok` is the operation's own success rule; a successful run with per-file
/// errors is partial.
pub(crate) const fn outcome(dry_run: bool, errors: usize, ok: bool) -> TaskStatus {
    if !ok {
        TaskStatus::Failed
    } else if errors > 0 {
        TaskStatus::Partial
    } else if dry_run {
        TaskStatus::DryRun
    } else {
        TaskStatus::Ok
    }
}

/// Print the summary, and bail if any operation failed.
///
/// # Errors
///
/// Returns an error if one or more operations recorded a failure.
pub fn finish(log: &Logger) -> Result<()> {
    log.print_summary();

    let count = log.failure_count();
    if count > 0 {
        anyhow::bail!("{count} operation(s) failed");
    }
    Ok(())
}

/// Write command output to stdout.
pub(crate) fn emit(text: &str) -> Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "{text}").context("failed to write to stdout")
}
