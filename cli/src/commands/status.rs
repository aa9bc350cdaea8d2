//! Read-only commands: `status`, `custom` and `validate`.
use anyhow::{Context as _, Result};

use super::{CommandSetup, emit};
use crate::cli::{GlobalOpts, StatusOpts};
use crate::config::validation::validate_source;
use crate::logging::Logger;

/// Run the status command.
///
/// # Errors
///
/// Returns an error if setup fails or the project tree cannot be read.
pub fn run(global: &GlobalOpts, opts: &StatusOpts, log: &Logger) -> Result<()> {
    let setup = CommandSetup::init(global, log)?;
    emit(&render_status(&setup, opts)?)
}

/// Status report as text or JSON.
///
/// # Errors
///
/// Returns an error if the project tree cannot be read.
pub fn render_status(setup: &CommandSetup, opts: &StatusOpts) -> Result<String> {
    let report = setup.engine.status(&setup.project)?;
    if opts.json {
        serde_json::to_string_pretty(&report).context("failed to serialize status")
    } else {
        Ok(report.to_string())
    }
}

/// Run the custom command: list user-created entries.
///
/// # Errors
///
/// Returns an error if setup fails or a managed directory cannot be read.
pub fn run_custom(global: &GlobalOpts, log: &Logger) -> Result<()> {
    let setup = CommandSetup::init(global, log)?;
    emit(&render_custom(&setup, log)?)
}

/// One `<category>\t<path>` line per custom entry.
///
/// # Errors
///
/// Returns an error if a managed directory cannot be read.
pub fn render_custom(setup: &CommandSetup, log: &Logger) -> Result<String> {
    let custom = setup.engine.detect_custom(&setup.project)?;
    log.debug(&format!("{} custom entr(ies)", custom.len()));
    Ok(custom
        .iter()
        .map(|c| format!("{}\t{}", c.category, c.path.display()))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Run the validate command.
///
/// # Errors
///
/// Returns an error if setup fails or the template source has problems.
pub fn run_validate(global: &GlobalOpts, log: &Logger) -> Result<()> {
    let setup = CommandSetup::init(global, log)?;
    validate(&setup, log)
}

/// Validate the template source, logging every warning.
///
/// # Errors
///
/// Returns an error if any warning was found.
pub fn validate(setup: &CommandSetup, log: &Logger) -> Result<()> {
    log.stage("Validating template source");
    let warnings = validate_source(setup.engine.index(), &setup.engine.settings().source_root);
    if warnings.is_empty() {
        log.info("no problems found");
        return Ok(());
    }
    for warning in &warnings {
        log.warn(&format!(
            "{} [{}]: {}",
            warning.category, warning.item, warning.message
        ));
    }
    anyhow::bail!("found {} template source warning(s)", warnings.len());
}
