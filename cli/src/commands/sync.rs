//! `compile`, `link` and `sync` commands.
use anyhow::Result;

use super::{CommandSetup, finish, outcome};
use crate::cli::{CompileOpts, GlobalOpts};
use crate::engine::{CompileOptions, CompileReport, LinkOptions, LinkReport};
use crate::logging::{Logger, TaskStatus};

/// Run the compile command.
///
/// # Errors
///
/// Returns an error if setup fails or the compile fails as a whole.
pub fn run_compile(global: &GlobalOpts, opts: &CompileOpts, log: &Logger) -> Result<()> {
    let setup = CommandSetup::init(global, log)?;
    compile(&setup, global, opts, log);
    finish(log)
}

/// Run the link command.
///
/// # Errors
///
/// Returns an error if setup fails, the project is not compiled, or the link
/// run is not successful.
pub fn run_link(global: &GlobalOpts, log: &Logger) -> Result<()> {
    let setup = CommandSetup::init(global, log)?;
    link(&setup, global, log);
    finish(log)
}

/// Run the sync command: compile, then link.
///
/// # Errors
///
/// Returns an error if setup fails or either stage fails.
pub fn run(global: &GlobalOpts, opts: &CompileOpts, log: &Logger) -> Result<()> {
    let setup = CommandSetup::init(global, log)?;
    sync(&setup, global, opts, log);
    finish(log)
}

/// Compile then link, recording both stages.
pub fn sync(setup: &CommandSetup, global: &GlobalOpts, opts: &CompileOpts, log: &Logger) {
    compile(setup, global, opts, log);
    if log.has_failures() {
        log.record_task("Link", TaskStatus::Skipped, Some("compile failed"));
        return;
    }
    if global.dry_run && setup.engine.layout(&setup.project).load_metadata().is_none() {
        log.dry_run("would link compiled files");
        log.record_task("Link", TaskStatus::DryRun, Some("not compiled yet"));
        return;
    }
    link(setup, global, log);
}

/// Compile stage, recorded as "Compile".
pub fn compile(setup: &CommandSetup, global: &GlobalOpts, opts: &CompileOpts, log: &Logger) {
    log.stage("Compiling templates");
    let engine = &setup.engine;

    if global.dry_run {
        if !opts.force && engine.is_fresh(&setup.project) {
            log.record_task("Compile", TaskStatus::Skipped, Some("cache fresh"));
        } else {
            log.dry_run(&format!(
                "would compile into {}",
                engine.layout(&setup.project).dir().display()
            ));
            log.record_task("Compile", TaskStatus::DryRun, None);
        }
        return;
    }

    match engine.compile(&setup.project, CompileOptions { force: opts.force }) {
        Ok(report) => record_compile(&report, log),
        Err(e) => {
            log.error(&format!("compile failed: {e}"));
            log.record_task("Compile", TaskStatus::Failed, Some(&e.to_string()));
        }
    }
}

fn record_compile(report: &CompileReport, log: &Logger) {
    if report.skipped {
        log.info(&format!("cache fresh ({} files)", report.file_count));
        log.record_task("Compile", TaskStatus::Skipped, Some("cache fresh"));
        return;
    }

    for (name, count) in &report.categories {
        log.debug(&format!("{name}: {count} file(s)"));
    }
    if !report.missing.is_empty() {
        log.info(&format!(
            "{} output(s) with unresolved placeholders",
            report.missing.len()
        ));
    }
    let message = format!(
        "{} file(s) into {}",
        report.file_count,
        report.compiled_dir.display()
    );
    log.info(&message);
    let status = outcome(false, report.failures.len(), true);
    let message = if report.failures.is_empty() {
        message
    } else {
        format!("{message}, {} failed", report.failures.len())
    };
    log.record_task("Compile", status, Some(&message));
}

/// Link stage, recorded as "Link".
pub fn link(setup: &CommandSetup, global: &GlobalOpts, log: &Logger) {
    log.stage("Linking");
    let options = LinkOptions {
        dry_run: global.dry_run,
        parallel: global.parallel,
    };
    match setup.engine.link(&setup.project, options) {
        Ok(report) => record_link(&report, log),
        Err(e) => {
            log.error(&e.to_string());
            log.record_task("Link", TaskStatus::Failed, Some(&e.to_string()));
        }
    }
}

fn record_link(report: &LinkReport, log: &Logger) {
    for skipped in &report.skipped {
        log.debug(&format!("skipped {} ({})", skipped.path.display(), skipped.reason));
    }
    for error in &report.errors {
        log.warn(&format!("link failed: {error}"));
    }
    let mut summary = report.summary();
    if report.fallback_to_copy {
        summary.push_str(" (copied)");
    }
    log.info(&summary);
    let status = outcome(report.dry_run, report.errors.len(), report.success());
    log.record_task("Link", status, Some(&summary));
}
