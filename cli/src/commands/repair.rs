//! `repair` command.
use anyhow::Result;

use super::{CommandSetup, finish, outcome};
use crate::cli::GlobalOpts;
use crate::engine::repair::RepairOptions;
use crate::logging::{Logger, TaskStatus};

/// Run the repair command.
///
/// # Errors
///
/// Returns an error if setup fails or any broken link could not be fixed.
pub fn run(global: &GlobalOpts, log: &Logger) -> Result<()> {
    let setup = CommandSetup::init(global, log)?;
    repair(&setup, global, log);
    finish(log)
}

/// Repair stage, recorded as "Repair".
pub fn repair(setup: &CommandSetup, global: &GlobalOpts, log: &Logger) {
    log.stage("Repairing links");
    let options = RepairOptions {
        dry_run: global.dry_run,
    };
    let report = match setup.engine.repair(&setup.project, options) {
        Ok(report) => report,
        Err(e) => {
            log.error(&e.to_string());
            log.record_task("Repair", TaskStatus::Failed, Some(&e.to_string()));
            return;
        }
    };

    if let Some(compile) = &report.compile {
        log.debug(&format!("recompiled {} file(s)", compile.file_count));
    }
    for path in &report.fixed {
        log.debug(&format!("relinked {}", path.display()));
    }
    for path in &report.removed {
        log.debug(&format!("removed {}", path.display()));
    }
    for error in &report.errors {
        log.warn(&format!("repair failed: {error}"));
    }

    let message = format!(
        "{} fixed, {} removed",
        report.fixed.len(),
        report.removed.len()
    );
    log.info(&message);
    let status = if report.fixed.is_empty() && report.removed.is_empty() && report.success() {
        TaskStatus::Skipped
    } else {
        outcome(global.dry_run, report.errors.len(), report.success())
    };
    log.record_task("Repair", status, Some(&message));
}
