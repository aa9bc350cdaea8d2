//! `restore` command.
use anyhow::Result;

use super::{CommandSetup, finish, outcome};
use crate::cli::GlobalOpts;
use crate::logging::{Logger, TaskStatus};

/// Run the restore command.
///
/// # Errors
///
/// Returns an error if setup fails, the project is not compiled, or any file
/// could not be restored.
pub fn run(global: &GlobalOpts, log: &Logger) -> Result<()> {
    let setup = CommandSetup::init(global, log)?;
    restore(&setup, global, log);
    finish(log)
}

/// Restore stage, recorded as "Restore".
pub fn restore(setup: &CommandSetup, global: &GlobalOpts, log: &Logger) {
    log.stage("Restoring missing files");
    let report = match setup.engine.restore(&setup.project, global.dry_run) {
        Ok(report) => report,
        Err(e) => {
            log.error(&e.to_string());
            log.record_task("Restore", TaskStatus::Failed, Some(&e.to_string()));
            return;
        }
    };

    for path in &report.restored {
        log.debug(&format!("restored {}", path.display()));
    }
    for error in &report.errors {
        log.warn(&format!("restore failed: {error}"));
    }
    let message = format!(
        "{} restored, {} skipped",
        report.restored.len(),
        report.skipped.len()
    );
    log.info(&message);
    let status = outcome(global.dry_run, report.errors.len(), report.errors.is_empty());
    log.record_task("Restore", status, Some(&message));
}
