//! `unlink` command: freeze managed links into real files.
use anyhow::Result;

use super::{CommandSetup, finish, outcome};
use crate::cli::{GlobalOpts, UnlinkOpts};
use crate::engine::RemoveOptions;
use crate::logging::{Logger, TaskStatus};

/// Run the unlink command.
///
/// # Errors
///
/// Returns an error if setup fails, a managed directory cannot be scanned,
/// or any link could not be frozen.
pub fn run(global: &GlobalOpts, opts: &UnlinkOpts, log: &Logger) -> Result<()> {
    let setup = CommandSetup::init(global, log)?;
    unlink(&setup, global, opts, log);
    finish(log)
}

/// Unlink stage, recorded as "Unlink".
pub fn unlink(setup: &CommandSetup, global: &GlobalOpts, opts: &UnlinkOpts, log: &Logger) {
    log.stage("Freezing managed links");
    let options = RemoveOptions {
        dry_run: global.dry_run,
        purge_cache: opts.purge_cache,
    };
    let report = match setup.engine.remove(&setup.project, options) {
        Ok(report) => report,
        Err(e) => {
            log.error(&e.to_string());
            log.record_task("Unlink", TaskStatus::Failed, Some(&e.to_string()));
            return;
        }
    };

    for path in &report.frozen {
        log.debug(&format!("froze {}", path.display()));
    }
    for error in &report.errors {
        log.warn(&format!("unlink failed: {error}"));
    }
    let mut message = format!(
        "{} frozen, {} deleted",
        report.frozen.len(),
        report.deleted.len()
    );
    if report.purged {
        message.push_str(", cache purged");
    }
    log.info(&message);
    let status = outcome(global.dry_run, report.errors.len(), report.errors.is_empty());
    log.record_task("Unlink", status, Some(&message));
}
