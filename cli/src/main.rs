use anyhow::Result;
use clap::Parser;

use tmplsync_cli::cli::{self, Command};
use tmplsync_cli::commands;
use tmplsync_cli::logging::{self, Logger};

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = cli::Cli::parse();
    let name = args.command.name();
    logging::init_subscriber(args.verbose, name);
    let log = Logger::new(name);
    let global = &args.global;

    match &args.command {
        Command::Compile(opts) => commands::sync::run_compile(global, opts, &log),
        Command::Link => commands::sync::run_link(global, &log),
        Command::Sync(opts) => commands::sync::run(global, opts, &log),
        Command::Repair => commands::repair::run(global, &log),
        Command::Restore => commands::restore::run(global, &log),
        Command::Unlink(opts) => commands::unlink::run(global, opts, &log),
        Command::Status(opts) => commands::status::run(global, opts, &log),
        Command::Custom => commands::status::run_custom(global, &log),
        Command::Validate => commands::status::run_validate(global, &log),
        Command::Version => commands::version::run(),
    }
}
