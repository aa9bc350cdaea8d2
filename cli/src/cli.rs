use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::LinkMode;

/// Top-level CLI entry point for the template sync engine.
#[derive(Parser, Debug)]
#[command(
    name = "tmplsync",
    about = "Compile shared templates into a project and keep the links in sync",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone)]
pub struct GlobalOpts {
    /// Project root (defaults to the current directory)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,

    /// Template source directory
    #[arg(long, global = true)]
    pub source: Option<PathBuf>,

    /// Directory holding compiled caches
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// How compiled files are placed: auto, symlink or copy
    #[arg(long, global = true, value_parser = parse_link_mode)]
    pub link_mode: Option<LinkMode>,

    /// Preview changes without applying
    #[arg(short = 'd', long, global = true)]
    pub dry_run: bool,

    /// Link categories one at a time (parallel is enabled by default)
    #[arg(long = "no-parallel", global = true, action = clap::ArgAction::SetFalse)]
    pub parallel: bool,
}

fn parse_link_mode(value: &str) -> Result<LinkMode, String> {
    value.parse().map_err(|e: crate::error::ConfigError| e.to_string())
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render templates into the project's compiled cache
    Compile(CompileOpts),
    /// Link compiled files into the project tree
    Link,
    /// Compile, then link
    Sync(CompileOpts),
    /// Recompile and fix broken links
    Repair,
    /// Restore missing files as real copies
    Restore,
    /// Replace managed links with real files
    Unlink(UnlinkOpts),
    /// Show the state of the project tree
    Status(StatusOpts),
    /// List user-created files in managed directories
    Custom,
    /// Check the template source for problems
    Validate,
    /// Print version information
    Version,
}

impl Command {
    /// Subcommand name, used for the log file.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Compile(_) => "compile",
            Self::Link => "link",
            Self::Sync(_) => "sync",
            Self::Repair => "repair",
            Self::Restore => "restore",
            Self::Unlink(_) => "unlink",
            Self::Status(_) => "status",
            Self::Custom => "custom",
            Self::Validate => "validate",
            Self::Version => "version",
        }
    }
}

/// Options for the `compile` and `sync` subcommands.
#[derive(Parser, Debug, Clone, Default)]
pub struct CompileOpts {
    /// Recompile even when the cache is up to date
    #[arg(long)]
    pub force: bool,
}

/// Options for the `unlink` subcommand.
#[derive(Parser, Debug, Clone, Default)]
pub struct UnlinkOpts {
    /// Also delete the project's compiled cache
    #[arg(long)]
    pub purge_cache: bool,
}

/// Options for the `status` subcommand.
#[derive(Parser, Debug, Clone, Default)]
pub struct StatusOpts {
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}
