//! Template compilation and link reconciliation.
//!
//! Renders a shared template source into a per-project compiled cache, then
//! reconciles that cache against the project's managed directories with
//! symlinks or copies. Hand-edited files and user-created entries are never
//! overwritten.
//!
//! The public API is organised into layers:
//!
//! - **[`config`]**: settings, project configuration, the template index
//! - **[`resources`]**: idempotent `check + apply` primitives for managed files
//! - **[`engine`]**: compile, link, repair, restore, unlink and status
//! - **[`commands`]**: top-level subcommand orchestration
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod platform;
pub mod resources;
