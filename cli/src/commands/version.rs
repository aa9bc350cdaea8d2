//! Command: print version information.
use anyhow::Result;

use crate::engine::tool_version;

/// Print the tmplsync version to stdout.
///
/// # Errors
///
/// Returns an error if stdout cannot be written.
pub fn run() -> Result<()> {
    super::emit(&format!("tmplsync {}", tool_version()))
}
