//! Managed file resource: one compiled output placed into the project tree,
//! either as a symlink into the compiled cache or as a plain copy.
use anyhow::{Context as _, Result};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use super::helpers::fs as fs_helpers;
use super::{Applicable, Resource, ResourceChange, ResourceState};
use crate::platform::paths_equal;

/// Skip reason for a real file whose content no longer matches the cache.
pub const REASON_CUSTOMIZED: &str = "customized (hash differs)";

/// Skip reason for a hash mismatch on an output whose template renders
/// differently between passes.
pub const REASON_UNSTABLE: &str = "customized (non-deterministic template)";

/// How a compiled output is materialized in the project tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMethod {
    /// Symlink pointing into the compiled cache.
    Symlink,
    /// Byte-for-byte copy of the compiled file.
    Copy,
}

impl fmt::Display for LinkMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symlink => write!(f, "symlink"),
            Self::Copy => write!(f, "copy"),
        }
    }
}

/// A compiled output and the project-tree path it is reconciled onto.
#[derive(Debug, Clone)]
pub struct ManagedFileResource {
    /// File inside the compiled cache.
    pub compiled: PathBuf,
    /// Path in the project tree.
    pub target: PathBuf,
    /// How the file is placed.
    pub method: LinkMethod,
    /// Whether the template renders non-deterministically.
    pub unstable: bool,
    /// Content hashes this output was compiled to before; a real file
    /// holding one of them is an unmodified copy.
    pub emitted: Vec<String>,
}

impl ManagedFileResource {
    /// Create a new managed file resource.
    #[must_use]
    pub const fn new(compiled: PathBuf, target: PathBuf, method: LinkMethod) -> Self {
        Self {
            compiled,
            target,
            method,
            unstable: false,
            emitted: Vec::new(),
        }
    }

    /// Mark the output as produced by a non-deterministic template.
    #[must_use]
    pub const fn with_unstable(mut self, unstable: bool) -> Self {
        self.unstable = unstable;
        self
    }

    /// Remember the hashes this output was previously compiled to.
    #[must_use]
    pub fn with_emitted(mut self, hashes: &[String]) -> Self {
        self.emitted = hashes.to_vec();
        self
    }

    fn customized_reason(&self) -> &'static str {
        if self.unstable {
            REASON_UNSTABLE
        } else {
            REASON_CUSTOMIZED
        }
    }

    fn place(&self) -> Result<()> {
        fs_helpers::ensure_parent_dir(&self.target)?;
        fs_helpers::remove_existing(&self.target)?;
        match self.method {
            LinkMethod::Symlink => fs_helpers::create_symlink(&self.compiled, &self.target)
                .with_context(|| format!("create link: {}", self.target.display())),
            LinkMethod::Copy => std::fs::copy(&self.compiled, &self.target)
                .map(|_| ())
                .with_context(|| {
                    format!(
                        "copy {} to {}",
                        self.compiled.display(),
                        self.target.display()
                    )
                }),
        }
    }
}

impl Applicable for ManagedFileResource {
    fn description(&self) -> String {
        format!("{} -> {}", self.target.display(), self.compiled.display())
    }

    /// Re-checks the state immediately before mutating, so a file edited
    /// since classification is still never overwritten.
    fn apply(&self) -> Result<ResourceChange> {
        match self.current_state()? {
            ResourceState::Correct => Ok(ResourceChange::AlreadyCorrect),
            ResourceState::Customized { reason } => Ok(ResourceChange::Skipped { reason }),
            ResourceState::Invalid { reason } => {
                anyhow::bail!("{}: {reason}", self.target.display())
            }
            ResourceState::Missing | ResourceState::Incorrect { .. } => {
                self.place()?;
                Ok(ResourceChange::Applied)
            }
        }
    }

    /// Freeze: replace the symlink with a real file holding the same bytes.
    fn remove(&self) -> Result<ResourceChange> {
        let is_link = self
            .target
            .symlink_metadata()
            .is_ok_and(|m| m.file_type().is_symlink());
        if !is_link {
            return Ok(ResourceChange::Skipped {
                reason: "not a managed link".to_string(),
            });
        }
        fs_helpers::copy_into_place(&self.target, &self.target)
            .with_context(|| format!("freeze {}", self.target.display()))?;
        Ok(ResourceChange::Applied)
    }
}

impl Resource for ManagedFileResource {
    fn current_state(&self) -> Result<ResourceState> {
        if !self.compiled.is_file() {
            return Ok(ResourceState::Invalid {
                reason: format!("compiled file does not exist: {}", self.compiled.display()),
            });
        }

        let meta = match self.target.symlink_metadata() {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ResourceState::Missing);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("inspect {}", self.target.display()));
            }
        };

        if meta.file_type().is_symlink() {
            let existing = std::fs::read_link(&self.target)
                .with_context(|| format!("read link {}", self.target.display()))?;
            if paths_equal(&existing, &self.compiled) {
                return Ok(ResourceState::Correct);
            }
            let current = if fs_helpers::is_broken_symlink(&self.target) {
                format!("broken link to {}", existing.display())
            } else {
                format!("points to {}", existing.display())
            };
            return Ok(ResourceState::Incorrect { current });
        }

        if meta.is_dir() {
            return Ok(ResourceState::Invalid {
                reason: "target is a real directory".to_string(),
            });
        }

        let target_hash = fs_helpers::hash_file(&self.target)
            .with_context(|| format!("hash {}", self.target.display()))?;
        let compiled_hash = fs_helpers::hash_file(&self.compiled)
            .with_context(|| format!("hash {}", self.compiled.display()))?;
        if target_hash != compiled_hash {
            if self.emitted.contains(&target_hash) {
                return Ok(ResourceState::Incorrect {
                    current: "unmodified copy of an earlier compile".to_string(),
                });
            }
            return Ok(ResourceState::Customized {
                reason: self.customized_reason().to_string(),
            });
        }
        match self.method {
            LinkMethod::Copy => Ok(ResourceState::Correct),
            LinkMethod::Symlink => Ok(ResourceState::Incorrect {
                current: "unmodified copy".to_string(),
            }),
        }
    }
}
