//! Template compilation and link reconciliation.
//!
//! An [`Engine`] owns everything one invocation needs: resolved settings,
//! the template index, the renderer and the symlink capability prober.
//! Operations are split by concern:
//!
//! - [`compiler`]: render templates into the per-project compiled cache
//! - [`detect`]: find user-created entries in the managed directories
//! - [`linker`]: reconcile the project tree against the compiled cache
//! - [`repair`]: recompile and re-point broken links
//! - [`restore`]: restore missing files, or freeze links before removal
//! - [`status`]: read-only summary of the project tree
pub mod cache;
pub mod capability;
pub mod compiler;
pub mod detect;
pub mod fingerprint;
pub mod linker;
pub mod render;
pub mod repair;
pub mod restore;
pub mod status;

use serde::Serialize;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::config::index::TemplateIndex;
use crate::config::{LinkMode, Settings, absolute_project_root};
use crate::error::SyncError;
use crate::resources::managed_file::LinkMethod;
use cache::CacheLayout;
use capability::CapabilityProber;
use render::{PlaceholderRenderer, Renderer};

pub use compiler::{CompileOptions, CompileReport};
pub use detect::CustomFile;
pub use linker::{LinkOptions, LinkReport};
pub use repair::RepairReport;
pub use restore::{RemoveOptions, RemoveReport, RestoreReport};
pub use status::StatusReport;

/// Version recorded in cache metadata; a change forces recompilation.
#[must_use]
pub fn tool_version() -> &'static str {
    option_env!("TMPLSYNC_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// A file left untouched, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    /// Project-tree path.
    pub path: PathBuf,
    /// Why it was left alone.
    pub reason: String,
}

impl SkippedFile {
    /// Create a skipped entry.
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Compiles templates and reconciles project trees.
pub struct Engine {
    settings: Settings,
    index: TemplateIndex,
    renderer: Box<dyn Renderer>,
    capability: CapabilityProber,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("settings", &self.settings)
            .field("index", &self.index)
            .field("capability", &self.capability)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Build an engine from resolved settings, loading the template index
    /// from the source root.
    ///
    /// # Errors
    ///
    /// Returns an error if the source's `index.toml` is invalid.
    pub fn new(settings: Settings) -> Result<Self, SyncError> {
        let index = TemplateIndex::load(&settings.source_root)?;
        let capability =
            CapabilityProber::new(&settings.state_dir, settings.capability_ttl_days);
        Ok(Self {
            settings,
            index,
            renderer: Box::new(PlaceholderRenderer),
            capability,
        })
    }

    /// Replace the renderer.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Replace the capability prober.
    #[must_use]
    pub fn with_capability(mut self, capability: CapabilityProber) -> Self {
        self.capability = capability;
        self
    }

    /// Resolved settings.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Template index in use.
    #[must_use]
    pub const fn index(&self) -> &TemplateIndex {
        &self.index
    }

    /// Symlink capability prober.
    #[must_use]
    pub const fn capability(&self) -> &CapabilityProber {
        &self.capability
    }

    /// Compiled cache layout for a project.
    #[must_use]
    pub fn layout(&self, project_root: &Path) -> CacheLayout {
        CacheLayout::new(&self.settings.cache_root, &absolute_project_root(project_root))
    }

    /// How outputs are placed, probing symlink support in auto mode.
    #[must_use]
    pub fn link_method(&self) -> LinkMethod {
        match self.settings.link_mode {
            LinkMode::Symlink => LinkMethod::Symlink,
            LinkMode::Copy => LinkMethod::Copy,
            LinkMode::Auto => {
                if self.capability.probe() {
                    LinkMethod::Symlink
                } else {
                    LinkMethod::Copy
                }
            }
        }
    }

    /// Like [`link_method`](Self::link_method) but never probes; `None` in
    /// auto mode when no capability answer is known yet.
    #[must_use]
    pub fn peek_link_method(&self) -> Option<LinkMethod> {
        match self.settings.link_mode {
            LinkMode::Symlink => Some(LinkMethod::Symlink),
            LinkMode::Copy => Some(LinkMethod::Copy),
            LinkMode::Auto => self.capability.peek().map(|capable| {
                if capable {
                    LinkMethod::Symlink
                } else {
                    LinkMethod::Copy
                }
            }),
        }
    }
}

/// `/`-separated form of a relative path, as stored in metadata.
pub(crate) fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// First segment of a `/`-separated relative path.
pub(crate) fn top_level(rel: &str) -> &str {
    rel.split('/').next().unwrap_or(rel)
}
