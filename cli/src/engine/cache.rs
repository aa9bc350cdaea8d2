//! Compiled cache layout: per-project slug, metadata and advisory lock.
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::CacheError;
use crate::resources::helpers::fs as fs_helpers;

/// Hidden metadata file at the root of every compiled cache.
pub const METADATA_FILE: &str = ".tmplsync-meta.json";

/// Number of hex characters of the path hash kept in a slug.
const SLUG_HASH_LEN: usize = 12;

/// Stable cache key for a project: sanitized, lowercased directory name plus
/// the first 12 hex characters of the SHA-256 of the absolute path.
///
/// ```
/// use std::path::Path;
/// use tmplsync_cli::engine::cache::slug;
///
/// let s = slug(Path::new("/work/My App"));
/// assert!(s.starts_with("my-app-"));
/// assert_eq!(s.len(), "my-app-".len() + 12);
/// ```
#[must_use]
pub fn slug(project_root: &Path) -> String {
    let base: String = project_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let base = if base.is_empty() {
        "project".to_string()
    } else {
        base
    };
    let hash = fs_helpers::hash_bytes(project_root.to_string_lossy().as_bytes());
    format!("{base}-{}", hash.get(..SLUG_HASH_LEN).unwrap_or(&hash))
}

/// Metadata describing one compiled cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Absolute project root the cache was compiled for.
    pub project_path: PathBuf,
    /// Template source root used.
    pub source_root: PathBuf,
    /// Version of the tool that compiled.
    pub tool_version: String,
    /// Completion time of the compile.
    pub compiled_at: DateTime<Utc>,
    /// Config fingerprint at compile time.
    pub fingerprint: String,
    /// Template source digest at compile time.
    #[serde(default)]
    pub source_digest: String,
    /// Category name to output paths relative to the category directory,
    /// `/`-separated.
    pub categories: BTreeMap<String, Vec<String>>,
    /// Outputs whose template rendered differently between passes, as
    /// `<category>/<relative path>`.
    #[serde(default)]
    pub unstable: BTreeSet<String>,
    /// Content hashes each output has had across compiles, oldest first,
    /// keyed like `unstable`. The last entry is the current content.
    #[serde(default)]
    pub emitted: BTreeMap<String, Vec<String>>,
}

impl Metadata {
    /// Total number of compiled outputs.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    /// Whether the cache was compiled by this tool version from the given
    /// fingerprint and source digest.
    #[must_use]
    pub fn matches(&self, tool_version: &str, fingerprint: &str, source_digest: &str) -> bool {
        self.tool_version == tool_version
            && self.fingerprint == fingerprint
            && self.source_digest == source_digest
    }

    /// Hashes the output `rel` of `category` has been compiled to.
    #[must_use]
    pub fn emitted_hashes(&self, category: &str, rel: &str) -> &[String] {
        self.emitted
            .get(&format!("{category}/{rel}"))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether the output `rel` of `category` is flagged unstable.
    #[must_use]
    pub fn is_unstable(&self, category: &str, rel: &str) -> bool {
        self.unstable.contains(&format!("{category}/{rel}"))
    }
}

/// Location of one project's compiled cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    cache_root: PathBuf,
    slug: String,
}

impl CacheLayout {
    /// Layout for `project_root` (already absolute) under `cache_root`.
    #[must_use]
    pub fn new(cache_root: &Path, project_root: &Path) -> Self {
        Self {
            cache_root: std::path::absolute(cache_root)
                .unwrap_or_else(|_| cache_root.to_path_buf()),
            slug: slug(project_root),
        }
    }

    /// The project slug.
    #[must_use]
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// `<cacheRoot>/<slug>`.
    #[must_use]
    pub fn dir(&self) -> PathBuf {
        self.cache_root.join(&self.slug)
    }

    /// `<cacheRoot>/<slug>/<category>`.
    #[must_use]
    pub fn category_dir(&self, category: &str) -> PathBuf {
        self.dir().join(category)
    }

    /// Path of the metadata file.
    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        self.dir().join(METADATA_FILE)
    }

    /// `<cacheRoot>/<slug>.lock`.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.cache_root.join(format!("{}.lock", self.slug))
    }

    /// Whether `path` lies inside this project's compiled cache.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        dunce::simplified(path).starts_with(dunce::simplified(&self.dir()))
    }

    /// Load metadata; a missing, unreadable or corrupt file yields `None`.
    #[must_use]
    pub fn load_metadata(&self) -> Option<Metadata> {
        let path = self.metadata_path();
        let text = std::fs::read_to_string(&path).ok()?;
        serde_json::from_str(&text)
            .inspect_err(|e| {
                tracing::warn!(
                    target: "tmplsync::engine",
                    "ignoring corrupt cache metadata {}: {e}",
                    path.display()
                );
            })
            .ok()
    }

    /// Persist metadata atomically.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Metadata`] if serialization or the write fails.
    pub fn save_metadata(&self, metadata: &Metadata) -> Result<(), CacheError> {
        let path = self.metadata_path();
        let to_error = |message: String| CacheError::Metadata {
            path: path.display().to_string(),
            message,
        };
        let bytes = serde_json::to_vec_pretty(metadata).map_err(|e| to_error(e.to_string()))?;
        fs_helpers::write_atomic(&path, &bytes).map_err(|e| to_error(format!("{e:#}")))
    }

    /// Take the exclusive advisory lock for this slug, blocking until it is
    /// available. Released when the guard drops.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Lock`] if the lock file cannot be opened or locked.
    pub fn lock(&self) -> Result<SlugLock, CacheError> {
        let to_error = |source| CacheError::Lock {
            slug: self.slug.clone(),
            source,
        };
        std::fs::create_dir_all(&self.cache_root).map_err(to_error)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(to_error)?;
        file.lock_exclusive().map_err(to_error)?;
        tracing::debug!(target: "tmplsync::engine", slug = %self.slug, "acquired cache lock");
        Ok(SlugLock { file })
    }
}

/// Held advisory lock on a project slug.
#[derive(Debug)]
pub struct SlugLock {
    file: File,
}

impl Drop for SlugLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
