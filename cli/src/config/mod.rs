//! Configuration: engine settings, project configuration and the template
//! source index.
pub mod index;
pub mod project;
pub mod toml_loader;
pub mod validation;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConfigError;

/// Default age after which a persisted capability probe is re-run.
pub const DEFAULT_CAPABILITY_TTL_DAYS: i64 = 30;

/// How rendered files are placed into the project tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// Symlink when the filesystem supports it, copy otherwise.
    #[default]
    Auto,
    /// Always symlink.
    Symlink,
    /// Always copy.
    Copy,
}

impl fmt::Display for LinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Symlink => write!(f, "symlink"),
            Self::Copy => write!(f, "copy"),
        }
    }
}

impl FromStr for LinkMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "symlink" | "link" => Ok(Self::Symlink),
            "copy" => Ok(Self::Copy),
            _ => Err(ConfigError::InvalidLinkMode(s.to_string())),
        }
    }
}

/// Resolved engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Root of the shared template source.
    pub source_root: PathBuf,
    /// Directory holding one compiled cache per project slug.
    pub cache_root: PathBuf,
    /// Process-wide state directory (capability record, logs).
    pub state_dir: PathBuf,
    /// Requested link mode.
    pub link_mode: LinkMode,
    /// Capability probe time-to-live, in days.
    pub capability_ttl_days: i64,
}

/// Values supplied on the command line; each wins over every other layer.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    /// `--source`.
    pub source: Option<PathBuf>,
    /// `--cache-dir`.
    pub cache_dir: Option<PathBuf>,
    /// State directory override (tests and embedding callers).
    pub state_dir: Option<PathBuf>,
    /// `--link-mode`.
    pub link_mode: Option<LinkMode>,
}

/// On-disk shape of the user settings file.
#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    source: Option<PathBuf>,
    #[serde(default)]
    cache_dir: Option<PathBuf>,
    #[serde(default)]
    link_mode: Option<String>,
    #[serde(default)]
    capability_ttl_days: Option<i64>,
}

impl Settings {
    /// Settings with explicit directories and defaults for everything else.
    #[must_use]
    pub fn new(source_root: PathBuf, cache_root: PathBuf, state_dir: PathBuf) -> Self {
        Self {
            source_root,
            cache_root,
            state_dir,
            link_mode: LinkMode::Auto,
            capability_ttl_days: DEFAULT_CAPABILITY_TTL_DAYS,
        }
    }

    /// Resolve settings with precedence: command line, environment
    /// (`TMPLSYNC_*`), user settings file, built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file is invalid, a link mode value is
    /// unknown, or no template source can be located.
    pub fn resolve(overrides: &SettingsOverrides) -> Result<Self, ConfigError> {
        let file: SettingsFile = toml_loader::load_config(&settings_file_path())?;
        Self::resolve_with(overrides, file, |key: &str| std::env::var(key).ok())
    }

    fn resolve_with(
        overrides: &SettingsOverrides,
        file: SettingsFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let source_root = overrides
            .source
            .clone()
            .or_else(|| env("TMPLSYNC_SOURCE").map(PathBuf::from))
            .or(file.source)
            .or_else(detect_source)
            .ok_or_else(|| {
                ConfigError::SourceNotFound(
                    "use --source or set TMPLSYNC_SOURCE to the template directory".to_string(),
                )
            })?;
        if !source_root.is_dir() {
            return Err(ConfigError::SourceNotFound(
                source_root.display().to_string(),
            ));
        }

        let state_dir = overrides
            .state_dir
            .clone()
            .or_else(|| env("TMPLSYNC_STATE_DIR").map(PathBuf::from))
            .unwrap_or_else(crate::logging::state_dir);

        let cache_root = overrides
            .cache_dir
            .clone()
            .or_else(|| env("TMPLSYNC_CACHE_DIR").map(PathBuf::from))
            .or(file.cache_dir)
            .unwrap_or_else(|| state_dir.join("compiled"));

        let link_mode = match overrides.link_mode {
            Some(mode) => mode,
            None => env("TMPLSYNC_LINK_MODE")
                .or(file.link_mode)
                .map(|s| s.parse::<LinkMode>())
                .transpose()?
                .unwrap_or_default(),
        };

        Ok(Self {
            source_root,
            cache_root,
            state_dir,
            link_mode,
            capability_ttl_days: file
                .capability_ttl_days
                .unwrap_or(DEFAULT_CAPABILITY_TTL_DAYS),
        })
    }
}

/// `$XDG_CONFIG_HOME/tmplsync/settings.toml` (or `~/.config/tmplsync/settings.toml`).
fn settings_file_path() -> PathBuf {
    let config_dir = std::env::var("XDG_CONFIG_HOME").map_or_else(
        |_| {
            std::env::var("HOME")
                .or_else(|_| std::env::var("USERPROFILE"))
                .map_or_else(|_| PathBuf::from("."), PathBuf::from)
                .join(".config")
        },
        PathBuf::from,
    );
    config_dir.join("tmplsync").join("settings.toml")
}

/// Auto-detect the template source: next to the installed binary, in the
/// repository checkout the binary was built in, or under the current
/// directory.
fn detect_source() -> Option<PathBuf> {
    if let Ok(exe) = std::env::current_exe()
        && let Some(parent) = exe.parent()
    {
        let candidates = [
            parent.join("../share/tmplsync/templates"), // bin/ → prefix/share
            parent.join("../../../templates"),          // cli/target/release/ → repo root
            parent.join("templates"),
        ];
        for candidate in &candidates {
            if candidate.is_dir() {
                return dunce::canonicalize(candidate).ok();
            }
        }
    }

    let cwd = std::env::current_dir().ok()?;
    let local = cwd.join("templates");
    local.is_dir().then_some(local)
}

/// Absolute, symlink-resolved form of a project root.
///
/// Falls back to joining onto the current directory when the path does not
/// exist yet.
#[must_use]
pub fn absolute_project_root(path: &Path) -> PathBuf {
    dunce::canonicalize(path).unwrap_or_else(|_| {
        std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
    })
}

/// Shared helpers for configuration unit tests.
#[cfg(test)]
#[allow(clippy::expect_used)]
pub mod test_helpers {
    use std::path::PathBuf;

    /// Write `content` to a `config.toml` inside a fresh temporary directory.
    pub fn write_temp_toml(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, content).expect("write temp toml");
        (dir, path)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn link_mode_parses_case_insensitively() {
        assert_eq!("COPY".parse::<LinkMode>().unwrap(), LinkMode::Copy);
        assert_eq!("symlink".parse::<LinkMode>().unwrap(), LinkMode::Symlink);
        assert!("hardlink".parse::<LinkMode>().is_err());
    }

    #[test]
    fn cli_override_wins_over_env() {
        let src = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let overrides = SettingsOverrides {
            source: Some(src.path().to_path_buf()),
            state_dir: Some(PathBuf::from("/state")),
            link_mode: Some(LinkMode::Copy),
            ..SettingsOverrides::default()
        };
        let env = env_from(&[
            ("TMPLSYNC_SOURCE", other.path().to_str().unwrap()),
            ("TMPLSYNC_LINK_MODE", "symlink"),
        ]);
        let settings =
            Settings::resolve_with(&overrides, SettingsFile::default(), env).unwrap();
        assert_eq!(settings.source_root, src.path());
        assert_eq!(settings.link_mode, LinkMode::Copy);
        assert_eq!(settings.cache_root, PathBuf::from("/state/compiled"));
    }

    #[test]
    fn env_wins_over_file() {
        let src = tempfile::tempdir().unwrap();
        let file = SettingsFile {
            source: Some(PathBuf::from("/does/not/matter")),
            cache_dir: Some(PathBuf::from("/file/cache")),
            link_mode: Some("symlink".to_string()),
            capability_ttl_days: Some(7),
        };
        let env = env_from(&[
            ("TMPLSYNC_SOURCE", src.path().to_str().unwrap()),
            ("TMPLSYNC_LINK_MODE", "copy"),
            ("TMPLSYNC_STATE_DIR", "/env/state"),
        ]);
        let settings = Settings::resolve_with(&SettingsOverrides::default(), file, env).unwrap();
        assert_eq!(settings.source_root, src.path());
        assert_eq!(settings.cache_root, PathBuf::from("/file/cache"));
        assert_eq!(settings.state_dir, PathBuf::from("/env/state"));
        assert_eq!(settings.link_mode, LinkMode::Copy);
        assert_eq!(settings.capability_ttl_days, 7);
    }

    #[test]
    fn invalid_env_link_mode_is_error() {
        let src = tempfile::tempdir().unwrap();
        let overrides = SettingsOverrides {
            source: Some(src.path().to_path_buf()),
            ..SettingsOverrides::default()
        };
        let env = env_from(&[("TMPLSYNC_LINK_MODE", "weird")]);
        let err = Settings::resolve_with(&overrides, SettingsFile::default(), env).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLinkMode(_)));
    }

    #[test]
    fn missing_source_directory_is_error() {
        let overrides = SettingsOverrides {
            source: Some(PathBuf::from("/definitely/not/a/template/dir")),
            ..SettingsOverrides::default()
        };
        let err = Settings::resolve_with(&overrides, SettingsFile::default(), env_from(&[]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::SourceNotFound(_)));
    }

    #[test]
    fn absolute_project_root_resolves_existing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root = absolute_project_root(dir.path());
        assert!(root.is_absolute());
        assert!(root.is_dir());
    }
}
