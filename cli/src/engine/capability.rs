//! Symlink capability prober with a persisted, time-limited result.
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::platform::Platform;
use crate::resources::helpers::fs as fs_helpers;

/// File name of the persisted capability record inside the state directory.
pub const CAPABILITY_FILE: &str = "capabilities.json";

/// Persisted result of a symlink probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRecord {
    /// Whether creating and reading through a symlink worked.
    pub symlink_capable: bool,
    /// When the probe ran.
    pub tested_at: DateTime<Utc>,
    /// Platform tag of the host that ran the probe.
    pub platform: String,
}

/// Answers "can this process create usable symlinks?".
///
/// The answer is memoized per prober and persisted to
/// `<state dir>/capabilities.json`; a persisted answer older than the TTL,
/// or recorded on another platform, is re-tested.
#[derive(Debug)]
pub struct CapabilityProber {
    record_path: PathBuf,
    ttl: Duration,
    platform: Platform,
    memo: Mutex<Option<bool>>,
    test: fn() -> bool,
}

impl CapabilityProber {
    /// Create a prober persisting into `state_dir`.
    #[must_use]
    pub fn new(state_dir: &Path, ttl_days: i64) -> Self {
        Self {
            record_path: state_dir.join(CAPABILITY_FILE),
            ttl: Duration::days(ttl_days),
            platform: Platform::detect(),
            memo: Mutex::new(None),
            test: test_symlink_support,
        }
    }

    /// Replace the probe procedure (tests).
    #[cfg(test)]
    #[must_use]
    pub fn with_test(mut self, test: fn() -> bool) -> Self {
        self.test = test;
        self
    }

    /// Path of the persisted record.
    #[must_use]
    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    /// Whether symlinks can be used, probing at most once per prober unless
    /// [`refresh`](Self::refresh) is called. An expired persisted answer is
    /// re-tested.
    pub fn probe(&self) -> bool {
        if let Some(capable) = self.memoized() {
            return capable;
        }
        match self.load_fresh() {
            Some(record) => {
                tracing::debug!(
                    target: "tmplsync::engine",
                    capable = record.symlink_capable,
                    "using persisted symlink capability"
                );
                self.remember(record.symlink_capable);
                record.symlink_capable
            }
            None => self.refresh(),
        }
    }

    /// Run the probe now, persist and memoize the result.
    pub fn refresh(&self) -> bool {
        let capable = (self.test)();
        tracing::debug!(target: "tmplsync::engine", capable, "probed symlink capability");
        if !capable && self.platform.is_windows() {
            tracing::info!(
                target: "tmplsync::engine",
                "symlinks need Developer Mode or elevation on Windows"
            );
        }
        self.persist(capable);
        self.remember(capable);
        capable
    }

    /// Memoized or fresh persisted answer, without probing or writing.
    #[must_use]
    pub fn peek(&self) -> Option<bool> {
        self.memoized()
            .or_else(|| self.load_fresh().map(|r| r.symlink_capable))
    }

    fn memoized(&self) -> Option<bool> {
        self.memo.lock().ok().and_then(|memo| *memo)
    }

    fn remember(&self, capable: bool) {
        if let Ok(mut memo) = self.memo.lock() {
            *memo = Some(capable);
        }
    }

    /// Load the persisted record; corrupt or unreadable records count as absent.
    fn load(&self) -> Option<CapabilityRecord> {
        let text = std::fs::read_to_string(&self.record_path).ok()?;
        serde_json::from_str(&text)
            .inspect_err(|e| {
                tracing::debug!(
                    target: "tmplsync::engine",
                    "ignoring corrupt capability record {}: {e}",
                    self.record_path.display()
                );
            })
            .ok()
    }

    fn load_fresh(&self) -> Option<CapabilityRecord> {
        self.load()
            .filter(|record| self.is_fresh(record, Utc::now()))
    }

    fn is_fresh(&self, record: &CapabilityRecord, now: DateTime<Utc>) -> bool {
        record.platform == self.platform.tag() && now - record.tested_at < self.ttl
    }

    fn persist(&self, capable: bool) {
        let record = CapabilityRecord {
            symlink_capable: capable,
            tested_at: Utc::now(),
            platform: self.platform.tag(),
        };
        let result = serde_json::to_vec_pretty(&record)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| fs_helpers::write_atomic(&self.record_path, &bytes));
        if let Err(e) = result {
            tracing::debug!(
                target: "tmplsync::engine",
                "could not persist capability record: {e:#}"
            );
        }
    }
}

/// Create a file and a symlink to it in a scratch directory, then read
/// through the link. Any failure means "not capable".
#[must_use]
pub fn test_symlink_support() -> bool {
    let attempt = || -> anyhow::Result<bool> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("probe-target");
        let link = dir.path().join("probe-link");
        std::fs::write(&target, b"tmplsync")?;
        fs_helpers::create_symlink(&target, &link)?;
        Ok(std::fs::read(&link)? == b"tmplsync")
    };
    attempt().unwrap_or_else(|e| {
        tracing::debug!(target: "tmplsync::engine", "symlink probe failed: {e:#}");
        false
    })
}
