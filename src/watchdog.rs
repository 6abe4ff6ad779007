//! Development-only file-change watchdog.
//!
//! Polls the files matching a glob pattern and resolves as soon as any of
//! them is added, removed or modified. The binary uses this to shut the
//! server down so a supervisor (or a `cargo watch` loop) can restart it.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use crate::error::Error;
use crate::Result;

/// Shortest accepted poll interval.
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Observed state of the watched files: path and modification time.
pub type Fingerprint = Vec<(PathBuf, Option<SystemTime>)>;

/// Polls a set of files for changes.
#[derive(Debug, Clone)]
pub struct Watchdog {
    pattern: String,
    interval: Duration,
}

impl Watchdog {
    /// Watch files matching `pattern`, checking every `interval`.
    ///
    /// Intervals shorter than [`MIN_INTERVAL`] are raised to it.
    pub fn new(pattern: impl Into<String>, interval: Duration) -> Self {
        Self {
            pattern: pattern.into(),
            interval: interval.max(MIN_INTERVAL),
        }
    }

    /// Poll interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Glob pattern being watched.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Scan the watched files once.
    pub fn fingerprint(&self) -> Result<Fingerprint> {
        let paths = glob::glob(&self.pattern)
            .map_err(|e| Error::InvalidPattern(format!("{}: {e}", self.pattern)))?;

        let mut fingerprint: Fingerprint = paths
            .filter_map(|entry| entry.ok())
            .map(|path| {
                let mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
                (path, mtime)
            })
            .collect();
        fingerprint.sort();
        Ok(fingerprint)
    }

    /// Resolve once the watched files differ from their state at the first scan.
    pub async fn changed(&self) -> Result<()> {
        let baseline = self.fingerprint()?;
        tracing::info!(pattern = %self.pattern, files = baseline.len(), "watching for changes");

        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            if self.fingerprint()? != baseline {
                tracing::warn!(pattern = %self.pattern, "some watched file changed, shutting down");
                return Ok(());
            }
        }
    }
}
