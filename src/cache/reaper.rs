//! Time-based expiry of derived artifacts
//!
//! Every produced artifact is deleted a fixed time after creation,
//! regardless of how often it is read. Timers cannot be cancelled; a
//! request that finds the file before the timer fires simply reuses it.

use crate::error::{MapmergeError, MapmergeResult};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Schedules deletion of artifacts after their lifetime
#[derive(Debug, Clone)]
pub struct Reaper {
    purpose: &'static str,
}

/// What a startup sweep did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries already past their lifetime and deleted
    pub removed: usize,
    /// Entries still alive and scheduled for deletion
    pub scheduled: usize,
    /// Entries not produced here, left untouched
    pub skipped: usize,
}

impl Reaper {
    /// Create a reaper; `purpose` names the artifacts in log output
    pub fn new(purpose: &'static str) -> Self {
        Self { purpose }
    }

    /// Delete `path` once `lifetime` has elapsed
    ///
    /// Fire-and-forget: the returned handle may be dropped. A failed
    /// deletion is logged and not retried.
    pub fn schedule_expiry(&self, path: PathBuf, lifetime: Duration) -> JoinHandle<()> {
        let purpose = self.purpose;
        debug!("Expiring {} '{}' in {:?}", purpose, path.display(), lifetime);

        tokio::spawn(async move {
            tokio::time::sleep(lifetime).await;
            match remove_entry(&path).await {
                Ok(()) => debug!("Expired {} '{}'", purpose, path.display()),
                Err(e) => warn!(
                    "Failed to delete {} '{}' after lifetime: {}",
                    purpose,
                    path.display(),
                    e
                ),
            }
        })
    }

    /// Re-arm expiry for artifacts left behind by an earlier process
    ///
    /// Timers live in memory only, so anything produced before a restart
    /// would otherwise stay on disk forever. Entries older than `lifetime`
    /// (by modification time) are deleted now; the rest are scheduled for
    /// the time they have left. Only entries whose name satisfies `owned`
    /// are touched.
    pub async fn sweep<P>(&self, dir: &Path, lifetime: Duration, owned: P) -> MapmergeResult<SweepReport>
    where
        P: Fn(&str) -> bool,
    {
        let mut report = SweepReport::default();

        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
            Err(e) => {
                return Err(MapmergeError::io(
                    format!("reading artifact directory {}", dir.display()),
                    e,
                ))
            }
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| MapmergeError::io("reading artifact entry", e))?
        {
            let path = entry.path();
            let is_owned = entry.file_name().to_str().is_some_and(|name| owned(name));
            if !is_owned {
                debug!("Sweep leaves foreign entry '{}' alone", path.display());
                report.skipped += 1;
                continue;
            }

            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => DateTime::<Utc>::from(modified),
                Err(e) => {
                    warn!("Skipping '{}' during sweep: {}", path.display(), e);
                    continue;
                }
            };

            let remaining = remaining_lifetime(modified, lifetime);
            if remaining.is_zero() {
                match remove_entry(&path).await {
                    Ok(()) => report.removed += 1,
                    Err(e) => warn!("Failed to delete stale {} '{}': {}", self.purpose, path.display(), e),
                }
            } else {
                self.schedule_expiry(path, remaining);
                report.scheduled += 1;
            }
        }

        info!(
            "Swept {}: {} removed, {} scheduled, {} foreign entries skipped",
            dir.display(),
            report.removed,
            report.scheduled,
            report.skipped
        );
        Ok(report)
    }
}

/// Time left before an artifact created at `created` expires
pub fn remaining_lifetime(created: DateTime<Utc>, lifetime: Duration) -> Duration {
    let age = (Utc::now() - created).to_std().unwrap_or(Duration::ZERO);
    lifetime.saturating_sub(age)
}

async fn remove_entry(path: &Path) -> std::io::Result<()> {
    if fs::symlink_metadata(path).await?.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    }
}
