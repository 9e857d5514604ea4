// Best-effort configuration file watcher
//
// Polls the file's modification time after the user opens it in an editor.
// The first change wins; after the time limit the watcher quietly stops.

use camino::{Utf8Path, Utf8PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

/// Polls a file's modification time for a bounded duration
#[derive(Debug, Clone)]
pub struct ConfigWatcher {
    path: Utf8PathBuf,
    interval: Duration,
    limit: Duration,
}

impl ConfigWatcher {
    pub fn new<P: AsRef<Utf8Path>>(path: P, interval: Duration, limit: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            interval,
            limit,
        }
    }

    /// Wait for the file to change.
    ///
    /// The baseline is the modification time when this is called; a file that
    /// did not exist and then appears also counts as a change.
    ///
    /// # Returns
    /// - `Some(mtime)` on the first observed change
    /// - `None` when the time limit passes or `shutdown` flips to `true`
    pub async fn wait_for_change(&self, mut shutdown: watch::Receiver<bool>) -> Option<SystemTime> {
        let baseline = Self::modified(&self.path).await;
        let deadline = Instant::now() + self.limit;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        tracing::debug!(
            "Watching {} every {:?} for up to {:?}",
            self.path,
            self.interval,
            self.limit
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(current) = Self::modified(&self.path).await {
                        let changed = match baseline {
                            Some(previous) => current > previous,
                            None => true,
                        };
                        if changed {
                            tracing::info!("Configuration file changed: {}", self.path);
                            return Some(current);
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::info!("Stopped monitoring configuration file (timeout)");
                    return None;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!("Configuration watcher cancelled");
                        return None;
                    }
                }
            }
        }
    }

    async fn modified(path: &Utf8Path) -> Option<SystemTime> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => meta.modified().ok(),
            Err(_) => None,
        }
    }
}
