use crate::services::storage::StagingStore;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Periodically deletes staged files older than the retention window.
///
/// Only runs when a retention policy is configured; without one, outputs stay
/// in the staging store until removed by hand.
pub struct RetentionSweeper {
    storage: Arc<dyn StagingStore>,
    retention: ChronoDuration,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl RetentionSweeper {
    pub fn new(
        storage: Arc<dyn StagingStore>,
        retention_hours: u64,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let retention = i64::try_from(retention_hours)
            .ok()
            .and_then(ChronoDuration::try_hours)
            .unwrap_or(ChronoDuration::MAX);
        Self {
            storage,
            retention,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            "🚀 Retention sweeper started (retention={}h, interval={:?})",
            self.retention.num_hours(),
            self.interval
        );

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Retention sweeper shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.sweep().await;
                }
            }
        }
    }

    /// Runs one pass and returns the number of deleted entries
    pub async fn sweep(&self) -> usize {
        tracing::info!("🧹 Sweeping staging store...");

        let names = match self.storage.list("").await {
            Ok(names) => names,
            Err(e) => {
                tracing::error!("Failed to list staging store: {}", e);
                return 0;
            }
        };

        let Some(cutoff) = Utc::now().checked_sub_signed(self.retention) else {
            return 0;
        };
        let mut removed = 0;

        for name in names {
            let modified = match self.storage.metadata(&name).await {
                Ok(meta) => meta.modified,
                Err(e) => {
                    tracing::debug!("Skipping {}: {}", name, e);
                    continue;
                }
            };

            if modified.is_some_and(|at| at < cutoff) {
                match self.storage.delete(&name).await {
                    Ok(()) => {
                        tracing::info!("Expired staged file: {}", name);
                        removed += 1;
                    }
                    Err(e) => tracing::error!("Failed to expire {}: {}", name, e),
                }
            }
        }

        tracing::info!("✅ Sweep completed, {} file(s) removed", removed);
        removed
    }
}
