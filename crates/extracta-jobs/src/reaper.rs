//! Periodic removal of stale jobs and their files.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::broadcaster::ProgressBroadcaster;
use crate::config::ReaperConfig;
use crate::registry::JobRegistry;

/// Sweeps the registry for jobs idle longer than the TTL.
pub struct Reaper {
    registry: Arc<JobRegistry>,
    broadcaster: ProgressBroadcaster,
    config: ReaperConfig,
}

impl Reaper {
    pub fn new(
        registry: Arc<JobRegistry>,
        broadcaster: ProgressBroadcaster,
        config: ReaperConfig,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            config,
        }
    }

    /// Remove every job with `now - updated_at >= ttl`, end its observers'
    /// streams and delete its files.
    ///
    /// File errors are ignored. Returns the number of jobs removed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let Ok(ttl) = chrono::Duration::from_std(self.config.ttl) else {
            return 0;
        };
        let removed = self.registry.remove_stale(now - ttl);

        for job in &removed {
            self.broadcaster.close(job.id);
            for path in job.file_paths() {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    debug!(job_id = %job.id, path = %path.display(), error = %e, "Could not remove file");
                }
            }
        }

        if !removed.is_empty() {
            info!(count = removed.len(), "Reaped stale jobs");
        }
        removed.len()
    }

    /// Run sweeps every `interval` until `shutdown` is cancelled.
    ///
    /// Returns `None` without spawning when the reaper is disabled.
    pub fn spawn(self, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        if !self.config.is_enabled() {
            info!("Reaper disabled");
            return None;
        }

        Some(tokio::spawn(async move {
            info!(
                interval_secs = self.config.interval.as_secs(),
                ttl_secs = self.config.ttl.as_secs(),
                "Reaper started"
            );
            let start = tokio::time::Instant::now() + self.config.interval;
            let mut ticker = tokio::time::interval_at(start, self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        self.sweep(Utc::now()).await;
                    }
                }
            }
            info!("Reaper stopped");
        }))
    }
}
