//! Stalled-job recovery.
//!
//! A job whose worker died keeps `claimed_at` set but stops refreshing
//! `heartbeat_at`. This monitor periodically releases such claims so the
//! dispatcher can pick the job up again, and fails jobs that have been
//! requeued too many times.

use std::sync::Arc;
use std::time::Duration;

use markbatch_cache::ResultCache;
use markbatch_db::repositories::JobRepo;
use markbatch_db::DbPool;
use markbatch_events::bus::EVENT_JOB_FAILED;
use markbatch_events::{EventBus, JobEvent};
use tokio_util::sync::CancellationToken;

pub struct StallMonitor {
    pool: DbPool,
    cache: Arc<ResultCache>,
    event_bus: Arc<EventBus>,
    poll_interval: Duration,
    stall_window: Duration,
    max_requeues: i16,
}

impl StallMonitor {
    pub fn new(
        pool: DbPool,
        cache: Arc<ResultCache>,
        event_bus: Arc<EventBus>,
        poll_interval: Duration,
        stall_window: Duration,
        max_requeues: i16,
    ) -> Self {
        Self {
            pool,
            cache,
            event_bus,
            poll_interval,
            stall_window,
            max_requeues,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        tracing::info!(
            stall_window_secs = self.stall_window.as_secs(),
            max_requeues = self.max_requeues,
            "Stall monitor started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Stall monitor shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }
    }

    /// One recovery pass: requeue stalled claims, fail exhausted jobs.
    async fn sweep(&self) {
        let cutoff = chrono::Utc::now()
            - chrono::Duration::from_std(self.stall_window).unwrap_or(chrono::Duration::zero());

        match JobRepo::fail_exhausted(&self.pool, cutoff, self.max_requeues).await {
            Ok(failed) => {
                for job_id in failed {
                    tracing::warn!(job_id, "Job exceeded requeue limit, marked failed");
                    self.notify_failed(job_id).await;
                    self.refresh_cache(job_id).await;
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to sweep exhausted jobs"),
        }

        match JobRepo::release_stalled(&self.pool, cutoff, self.max_requeues).await {
            Ok(released) => {
                for job_id in released {
                    tracing::warn!(job_id, "Stalled claim released, job requeued");
                    self.refresh_cache(job_id).await;
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to sweep stalled jobs"),
        }
    }

    async fn notify_failed(&self, job_id: markbatch_core::types::DbId) {
        match JobRepo::find_by_id(&self.pool, job_id).await {
            Ok(Some(job)) => {
                if let Some(recipient) = job.submitted_by {
                    self.event_bus.publish(JobEvent::new(
                        EVENT_JOB_FAILED,
                        job_id,
                        recipient,
                        "Batch lookup failed after repeated worker stalls",
                    ));
                }
            }
            Ok(None) => {}
            Err(e) => tracing::error!(job_id, error = %e, "Failed to load job for notification"),
        }
    }

    async fn refresh_cache(&self, job_id: markbatch_core::types::DbId) {
        if let Err(e) = self.cache.resync(&self.pool, job_id).await {
            tracing::warn!(job_id, error = %e, "Cache resync failed");
        }
    }
}
