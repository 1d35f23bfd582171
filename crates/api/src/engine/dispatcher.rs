//! The single global batch worker.
//!
//! Polls for claimable jobs every `poll_interval` and drives each one to
//! completion, one registry call at a time, before claiming the next.
//! Claiming uses `SELECT FOR UPDATE SKIP LOCKED` via
//! [`JobRepo::claim_next`] so a second dispatcher instance can never
//! double-claim. Concurrency is deliberately 1 -- the registry's
//! per-minute ceiling is shared system-wide, so parallel workers would
//! only race each other for the same budget.

use std::sync::Arc;
use std::time::Duration;

use markbatch_cache::ResultCache;
use markbatch_core::filtering::FilterPolicy;
use markbatch_core::progress::FlushPolicy;
use markbatch_db::models::job::Job;
use markbatch_db::models::result::NewLookupResult;
use markbatch_db::models::status::{JobStatus, ResultStatus};
use markbatch_db::repositories::{JobRepo, ResultRepo};
use markbatch_db::DbPool;
use markbatch_events::bus::{EVENT_JOB_COMPLETED, EVENT_JOB_FAILED};
use markbatch_events::{EventBus, JobEvent};
use markbatch_registry::{LookupOutcome, RegistryClient, TrademarkRecord};
use tokio_util::sync::CancellationToken;

use super::progress::{ProgressLedger, ProgressTracker};

type DispatchError = Box<dyn std::error::Error + Send + Sync>;

/// The batch job dispatcher: a single long-lived Tokio task.
pub struct Dispatcher {
    pool: DbPool,
    registry: Arc<RegistryClient>,
    cache: Arc<ResultCache>,
    event_bus: Arc<EventBus>,
    ledger: Arc<ProgressLedger>,
    filter: FilterPolicy,
    flush: FlushPolicy,
    poll_interval: Duration,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: DbPool,
        registry: Arc<RegistryClient>,
        cache: Arc<ResultCache>,
        event_bus: Arc<EventBus>,
        ledger: Arc<ProgressLedger>,
        filter: FilterPolicy,
        flush: FlushPolicy,
        poll_interval: Duration,
    ) -> Self {
        Self {
            pool,
            registry,
            cache,
            event_bus,
            ledger,
            filter,
            flush,
            poll_interval,
        }
    }

    /// Run the dispatcher loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            rate_per_minute = self.registry.requests_per_minute(),
            "Dispatcher started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.drain_queue(&cancel).await;
                }
            }
        }
    }

    /// Claim and process jobs until the queue is empty or shutdown.
    async fn drain_queue(&self, cancel: &CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }

            let claimed = match JobRepo::claim_next(&self.pool).await {
                Ok(claimed) => claimed,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim next job");
                    return;
                }
            };

            let Some(job) = claimed else {
                return;
            };

            tracing::info!(
                job_id = job.id,
                total = job.total_count,
                requeue_count = job.requeue_count,
                "Job claimed",
            );

            if let Err(e) = self.process_job(&job, cancel).await {
                // Worker-level failure: the whole job fails.
                tracing::error!(job_id = job.id, error = %e, "Job processing failed");
                match JobRepo::fail(&self.pool, job.id, &format!("worker error: {e}")).await {
                    Ok(true) => self.announce(&job, EVENT_JOB_FAILED, "Batch processing failed"),
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!(job_id = job.id, error = %e, "Failed to mark job failed");
                    }
                }
                self.ledger.remove(job.id).await;
                self.refresh_cache(job.id).await;
            }
        }
    }

    /// Drive one claimed job across all of its serial numbers.
    async fn process_job(&self, job: &Job, cancel: &CancellationToken) -> Result<(), DispatchError> {
        // Resume point: count persisted results, not the throttled
        // processed_count column -- after a crash they can differ.
        let resume = ResultRepo::count_for_job(&self.pool, job.id).await? as i32;
        let stats = ResultRepo::filtering_stats(&self.pool, job.id).await?;

        if resume > 0 {
            tracing::info!(job_id = job.id, resume, "Resuming partially processed job");
        }

        let mut tracker = ProgressTracker::begin(
            Arc::clone(&self.ledger),
            self.flush,
            job.id,
            job.total_count,
            resume,
            stats,
        )
        .await;

        // Claiming was a major transition; mirror it to the cache.
        self.refresh_cache(job.id).await;

        for (position, serial) in job.serial_numbers.iter().enumerate().skip(resume as usize) {
            if cancel.is_cancelled() {
                tracing::info!(job_id = job.id, "Shutdown during job, suspending");
                self.suspend(job.id, tracker).await;
                return Ok(());
            }

            // Cooperative cancel: re-read status between identifiers.
            let current = JobRepo::find_by_id(&self.pool, job.id).await?;
            match current {
                Some(row) if row.status_id == JobStatus::Processing.id() => {}
                _ => {
                    tracing::info!(job_id = job.id, "Job no longer processing, stopping batch");
                    tracker.finish().await;
                    return Ok(());
                }
            }

            // Liveness independent of the throttled progress flushes.
            JobRepo::heartbeat(&self.pool, job.id).await?;

            let result = self.lookup(serial, position as i32).await;
            let retained_fetch = match ResultStatus::from_id(result.status_id) {
                Some(ResultStatus::Success) => Some(true),
                Some(ResultStatus::Filtered) => Some(false),
                _ => None,
            };

            let inserted = ResultRepo::insert(&self.pool, job.id, &result).await?;
            if !inserted {
                tracing::debug!(
                    job_id = job.id,
                    position,
                    "Result already persisted by a previous execution",
                );
            }

            tracker.record(&self.pool, &self.cache, retained_fetch).await;
        }

        let (processed, stats) = tracker.snapshot();
        let completed = JobRepo::complete(&self.pool, job.id, processed, &stats).await?;
        tracker.finish().await;

        if completed {
            tracing::info!(
                job_id = job.id,
                processed,
                retained = stats.retained,
                excluded = stats.excluded,
                "Job completed",
            );
            self.announce(job, EVENT_JOB_COMPLETED, "Batch lookup completed");
        } else {
            // Another execution (crash-and-requeue race) finalized first.
            tracing::info!(job_id = job.id, "Job already finalized, skipping");
        }

        self.refresh_cache(job.id).await;
        Ok(())
    }

    /// Park a half-done job for the next dispatcher run.
    ///
    /// Flushes progress durably, drops the live ledger entry and clears
    /// the claim without a requeue penalty, so a restarted worker can
    /// re-claim immediately instead of waiting out the stall window.
    async fn suspend(&self, job_id: markbatch_core::types::DbId, mut tracker: ProgressTracker) {
        tracker.flush_now(&self.pool, &self.cache).await;
        tracker.finish().await;
        match JobRepo::release_claim(&self.pool, job_id).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(job_id, "Job already finalized, nothing to release"),
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to release claim on shutdown");
            }
        }
        self.refresh_cache(job_id).await;
    }

    /// One classified lookup, mapped to an insertable result row.
    async fn lookup(&self, serial: &str, position: i32) -> NewLookupResult {
        match self.registry.fetch(serial).await {
            Ok(LookupOutcome::Found(record)) => {
                let status = if self.filter.excludes(record.is_represented) {
                    ResultStatus::Filtered
                } else {
                    ResultStatus::Success
                };
                result_from_record(position, serial, status, record)
            }
            Ok(LookupOutcome::NotFound) => empty_result(position, serial, ResultStatus::NotFound, None),
            Err(e) => {
                tracing::warn!(serial, error = %e, "Lookup failed");
                empty_result(position, serial, ResultStatus::Error, Some(e.to_string()))
            }
        }
    }

    /// Notify the submitter about a terminal transition, if known.
    fn announce(&self, job: &Job, event_type: &str, message: &str) {
        if let Some(recipient) = job.submitted_by {
            self.event_bus
                .publish(JobEvent::new(event_type, job.id, recipient, message));
        }
    }

    async fn refresh_cache(&self, job_id: markbatch_core::types::DbId) {
        if let Err(e) = self.cache.resync(&self.pool, job_id).await {
            tracing::warn!(job_id, error = %e, "Cache resync failed");
        }
    }
}

fn result_from_record(
    position: i32,
    serial: &str,
    status: ResultStatus,
    record: TrademarkRecord,
) -> NewLookupResult {
    NewLookupResult {
        position,
        serial_number: serial.to_string(),
        status_id: status.id(),
        owner_name: record.owner_name,
        mark_text: record.mark_text,
        filing_date: record.filing_date,
        registration_number: record.registration_number,
        mark_status: record.mark_status,
        attorney_name: record.attorney_name,
        error_message: None,
    }
}

fn empty_result(
    position: i32,
    serial: &str,
    status: ResultStatus,
    error_message: Option<String>,
) -> NewLookupResult {
    NewLookupResult {
        position,
        serial_number: serial.to_string(),
        status_id: status.id(),
        owner_name: None,
        mark_text: None,
        filing_date: None,
        registration_number: None,
        mark_status: None,
        attorney_name: None,
        error_message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn found_record_maps_to_success_or_filtered() {
        let record = TrademarkRecord {
            serial_number: "88000001".into(),
            owner_name: Some("Acme".into()),
            is_represented: true,
            ..Default::default()
        };

        let filtered = result_from_record(0, "88000001", ResultStatus::Filtered, record.clone());
        assert_eq!(filtered.status_id, ResultStatus::Filtered.id());
        assert_eq!(filtered.owner_name.as_deref(), Some("Acme"));

        let kept = result_from_record(1, "88000001", ResultStatus::Success, record);
        assert_eq!(kept.status_id, ResultStatus::Success.id());
        assert_eq!(kept.position, 1);
    }

    #[test]
    fn error_outcome_carries_message() {
        let row = empty_result(2, "88000002", ResultStatus::Error, Some("timed out".into()));
        assert_eq!(row.status_id, ResultStatus::Error.id());
        assert_eq!(row.error_message.as_deref(), Some("timed out"));
        assert!(row.owner_name.is_none());
    }

    #[tokio::test]
    async fn suspend_clears_live_progress_even_when_store_is_down() {
        use markbatch_core::filtering::FilteringStats;
        use markbatch_registry::RegistryConfig;

        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://127.0.0.1:1/unused")
            .expect("lazy pool");
        let ledger = Arc::new(ProgressLedger::new());
        let dispatcher = Dispatcher::new(
            pool,
            Arc::new(
                RegistryClient::new(RegistryConfig {
                    base_url: "http://127.0.0.1:1".into(),
                    api_key: None,
                    requests_per_minute: 60,
                    timeout: Duration::from_secs(1),
                })
                .expect("client"),
            ),
            Arc::new(ResultCache::new(
                4,
                Duration::from_secs(1),
                Duration::from_secs(60),
            )),
            Arc::new(EventBus::default()),
            Arc::clone(&ledger),
            FilterPolicy::default(),
            FlushPolicy::default(),
            Duration::from_secs(1),
        );

        let tracker = ProgressTracker::begin(
            Arc::clone(&ledger),
            FlushPolicy::default(),
            3,
            10,
            6,
            FilteringStats::default(),
        )
        .await;
        assert!(ledger.get(3).await.is_some());

        // Store writes fail (nothing listens on the pool's address);
        // suspend must still tear down the live entry without panicking.
        dispatcher.suspend(3, tracker).await;
        assert!(ledger.get(3).await.is_none());
    }
}
