//! Per-job progress tracking between the worker and the read path.
//!
//! [`ProgressLedger`] holds live in-memory counts so that status polls
//! are always current; [`ProgressTracker`] throttles the durable
//! store/cache writes behind it using [`FlushPolicy`], bounding write
//! amplification on large batches.

use std::collections::HashMap;
use std::sync::Arc;

use markbatch_cache::ResultCache;
use markbatch_core::filtering::FilteringStats;
use markbatch_core::progress::FlushPolicy;
use markbatch_core::types::DbId;
use markbatch_db::repositories::JobRepo;
use markbatch_db::DbPool;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Live counts for one in-flight job.
#[derive(Debug, Clone, Copy)]
pub struct LiveProgress {
    pub processed: i32,
    pub total: i32,
}

/// In-memory progress map shared between the dispatcher and handlers.
#[derive(Default)]
pub struct ProgressLedger {
    inner: RwLock<HashMap<DbId, LiveProgress>>,
}

impl ProgressLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, job_id: DbId, processed: i32, total: i32) {
        self.inner
            .write()
            .await
            .insert(job_id, LiveProgress { processed, total });
    }

    pub async fn get(&self, job_id: DbId) -> Option<LiveProgress> {
        self.inner.read().await.get(&job_id).copied()
    }

    pub async fn remove(&self, job_id: DbId) {
        self.inner.write().await.remove(&job_id);
    }
}

/// Buffers per-identifier completions for one job and flushes them to
/// the store and cache per the configured policy.
pub struct ProgressTracker {
    ledger: Arc<ProgressLedger>,
    policy: FlushPolicy,
    job_id: DbId,
    total: i32,
    processed: i32,
    stats: FilteringStats,
    last_flush: Instant,
}

impl ProgressTracker {
    /// Start tracking a claimed job, resuming from already-persisted
    /// counts after a requeue.
    pub async fn begin(
        ledger: Arc<ProgressLedger>,
        policy: FlushPolicy,
        job_id: DbId,
        total: i32,
        processed: i32,
        stats: FilteringStats,
    ) -> Self {
        ledger.set(job_id, processed, total).await;
        Self {
            ledger,
            policy,
            job_id,
            total,
            processed,
            stats,
            last_flush: Instant::now(),
        }
    }

    /// Record one completed item.
    ///
    /// `retained_fetch` is `Some(retained)` when the lookup fetched a
    /// record (retained or filtered), `None` for `not_found`/`error`
    /// outcomes. The in-memory ledger is updated unconditionally; the
    /// durable store and cache only on a flush decision.
    pub async fn record(
        &mut self,
        pool: &DbPool,
        cache: &ResultCache,
        retained_fetch: Option<bool>,
    ) {
        let prev = self.processed;
        self.processed += 1;
        if let Some(retained) = retained_fetch {
            self.stats.record_fetch(retained);
        }

        self.ledger.set(self.job_id, self.processed, self.total).await;

        let elapsed = self.last_flush.elapsed();
        if self
            .policy
            .should_flush(prev, self.processed, self.total, elapsed)
        {
            self.flush(pool, cache).await;
        }
    }

    /// Push buffered counts to the job store, then refresh the cache.
    ///
    /// A store write failure is logged and left for the next flush to
    /// retry -- the in-memory counts are not lost, and the cache is left
    /// untouched so it cannot get ahead of the store.
    async fn flush(&mut self, pool: &DbPool, cache: &ResultCache) {
        if let Err(e) =
            JobRepo::update_progress(pool, self.job_id, self.processed, &self.stats).await
        {
            tracing::error!(
                job_id = self.job_id,
                error = %e,
                "Failed to persist progress, will retry on next flush",
            );
            return;
        }
        self.last_flush = Instant::now();

        if let Err(e) = cache.resync(pool, self.job_id).await {
            tracing::warn!(job_id = self.job_id, error = %e, "Cache resync after flush failed");
        }
    }

    /// Flush immediately, bypassing the throttle policy.
    ///
    /// Used when a job is suspended mid-batch (worker shutdown) so the
    /// stored counts reflect everything that was actually processed
    /// before the live ledger entry goes away.
    pub async fn flush_now(&mut self, pool: &DbPool, cache: &ResultCache) {
        self.flush(pool, cache).await;
    }

    /// Current counts and stats, for finalization.
    pub fn snapshot(&self) -> (i32, FilteringStats) {
        (self.processed, self.stats)
    }

    /// Drop the live ledger entry once the job reaches a terminal state.
    pub async fn finish(self) {
        self.ledger.remove(self.job_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ledger_set_get_remove() {
        let ledger = ProgressLedger::new();
        assert!(ledger.get(1).await.is_none());

        ledger.set(1, 3, 10).await;
        let live = ledger.get(1).await.expect("entry should exist");
        assert_eq!(live.processed, 3);
        assert_eq!(live.total, 10);

        ledger.remove(1).await;
        assert!(ledger.get(1).await.is_none());
    }

    #[tokio::test]
    async fn ledger_overwrites_are_monotonic_per_writer() {
        let ledger = ProgressLedger::new();
        for n in 0..5 {
            ledger.set(9, n, 5).await;
            assert_eq!(ledger.get(9).await.unwrap().processed, n);
        }
    }

    #[tokio::test]
    async fn forced_flush_failure_keeps_live_counts() {
        let ledger = Arc::new(ProgressLedger::new());
        let mut tracker = ProgressTracker::begin(
            Arc::clone(&ledger),
            FlushPolicy::default(),
            7,
            10,
            4,
            FilteringStats::default(),
        )
        .await;

        // The pool never connects, so the store write fails; the live
        // entry must survive until finish.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://127.0.0.1:1/unused")
            .expect("lazy pool");
        let cache = ResultCache::new(
            4,
            std::time::Duration::from_secs(1),
            std::time::Duration::from_secs(60),
        );

        tracker.flush_now(&pool, &cache).await;
        assert_eq!(ledger.get(7).await.expect("entry survives").processed, 4);

        tracker.finish().await;
        assert!(ledger.get(7).await.is_none());
    }
}
