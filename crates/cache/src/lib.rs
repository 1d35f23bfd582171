//! TTL-bounded mirror of job state for the polling read path.
//!
//! The job store is authoritative; this cache is a cache-aside
//! accelerator so that status polls do not hit the database on every
//! call. Entries for active jobs carry a short TTL (forcing a periodic
//! resync with the store), entries for terminal jobs a long one (their
//! rows are immutable apart from removal). [`ResultCache::resync`]
//! forces an authoritative re-read, used to repair drift after partial
//! failures such as a worker crash between the store and cache writes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use markbatch_core::types::DbId;
use markbatch_db::models::job::Job;
use markbatch_db::models::result::LookupResult;
use markbatch_db::models::status::JobStatus;
use markbatch_db::repositories::{JobRepo, ResultRepo};
use markbatch_db::DbPool;
use moka::sync::Cache;
use moka::Expiry;

/// One cached view of a job: the row plus its ordered results.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub job: Job,
    pub results: Vec<LookupResult>,
}

impl JobSnapshot {
    /// Terminal snapshots never change again, so they may live long.
    fn is_terminal(&self) -> bool {
        JobStatus::from_id(self.job.status_id).is_some_and(JobStatus::is_terminal)
    }
}

/// Per-entry TTL: short for active jobs, long for terminal ones.
struct SnapshotExpiry {
    active_ttl: Duration,
    terminal_ttl: Duration,
}

impl SnapshotExpiry {
    fn ttl_for(&self, snapshot: &JobSnapshot) -> Duration {
        if snapshot.is_terminal() {
            self.terminal_ttl
        } else {
            self.active_ttl
        }
    }
}

impl Expiry<DbId, Arc<JobSnapshot>> for SnapshotExpiry {
    fn expire_after_create(
        &self,
        _key: &DbId,
        value: &Arc<JobSnapshot>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(self.ttl_for(value))
    }

    fn expire_after_update(
        &self,
        _key: &DbId,
        value: &Arc<JobSnapshot>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(self.ttl_for(value))
    }
}

/// Bounded TTL cache of [`JobSnapshot`]s keyed by job id.
pub struct ResultCache {
    cache: Cache<DbId, Arc<JobSnapshot>>,
}

impl ResultCache {
    pub fn new(max_capacity: u64, active_ttl: Duration, terminal_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(SnapshotExpiry {
                active_ttl,
                terminal_ttl,
            })
            .build();
        Self { cache }
    }

    pub fn get(&self, job_id: DbId) -> Option<Arc<JobSnapshot>> {
        self.cache.get(&job_id)
    }

    pub fn insert(&self, snapshot: JobSnapshot) -> Arc<JobSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.cache.insert(snapshot.job.id, Arc::clone(&snapshot));
        snapshot
    }

    pub fn invalidate(&self, job_id: DbId) {
        self.cache.invalidate(&job_id);
    }

    /// Authoritative re-read from the job store into the cache.
    ///
    /// Returns `None` (and drops any stale entry) when the job no longer
    /// exists in the store.
    pub async fn resync(
        &self,
        pool: &DbPool,
        job_id: DbId,
    ) -> Result<Option<Arc<JobSnapshot>>, sqlx::Error> {
        let Some(job) = JobRepo::find_by_id(pool, job_id).await? else {
            self.cache.invalidate(&job_id);
            return Ok(None);
        };
        let results = ResultRepo::list_for_job(pool, job_id).await?;

        tracing::debug!(job_id, results = results.len(), "Resynced job snapshot from store");
        Ok(Some(self.insert(JobSnapshot { job, results })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use markbatch_db::models::status::WorkflowStatus;

    fn snapshot(id: DbId, status: JobStatus) -> JobSnapshot {
        let now = chrono::Utc::now();
        JobSnapshot {
            job: Job {
                id,
                status_id: status.id(),
                submitted_by: None,
                serial_numbers: vec!["88000001".into()],
                total_count: 1,
                processed_count: 0,
                fetched_count: 0,
                retained_count: 0,
                excluded_count: 0,
                error_message: None,
                retry_of_job_id: None,
                claimed_at: None,
                heartbeat_at: None,
                requeue_count: 0,
                assignee_id: None,
                workflow_status_id: WorkflowStatus::Unassigned.id(),
                assigned_at: None,
                downloaded_at: None,
                work_started_at: None,
                finished_at: None,
                created_at: now,
                completed_at: None,
                updated_at: now,
            },
            results: Vec::new(),
        }
    }

    #[test]
    fn insert_then_get_returns_snapshot() {
        let cache = ResultCache::new(16, Duration::from_secs(10), Duration::from_secs(60));
        cache.insert(snapshot(1, JobStatus::Pending));

        let hit = cache.get(1).expect("entry should be cached");
        assert_eq!(hit.job.id, 1);
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn invalidate_drops_entry() {
        let cache = ResultCache::new(16, Duration::from_secs(10), Duration::from_secs(60));
        cache.insert(snapshot(1, JobStatus::Completed));
        cache.invalidate(1);
        assert!(cache.get(1).is_none());
    }

    #[test]
    fn ttl_class_follows_terminal_status() {
        let expiry = SnapshotExpiry {
            active_ttl: Duration::from_secs(5),
            terminal_ttl: Duration::from_secs(3600),
        };

        for (status, expected) in [
            (JobStatus::Pending, Duration::from_secs(5)),
            (JobStatus::Processing, Duration::from_secs(5)),
            (JobStatus::Completed, Duration::from_secs(3600)),
            (JobStatus::Failed, Duration::from_secs(3600)),
        ] {
            let value = Arc::new(snapshot(1, status));
            assert_eq!(
                expiry.expire_after_create(&1, &value, Instant::now()),
                Some(expected),
                "wrong TTL class for {status:?}",
            );
        }
    }

    #[test]
    fn reinsert_replaces_snapshot() {
        let cache = ResultCache::new(16, Duration::from_secs(10), Duration::from_secs(60));
        cache.insert(snapshot(1, JobStatus::Pending));

        let mut updated = snapshot(1, JobStatus::Processing);
        updated.job.processed_count = 3;
        cache.insert(updated);

        let hit = cache.get(1).expect("entry should be cached");
        assert_eq!(hit.job.status_id, JobStatus::Processing.id());
        assert_eq!(hit.job.processed_count, 3);
    }
}
