//! Repository for the `jobs` table.
//!
//! Uses `JobStatus` from `models::status` for every status literal and
//! guarded `UPDATE ... WHERE status_id = ...` statements so that racing
//! writers (a requeued worker vs. the original, a cancel vs. the
//! finalizer) serialize at the database instead of in process.

use markbatch_core::filtering::FilteringStats;
use markbatch_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::job::{Job, JobListQuery};
use crate::models::status::JobStatus;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, status_id, submitted_by, serial_numbers, \
    total_count, processed_count, fetched_count, retained_count, excluded_count, \
    error_message, retry_of_job_id, claimed_at, heartbeat_at, requeue_count, \
    assignee_id, workflow_status_id, assigned_at, downloaded_at, \
    work_started_at, finished_at, \
    created_at, completed_at, updated_at";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Error message recorded when a job is cancelled by a client.
pub const CANCELLED_MESSAGE: &str = "cancelled";

/// Provides CRUD and state-transition operations for batch lookup jobs.
pub struct JobRepo;

impl JobRepo {
    /// Create a new pending job. Returns the inserted row.
    pub async fn submit(
        pool: &PgPool,
        serial_numbers: &[String],
        submitted_by: Option<DbId>,
    ) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (status_id, submitted_by, serial_numbers, total_count) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Pending.id())
            .bind(submitted_by)
            .bind(serial_numbers)
            .bind(serial_numbers.len() as i32)
            .fetch_one(pool)
            .await
    }

    /// Atomically claim the oldest claimable job for the worker.
    ///
    /// FIFO by `created_at`. Eligible rows are unclaimed jobs that are
    /// either pending or processing -- the latter are stalled jobs whose
    /// claim was released by the stall monitor. `FOR UPDATE SKIP LOCKED`
    /// prevents double-claim if more than one dispatcher is ever run.
    pub async fn claim_next(pool: &PgPool) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status_id = $1, claimed_at = NOW(), heartbeat_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM jobs \
                 WHERE claimed_at IS NULL AND status_id IN ($2, $1) \
                 ORDER BY created_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Processing.id())
            .bind(JobStatus::Pending.id())
            .fetch_optional(pool)
            .await
    }

    /// Record worker liveness for an in-flight job.
    pub async fn heartbeat(pool: &PgPool, job_id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE jobs SET heartbeat_at = NOW() WHERE id = $1 AND status_id = $2")
            .bind(job_id)
            .bind(JobStatus::Processing.id())
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Release the worker's claim without touching the requeue counter.
    ///
    /// Used when a worker stops mid-job on graceful shutdown: the job
    /// stays `processing` and becomes immediately claimable again, so a
    /// restart resumes it without waiting out the stall window. Returns
    /// `false` if the job is no longer processing.
    pub async fn release_claim(pool: &PgPool, job_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET claimed_at = NULL, updated_at = NOW() \
             WHERE id = $1 AND status_id = $2",
        )
        .bind(job_id)
        .bind(JobStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Push throttled progress counters to the durable store.
    ///
    /// Guarded on `processing` so a flush racing a cancel or a
    /// finalization never touches a terminal row.
    pub async fn update_progress(
        pool: &PgPool,
        job_id: DbId,
        processed_count: i32,
        stats: &FilteringStats,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs \
             SET processed_count = $2, fetched_count = $3, retained_count = $4, \
                 excluded_count = $5, heartbeat_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = $6",
        )
        .bind(job_id)
        .bind(processed_count)
        .bind(stats.fetched)
        .bind(stats.retained)
        .bind(stats.excluded)
        .bind(JobStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Finalize a job as completed.
    ///
    /// Idempotent: the guard on `processing` means that if another
    /// execution of the same job (after a crash and requeue) already
    /// finalized it, this is a no-op and returns `false`.
    pub async fn complete(
        pool: &PgPool,
        job_id: DbId,
        processed_count: i32,
        stats: &FilteringStats,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, processed_count = $3, fetched_count = $4, \
                 retained_count = $5, excluded_count = $6, \
                 completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = $7",
        )
        .bind(job_id)
        .bind(JobStatus::Completed.id())
        .bind(processed_count)
        .bind(stats.fetched)
        .bind(stats.retained)
        .bind(stats.excluded)
        .bind(JobStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Finalize a job as failed with an error message.
    ///
    /// Returns `false` if the job was already terminal.
    pub async fn fail(
        pool: &PgPool,
        job_id: DbId,
        error_message: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, error_message = $3, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id IN ($4, $5)",
        )
        .bind(job_id)
        .bind(JobStatus::Failed.id())
        .bind(error_message)
        .bind(JobStatus::Pending.id())
        .bind(JobStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Cancel a pending or processing job.
    ///
    /// There is no distinct cancelled status: the job becomes `failed`
    /// with [`CANCELLED_MESSAGE`]. The in-flight worker observes the
    /// status change between identifiers and stops. Returns `false` if
    /// the job was already terminal.
    pub async fn cancel(pool: &PgPool, job_id: DbId) -> Result<bool, sqlx::Error> {
        Self::fail(pool, job_id, CANCELLED_MESSAGE).await
    }

    /// Create a brand-new pending job from a failed job's serial list.
    ///
    /// The new job has `retry_of_job_id` pointing at the original; the
    /// original row is untouched. The caller verifies the original is
    /// actually failed before calling this.
    pub async fn retry(pool: &PgPool, original: &Job) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs \
                 (status_id, submitted_by, serial_numbers, total_count, retry_of_job_id) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Pending.id())
            .bind(original.submitted_by)
            .bind(&original.serial_numbers)
            .bind(original.total_count)
            .bind(original.id)
            .fetch_one(pool)
            .await
    }

    /// Permanently delete a terminal job (results cascade).
    ///
    /// Returns `false` if the job is still pending/processing or unknown.
    pub async fn remove(pool: &PgPool, job_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1 AND status_id IN ($2, $3)")
            .bind(job_id)
            .bind(JobStatus::Completed.id())
            .bind(JobStatus::Failed.id())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Release stalled jobs for re-claim.
    ///
    /// A processing job whose heartbeat is older than `cutoff` and that
    /// has been requeued fewer than `max_requeues` times gets its claim
    /// cleared (status stays `processing`, so polling clients never see
    /// a regression) and its requeue counter bumped. Returns the ids of
    /// released jobs.
    pub async fn release_stalled(
        pool: &PgPool,
        cutoff: Timestamp,
        max_requeues: i16,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "UPDATE jobs \
             SET claimed_at = NULL, requeue_count = requeue_count + 1, updated_at = NOW() \
             WHERE status_id = $1 AND claimed_at IS NOT NULL \
               AND heartbeat_at < $2 AND requeue_count < $3 \
             RETURNING id",
        )
        .bind(JobStatus::Processing.id())
        .bind(cutoff)
        .bind(max_requeues)
        .fetch_all(pool)
        .await
    }

    /// Fail stalled jobs that exhausted their requeue budget.
    pub async fn fail_exhausted(
        pool: &PgPool,
        cutoff: Timestamp,
        max_requeues: i16,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "UPDATE jobs \
             SET status_id = $1, error_message = $2, completed_at = NOW(), updated_at = NOW() \
             WHERE status_id = $3 AND claimed_at IS NOT NULL \
               AND heartbeat_at < $4 AND requeue_count >= $5 \
             RETURNING id",
        )
        .bind(JobStatus::Failed.id())
        .bind("stalled: no worker heartbeat within the allowed window")
        .bind(JobStatus::Processing.id())
        .bind(cutoff)
        .bind(max_requeues)
        .fetch_all(pool)
        .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List jobs, newest first, with optional status filter and pagination.
    pub async fn list(pool: &PgPool, params: &JobListQuery) -> Result<Vec<Job>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = params.offset.unwrap_or(0);

        if let Some(status_id) = params.status_id {
            let query = format!(
                "SELECT {COLUMNS} FROM jobs \
                 WHERE status_id = $1 \
                 ORDER BY created_at DESC \
                 LIMIT $2 OFFSET $3"
            );
            sqlx::query_as::<_, Job>(&query)
                .bind(status_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await
        } else {
            let query = format!(
                "SELECT {COLUMNS} FROM jobs \
                 ORDER BY created_at DESC \
                 LIMIT $1 OFFSET $2"
            );
            sqlx::query_as::<_, Job>(&query)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await
        }
    }
}
