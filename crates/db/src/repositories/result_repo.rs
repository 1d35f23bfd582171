//! Repository for the `lookup_results` table.

use markbatch_core::filtering::FilteringStats;
use markbatch_core::types::DbId;
use sqlx::PgPool;

use crate::models::result::{LookupResult, NewLookupResult};
use crate::models::status::ResultStatus;

/// Column list for `lookup_results` queries.
const COLUMNS: &str = "\
    id, job_id, position, serial_number, status_id, \
    owner_name, mark_text, filing_date, registration_number, \
    mark_status, attorney_name, error_message, created_at";

/// Provides operations for per-serial lookup results.
pub struct ResultRepo;

impl ResultRepo {
    /// Insert one result row.
    ///
    /// `ON CONFLICT DO NOTHING` on `(job_id, position)`: a requeued
    /// worker re-processing an already-persisted item must not
    /// duplicate it. Returns `true` if a row was actually inserted.
    pub async fn insert(
        pool: &PgPool,
        job_id: DbId,
        result: &NewLookupResult,
    ) -> Result<bool, sqlx::Error> {
        let outcome = sqlx::query(
            "INSERT INTO lookup_results \
                 (job_id, position, serial_number, status_id, owner_name, mark_text, \
                  filing_date, registration_number, mark_status, attorney_name, error_message) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (job_id, position) DO NOTHING",
        )
        .bind(job_id)
        .bind(result.position)
        .bind(&result.serial_number)
        .bind(result.status_id)
        .bind(&result.owner_name)
        .bind(&result.mark_text)
        .bind(result.filing_date)
        .bind(&result.registration_number)
        .bind(&result.mark_status)
        .bind(&result.attorney_name)
        .bind(&result.error_message)
        .execute(pool)
        .await?;
        Ok(outcome.rows_affected() > 0)
    }

    /// Number of persisted results for a job -- the worker's resume point
    /// after a crash/requeue, independent of the throttled
    /// `processed_count` column.
    pub async fn count_for_job(pool: &PgPool, job_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM lookup_results WHERE job_id = $1")
            .bind(job_id)
            .fetch_one(pool)
            .await
    }

    /// Recompute filtering stats from the persisted rows.
    ///
    /// On a crash/requeue the counters on the job row may lag the
    /// per-item result inserts, so a resuming worker rebuilds its stats
    /// from here rather than trusting the throttled columns.
    pub async fn filtering_stats(
        pool: &PgPool,
        job_id: DbId,
    ) -> Result<FilteringStats, sqlx::Error> {
        let (success, filtered): (i64, i64) = sqlx::query_as(
            "SELECT \
                 COUNT(*) FILTER (WHERE status_id = $2), \
                 COUNT(*) FILTER (WHERE status_id = $3) \
             FROM lookup_results WHERE job_id = $1",
        )
        .bind(job_id)
        .bind(ResultStatus::Success.id())
        .bind(ResultStatus::Filtered.id())
        .fetch_one(pool)
        .await?;

        Ok(FilteringStats {
            fetched: (success + filtered) as i32,
            retained: success as i32,
            excluded: filtered as i32,
        })
    }

    /// All results for a job in processing order.
    pub async fn list_for_job(
        pool: &PgPool,
        job_id: DbId,
    ) -> Result<Vec<LookupResult>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM lookup_results \
             WHERE job_id = $1 \
             ORDER BY position ASC"
        );
        sqlx::query_as::<_, LookupResult>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }

    /// Results for a job excluding filtered rows -- the client-facing list.
    pub async fn list_retained_for_job(
        pool: &PgPool,
        job_id: DbId,
    ) -> Result<Vec<LookupResult>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM lookup_results \
             WHERE job_id = $1 AND status_id <> $2 \
             ORDER BY position ASC"
        );
        sqlx::query_as::<_, LookupResult>(&query)
            .bind(job_id)
            .bind(ResultStatus::Filtered.id())
            .fetch_all(pool)
            .await
    }
}
