//! Job lifecycle handlers: submit, status, results, cancel, retry, delete.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use markbatch_cache::JobSnapshot;
use markbatch_core::error::CoreError;
use markbatch_core::progress::percentage;
use markbatch_core::types::{DbId, Timestamp};
use markbatch_db::models::job::{Job, JobListQuery, SubmitJob};
use markbatch_db::models::result::LookupResult;
use markbatch_db::models::status::{JobStatus, ResultStatus, WorkflowStatus};
use markbatch_db::repositories::{JobRepo, ResultRepo};
use markbatch_events::bus::EVENT_JOB_FAILED;
use markbatch_events::{EventBus, JobEvent};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Acknowledgement for an accepted batch.
#[derive(Debug, Serialize)]
pub struct SubmitAck {
    pub job_id: DbId,
    pub total_records: i32,
}

/// Progress block inside the polling status payload.
#[derive(Debug, Serialize)]
pub struct ProgressView {
    pub total: i32,
    pub processed: i32,
    pub percentage: i32,
}

/// Payload for the dedicated polling endpoint.
///
/// `results` is populated (retained rows only) once processing has
/// started; for a pending job it is absent.
#[derive(Debug, Serialize)]
pub struct JobStatusPayload {
    pub job_id: DbId,
    pub status: &'static str,
    pub progress: ProgressView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<LookupResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Client-facing view of a job's state and progress.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub id: DbId,
    pub status: &'static str,
    pub total_count: i32,
    pub processed_count: i32,
    pub percentage: i32,
    pub fetched_count: i32,
    pub retained_count: i32,
    pub excluded_count: i32,
    pub error_message: Option<String>,
    pub retry_of_job_id: Option<DbId>,
    pub submitted_by: Option<DbId>,
    pub assignee_id: Option<DbId>,
    pub workflow_status: &'static str,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl JobView {
    /// Build a view, folding in live in-memory progress when present.
    ///
    /// Live and durable counts can disagree because durable writes are
    /// throttled; the view always reports the larger one so a client
    /// polling in a loop never observes progress moving backwards.
    fn from_job(job: &Job, live_processed: Option<i32>) -> Self {
        let processed = live_processed
            .unwrap_or(job.processed_count)
            .max(job.processed_count);
        Self {
            id: job.id,
            status: JobStatus::from_id(job.status_id)
                .map(JobStatus::name)
                .unwrap_or("unknown"),
            total_count: job.total_count,
            processed_count: processed,
            percentage: percentage(processed, job.total_count),
            fetched_count: job.fetched_count,
            retained_count: job.retained_count,
            excluded_count: job.excluded_count,
            error_message: job.error_message.clone(),
            retry_of_job_id: job.retry_of_job_id,
            submitted_by: job.submitted_by,
            assignee_id: job.assignee_id,
            workflow_status: WorkflowStatus::from_id(job.workflow_status_id)
                .map(WorkflowStatus::name)
                .unwrap_or("unknown"),
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

/// `POST /api/v1/jobs` -- submit a batch of serial numbers.
///
/// Only the batch shape is validated here. Individually malformed
/// identifiers are accepted and come back as `not_found` results, so
/// one bad row in a spreadsheet extract never blocks the rest.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(payload): Json<SubmitJob>,
) -> AppResult<impl IntoResponse> {
    if payload.serial_numbers.is_empty() {
        return Err(CoreError::Validation("serial_numbers must not be empty".into()).into());
    }
    if payload.serial_numbers.len() > state.config.max_batch_size {
        return Err(CoreError::Validation(format!(
            "batch exceeds the maximum of {} serial numbers",
            state.config.max_batch_size
        ))
        .into());
    }
    let job = JobRepo::submit(&state.pool, &payload.serial_numbers, payload.submitted_by).await?;
    tracing::info!(
        job_id = job.id,
        total = job.total_count,
        submitted_by = ?job.submitted_by,
        "Job submitted",
    );

    // Seed the cache so the first status poll is a hit.
    let ack = SubmitAck {
        job_id: job.id,
        total_records: job.total_count,
    };
    state.cache.insert(JobSnapshot {
        job,
        results: Vec::new(),
    });

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: ack })))
}

/// `GET /api/v1/jobs` -- list jobs, newest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<Json<DataResponse<Vec<JobView>>>> {
    let jobs = JobRepo::list(&state.pool, &params).await?;
    let mut views = Vec::with_capacity(jobs.len());
    for job in &jobs {
        let live = state.ledger.get(job.id).await.map(|p| p.processed);
        views.push(JobView::from_job(job, live));
    }
    Ok(Json(DataResponse { data: views }))
}

/// `GET /api/v1/jobs/{id}` -- job status for polling clients.
///
/// Read path: live ledger for in-flight counts, snapshot cache for the
/// row, store only on a cache miss.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<Json<DataResponse<JobView>>> {
    let snapshot = lookup_snapshot(&state, job_id).await?;
    let live = state.ledger.get(job_id).await.map(|p| p.processed);
    Ok(Json(DataResponse {
        data: JobView::from_job(&snapshot.job, live),
    }))
}

/// `GET /api/v1/jobs/{id}/status` -- the polling payload.
///
/// Combines the live ledger (in-flight counts), the cached snapshot and
/// the retained result rows into one response so a polling client needs
/// a single request per tick. Results come straight from the snapshot;
/// a cache hit answers the poll without touching the store at all.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<Json<DataResponse<JobStatusPayload>>> {
    let snapshot = lookup_snapshot(&state, job_id).await?;
    let job = &snapshot.job;

    let live = state.ledger.get(job_id).await.map(|p| p.processed);
    let processed = live.unwrap_or(job.processed_count).max(job.processed_count);

    let results = if job.status_id == JobStatus::Pending.id() {
        None
    } else {
        Some(retained_results(&snapshot))
    };

    Ok(Json(DataResponse {
        data: JobStatusPayload {
            job_id: job.id,
            status: JobStatus::from_id(job.status_id)
                .map(JobStatus::name)
                .unwrap_or("unknown"),
            progress: ProgressView {
                total: job.total_count,
                processed,
                percentage: percentage(processed, job.total_count),
            },
            results,
            error_message: job.error_message.clone(),
        },
    }))
}

/// `GET /api/v1/jobs/{id}/results` -- retained lookup results.
///
/// Available once processing has started; partial results for a job
/// still in flight are fine, but a pending job has nothing to show.
pub async fn get_job_results(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<LookupResult>>>> {
    let snapshot = lookup_snapshot(&state, job_id).await?;
    if snapshot.job.status_id == JobStatus::Pending.id() {
        return Err(
            CoreError::InvalidState("results are not available for a pending job".into()).into(),
        );
    }

    let results = ResultRepo::list_retained_for_job(&state.pool, job_id).await?;
    Ok(Json(DataResponse { data: results }))
}

/// `POST /api/v1/jobs/{id}/cancel` -- cancel a pending or processing job.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<Json<DataResponse<JobView>>> {
    let cancelled = JobRepo::cancel(&state.pool, job_id).await?;
    if !cancelled {
        // Either unknown or already terminal; disambiguate for the client.
        return match JobRepo::find_by_id(&state.pool, job_id).await? {
            None => Err(CoreError::NotFound {
                entity: "job",
                id: job_id,
            }
            .into()),
            Some(_) => Err(CoreError::InvalidState(
                "job is already completed or failed".into(),
            )
            .into()),
        };
    }

    tracing::info!(job_id, "Job cancelled");
    state.ledger.remove(job_id).await;
    let snapshot = resync_required(&state, job_id).await?;
    announce_failed(&state.event_bus, &snapshot.job, "Batch lookup cancelled");
    Ok(Json(DataResponse {
        data: JobView::from_job(&snapshot.job, None),
    }))
}

/// `POST /api/v1/jobs/{id}/retry` -- clone a failed job as a new pending one.
pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let original = JobRepo::find_by_id(&state.pool, job_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "job",
            id: job_id,
        })?;

    if original.status_id != JobStatus::Failed.id() {
        return Err(CoreError::InvalidState("only failed jobs can be retried".into()).into());
    }

    let retry = JobRepo::retry(&state.pool, &original).await?;
    tracing::info!(job_id = retry.id, retry_of = job_id, "Retry job created");

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: SubmitAck {
                job_id: retry.id,
                total_records: retry.total_count,
            },
        }),
    ))
}

/// `DELETE /api/v1/jobs/{id}` -- permanently delete a terminal job.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<StatusCode> {
    let removed = JobRepo::remove(&state.pool, job_id).await?;
    if !removed {
        return match JobRepo::find_by_id(&state.pool, job_id).await? {
            None => Err(CoreError::NotFound {
                entity: "job",
                id: job_id,
            }
            .into()),
            Some(_) => Err(CoreError::InvalidState(
                "only completed or failed jobs can be deleted".into(),
            )
            .into()),
        };
    }

    tracing::info!(job_id, "Job deleted");
    state.cache.invalidate(job_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Retained rows from a snapshot, in processing order.
fn retained_results(snapshot: &JobSnapshot) -> Vec<LookupResult> {
    snapshot
        .results
        .iter()
        .filter(|r| r.status_id != ResultStatus::Filtered.id())
        .cloned()
        .collect()
}

/// Tell the submitter their job ended in failure, cancellation included.
fn announce_failed(bus: &EventBus, job: &Job, message: &str) {
    if let Some(recipient) = job.submitted_by {
        bus.publish(JobEvent::new(EVENT_JOB_FAILED, job.id, recipient, message));
    }
}

/// Cache-aside snapshot fetch: cache hit, or authoritative resync.
async fn lookup_snapshot(
    state: &AppState,
    job_id: DbId,
) -> AppResult<Arc<JobSnapshot>> {
    if let Some(snapshot) = state.cache.get(job_id) {
        return Ok(snapshot);
    }
    resync_required(state, job_id).await
}

/// Authoritative re-read, mapping a missing row to 404.
async fn resync_required(
    state: &AppState,
    job_id: DbId,
) -> AppResult<Arc<JobSnapshot>> {
    state
        .cache
        .resync(&state.pool, job_id)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| {
            CoreError::NotFound {
                entity: "job",
                id: job_id,
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn job(id: DbId, submitted_by: Option<DbId>) -> Job {
        let now = Utc::now();
        Job {
            id,
            status_id: JobStatus::Completed.id(),
            submitted_by,
            serial_numbers: vec!["88000001".into(), "88000002".into()],
            total_count: 2,
            processed_count: 2,
            fetched_count: 2,
            retained_count: 1,
            excluded_count: 1,
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
            completed_at: Some(now),
            updated_at: now,
        }
    }

    fn result(job_id: DbId, position: i32, serial: &str, status: ResultStatus) -> LookupResult {
        LookupResult {
            id: i64::from(position) + 1,
            job_id,
            position,
            serial_number: serial.into(),
            status_id: status.id(),
            owner_name: None,
            mark_text: None,
            filing_date: None,
            registration_number: None,
            mark_status: None,
            attorney_name: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn retained_results_drop_filtered_rows() {
        let snapshot = JobSnapshot {
            job: job(1, None),
            results: vec![
                result(1, 0, "88000001", ResultStatus::Success),
                result(1, 1, "88000002", ResultStatus::Filtered),
                result(1, 2, "88000003", ResultStatus::NotFound),
            ],
        };

        let retained = retained_results(&snapshot);
        assert_eq!(retained.len(), 2);
        assert_eq!(retained[0].serial_number, "88000001");
        assert_eq!(retained[1].serial_number, "88000003");
    }

    #[tokio::test]
    async fn cancellation_notifies_the_submitter() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        announce_failed(&bus, &job(5, Some(9)), "Batch lookup cancelled");

        let event = rx.recv().await.expect("submitter should be notified");
        assert_eq!(event.event_type, EVENT_JOB_FAILED);
        assert_eq!(event.job_id, 5);
        assert_eq!(event.recipient_id, 9);
        assert_eq!(event.message, "Batch lookup cancelled");
    }

    #[tokio::test]
    async fn anonymous_jobs_produce_no_cancellation_event() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        announce_failed(&bus, &job(5, None), "Batch lookup cancelled");

        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
    }
}
