//! Job entity models and DTOs for the batch lookup engine.

use markbatch_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub status_id: StatusId,
    pub submitted_by: Option<DbId>,
    pub serial_numbers: Vec<String>,
    pub total_count: i32,
    pub processed_count: i32,
    pub fetched_count: i32,
    pub retained_count: i32,
    pub excluded_count: i32,
    pub error_message: Option<String>,
    pub retry_of_job_id: Option<DbId>,
    pub claimed_at: Option<Timestamp>,
    pub heartbeat_at: Option<Timestamp>,
    pub requeue_count: i16,
    pub assignee_id: Option<DbId>,
    pub workflow_status_id: StatusId,
    pub assigned_at: Option<Timestamp>,
    pub downloaded_at: Option<Timestamp>,
    pub work_started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

/// DTO for submitting a new batch via `POST /api/v1/jobs`.
///
/// `column_hint` is consumed by the upstream spreadsheet parser, not by
/// this service; it is accepted so parser-facing clients can reuse the
/// same payload.
#[derive(Debug, Deserialize)]
pub struct SubmitJob {
    pub serial_numbers: Vec<String>,
    #[serde(default)]
    pub submitted_by: Option<DbId>,
    #[serde(default)]
    pub column_hint: Option<String>,
}

/// Query parameters for `GET /api/v1/jobs`.
#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    /// Filter by status ID (e.g. 1 = pending, 4 = failed).
    pub status_id: Option<StatusId>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}
