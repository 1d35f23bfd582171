//! Repository for the assignment workflow columns on `jobs`.
//!
//! The workflow is a strictly forward-only state machine layered on a
//! completed job. Every transition is a guarded UPDATE whose WHERE
//! clause encodes the precondition, so concurrent actors serialize at
//! the database and a lost race simply reports `false`.

use markbatch_core::types::DbId;
use sqlx::PgPool;

use crate::models::status::{JobStatus, WorkflowStatus};

/// Provides assignment workflow transitions for completed jobs.
pub struct AssignmentRepo;

impl AssignmentRepo {
    /// Assign a completed, unassigned job to `assignee_id`.
    ///
    /// Returns `false` if the job is not completed or already assigned.
    pub async fn assign(
        pool: &PgPool,
        job_id: DbId,
        assignee_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET assignee_id = $2, workflow_status_id = $3, \
                 assigned_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = $4 AND workflow_status_id = $5",
        )
        .bind(job_id)
        .bind(assignee_id)
        .bind(WorkflowStatus::Assigned.id())
        .bind(JobStatus::Completed.id())
        .bind(WorkflowStatus::Unassigned.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Advance the workflow to `next`, performed by `actor_id`.
    ///
    /// The guard requires the current workflow state to be the immediate
    /// predecessor of `next` and the actor to be the assignee. Each step
    /// stamps its own timestamp column. Returns `false` when the
    /// precondition does not hold.
    pub async fn advance(
        pool: &PgPool,
        job_id: DbId,
        actor_id: DbId,
        next: WorkflowStatus,
    ) -> Result<bool, sqlx::Error> {
        let timestamp_column = match next {
            WorkflowStatus::Downloaded => "downloaded_at",
            WorkflowStatus::Working => "work_started_at",
            WorkflowStatus::Finished => "finished_at",
            // Unassigned/Assigned are not reachable through advance.
            WorkflowStatus::Unassigned | WorkflowStatus::Assigned => {
                return Ok(false);
            }
        };

        // `next` always has a predecessor here (Unassigned was rejected above).
        let predecessor = match next {
            WorkflowStatus::Downloaded => WorkflowStatus::Assigned,
            WorkflowStatus::Working => WorkflowStatus::Downloaded,
            WorkflowStatus::Finished => WorkflowStatus::Working,
            _ => unreachable!(),
        };

        let query = format!(
            "UPDATE jobs \
             SET workflow_status_id = $2, {timestamp_column} = NOW(), updated_at = NOW() \
             WHERE id = $1 AND workflow_status_id = $3 AND assignee_id = $4",
        );
        let result = sqlx::query(&query)
            .bind(job_id)
            .bind(next.id())
            .bind(predecessor.id())
            .bind(actor_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
