//! Assignment workflow handlers for completed jobs.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use markbatch_core::error::CoreError;
use markbatch_core::types::DbId;
use markbatch_db::models::status::{JobStatus, WorkflowStatus};
use markbatch_db::repositories::{AssignmentRepo, JobRepo};
use markbatch_events::bus::{
    EVENT_ASSIGNMENT_ASSIGNED, EVENT_ASSIGNMENT_DOWNLOADED, EVENT_ASSIGNMENT_FINISHED,
    EVENT_ASSIGNMENT_WORKING,
};
use markbatch_events::JobEvent;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /api/v1/jobs/{id}/assign`.
///
/// `actor_id` identifies who performed the assignment; authentication
/// is handled upstream, so it is recorded for tracing only.
#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub assignee_id: DbId,
    #[serde(default)]
    pub actor_id: Option<DbId>,
}

/// Request body for `PATCH /api/v1/jobs/{id}/workflow`.
#[derive(Debug, Deserialize)]
pub struct WorkflowRequest {
    pub actor_id: DbId,
    /// Target step name: `downloaded`, `working` or `finished`.
    pub next: String,
}

/// `POST /api/v1/jobs/{id}/assign` -- hand a completed job to an assignee.
pub async fn assign_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
    Json(payload): Json<AssignRequest>,
) -> AppResult<impl IntoResponse> {
    let assigned = AssignmentRepo::assign(&state.pool, job_id, payload.assignee_id).await?;
    if !assigned {
        return Err(explain_assign_failure(&state, job_id).await?.into());
    }

    tracing::info!(
        job_id,
        assignee_id = payload.assignee_id,
        actor_id = ?payload.actor_id,
        "Job assigned",
    );
    notify_transition(
        &state,
        job_id,
        EVENT_ASSIGNMENT_ASSIGNED,
        format!("Batch job {job_id} was assigned"),
    )
    .await;
    refresh_cache(&state, job_id).await;

    Ok(Json(DataResponse {
        data: json!({
            "job_id": job_id,
            "assignee_id": payload.assignee_id,
            "workflow_status": WorkflowStatus::Assigned.name(),
        }),
    }))
}

/// `PATCH /api/v1/jobs/{id}/workflow` -- advance the workflow one step.
///
/// Only the assignee may advance, and only to the immediate next step.
pub async fn advance_workflow(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
    Json(payload): Json<WorkflowRequest>,
) -> AppResult<impl IntoResponse> {
    let next = WorkflowStatus::parse(&payload.next).ok_or_else(|| {
        CoreError::Validation(format!("unknown workflow status {:?}", payload.next))
    })?;
    if matches!(next, WorkflowStatus::Unassigned | WorkflowStatus::Assigned) {
        return Err(CoreError::Validation(format!(
            "{} is not reachable through the workflow endpoint",
            next.name()
        ))
        .into());
    }

    let advanced = AssignmentRepo::advance(&state.pool, job_id, payload.actor_id, next).await?;
    if !advanced {
        return Err(explain_advance_failure(&state, job_id, payload.actor_id, next)
            .await?
            .into());
    }

    tracing::info!(
        job_id,
        actor_id = payload.actor_id,
        workflow_status = next.name(),
        "Workflow advanced",
    );
    notify_workflow(&state, job_id, next).await;
    refresh_cache(&state, job_id).await;

    Ok(Json(DataResponse {
        data: json!({
            "job_id": job_id,
            "workflow_status": next.name(),
        }),
    }))
}

/// Work out why a guarded assign reported no rows.
async fn explain_assign_failure(state: &AppState, job_id: DbId) -> AppResult<CoreError> {
    let Some(job) = JobRepo::find_by_id(&state.pool, job_id).await? else {
        return Ok(CoreError::NotFound {
            entity: "job",
            id: job_id,
        });
    };
    if job.status_id != JobStatus::Completed.id() {
        return Ok(CoreError::InvalidState(
            "only completed jobs can be assigned".into(),
        ));
    }
    Ok(CoreError::InvalidState("job is already assigned".into()))
}

/// Work out why a guarded workflow advance reported no rows.
async fn explain_advance_failure(
    state: &AppState,
    job_id: DbId,
    actor_id: DbId,
    next: WorkflowStatus,
) -> AppResult<CoreError> {
    let Some(job) = JobRepo::find_by_id(&state.pool, job_id).await? else {
        return Ok(CoreError::NotFound {
            entity: "job",
            id: job_id,
        });
    };
    if job.assignee_id != Some(actor_id) {
        return Ok(CoreError::Forbidden(
            "only the assignee can advance the workflow".into(),
        ));
    }
    let current = WorkflowStatus::from_id(job.workflow_status_id)
        .map(WorkflowStatus::name)
        .unwrap_or("unknown");
    Ok(CoreError::InvalidState(format!(
        "cannot advance from {current} to {}",
        next.name()
    )))
}

/// Tell both parties the batch moved through the workflow.
async fn notify_workflow(state: &AppState, job_id: DbId, step: WorkflowStatus) {
    let event_type = match step {
        WorkflowStatus::Downloaded => EVENT_ASSIGNMENT_DOWNLOADED,
        WorkflowStatus::Working => EVENT_ASSIGNMENT_WORKING,
        WorkflowStatus::Finished => EVENT_ASSIGNMENT_FINISHED,
        WorkflowStatus::Unassigned | WorkflowStatus::Assigned => return,
    };
    notify_transition(
        state,
        job_id,
        event_type,
        format!("Batch job {job_id} is now {}", step.name()),
    )
    .await;
}

/// Publish one event per interested party for an assignment transition.
///
/// Both the submitter and the assignee hear about every step; when they
/// are the same account only one notification goes out.
async fn notify_transition(state: &AppState, job_id: DbId, event_type: &str, message: String) {
    match JobRepo::find_by_id(&state.pool, job_id).await {
        Ok(Some(job)) => {
            for recipient in transition_recipients(job.submitted_by, job.assignee_id) {
                state
                    .event_bus
                    .publish(JobEvent::new(event_type, job_id, recipient, message.clone()));
            }
        }
        Ok(None) => {}
        Err(e) => tracing::error!(job_id, error = %e, "Failed to load job for notification"),
    }
}

/// Submitter first, then the assignee, deduplicated.
fn transition_recipients(submitted_by: Option<DbId>, assignee_id: Option<DbId>) -> Vec<DbId> {
    let mut recipients = Vec::new();
    if let Some(id) = submitted_by {
        recipients.push(id);
    }
    if let Some(id) = assignee_id {
        if !recipients.contains(&id) {
            recipients.push(id);
        }
    }
    recipients
}

async fn refresh_cache(state: &AppState, job_id: DbId) {
    if let Err(e) = state.cache.resync(&state.pool, job_id).await {
        tracing::warn!(job_id, error = %e, "Cache resync failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_parties_hear_about_a_transition() {
        assert_eq!(transition_recipients(Some(1), Some(2)), vec![1, 2]);
    }

    #[test]
    fn self_assignment_notifies_once() {
        assert_eq!(transition_recipients(Some(7), Some(7)), vec![7]);
    }

    #[test]
    fn missing_parties_are_skipped() {
        assert_eq!(transition_recipients(None, Some(2)), vec![2]);
        assert_eq!(transition_recipients(Some(1), None), vec![1]);
        assert!(transition_recipients(None, None).is_empty());
    }
}
