//! Routes for job lifecycle and the assignment workflow.

use axum::routing::{get, patch, post};
use axum::Router;

use crate::handlers::{assignments, jobs};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(jobs::submit_job).get(jobs::list_jobs))
        .route("/jobs/{id}", get(jobs::get_job).delete(jobs::delete_job))
        .route("/jobs/{id}/status", get(jobs::get_job_status))
        .route("/jobs/{id}/results", get(jobs::get_job_results))
        .route("/jobs/{id}/cancel", post(jobs::cancel_job))
        .route("/jobs/{id}/retry", post(jobs::retry_job))
        .route("/jobs/{id}/assign", post(assignments::assign_job))
        .route("/jobs/{id}/workflow", patch(assignments::advance_workflow))
}
