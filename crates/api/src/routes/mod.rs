//! Route definitions, grouped by resource.

pub mod health;
pub mod jobs;
pub mod notifications;

use axum::Router;

use crate::state::AppState;

/// All `/api/v1` routes merged into one router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(jobs::router())
        .merge(notifications::router())
}
