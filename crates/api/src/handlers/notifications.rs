//! Notification read-side handlers.
//!
//! Notifications are written by the event persistence task; this module
//! only serves them back and records reads.

use axum::extract::{Path, Query, State};
use axum::Json;
use markbatch_core::error::CoreError;
use markbatch_core::types::DbId;
use markbatch_db::models::notification::Notification;
use markbatch_db::repositories::NotificationRepo;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 100;

/// Query parameters for `GET /api/v1/notifications`.
#[derive(Debug, Deserialize)]
pub struct NotificationListQuery {
    pub recipient_id: DbId,
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Request body for `POST /api/v1/notifications/{id}/read`.
#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub recipient_id: DbId,
}

/// `GET /api/v1/notifications` -- a recipient's notifications, newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
    Query(params): Query<NotificationListQuery>,
) -> AppResult<Json<DataResponse<Vec<Notification>>>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let offset = params.offset.unwrap_or(0);

    let notifications = NotificationRepo::list_for_recipient(
        &state.pool,
        params.recipient_id,
        params.unread_only,
        limit,
        offset,
    )
    .await?;
    Ok(Json(DataResponse {
        data: notifications,
    }))
}

/// `POST /api/v1/notifications/{id}/read` -- mark one notification read.
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Path(notification_id): Path<DbId>,
    Json(payload): Json<MarkReadRequest>,
) -> AppResult<Json<DataResponse<serde_json::Value>>> {
    let updated =
        NotificationRepo::mark_read(&state.pool, notification_id, payload.recipient_id).await?;
    if !updated {
        return Err(CoreError::NotFound {
            entity: "notification",
            id: notification_id,
        }
        .into());
    }

    Ok(Json(DataResponse {
        data: json!({ "id": notification_id, "is_read": true }),
    }))
}
