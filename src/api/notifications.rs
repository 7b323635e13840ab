use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::repositories;
use crate::schemas::notification::NotificationResponse;

const DEFAULT_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
struct NotificationQuery {
    limit: Option<i64>,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/:id/read", post(mark_read))
}

async fn list_notifications(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<NotificationResponse>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let notifications =
        repositories::notifications::list_for_recipient(state.db(), &user.id, limit)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to list notifications"))?;

    Ok(Json(notifications.iter().map(NotificationResponse::from_notification).collect()))
}

async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let updated = repositories::notifications::mark_read(state.db(), &id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to mark notification read"))?;

    if updated {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Notification not found".to_string()))
    }
}
