use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tokio::task::spawn_blocking;
use uuid::Uuid;

use recirc_core::Error;
use recirc_types::api::{Claims, CreateNotificationRequest};
use recirc_types::models::Notification;

use crate::auth::AppState;
use crate::error::ApiError;

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let caller = claims.sub;
    let notifications = spawn_blocking(move || {
        let rows = db.notifications_for(&caller.to_string())?;
        rows.into_iter()
            .map(|r| r.into_notification())
            .collect::<anyhow::Result<Vec<Notification>>>()
    })
    .await
    .map_err(ApiError::internal)??;

    Ok(Json(notifications))
}

pub async fn create_notification(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Json(req): Json<CreateNotificationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.title.trim().is_empty() || req.message.trim().is_empty() {
        return Err(Error::Validation("title and message are required").into());
    }

    let db = state.db.clone();
    let notification = spawn_blocking(move || {
        let target = req.user_id.to_string();
        if db.get_user_by_id(&target)?.is_none() {
            return Err(Error::NotFound("user"));
        }
        let row = db.create_notification(
            &Uuid::new_v4().to_string(),
            &target,
            req.title.trim(),
            req.message.trim(),
        )?;
        Ok::<_, Error>(row.into_notification()?)
    })
    .await
    .map_err(ApiError::internal)??;

    state.dispatcher.notification_created(notification.clone()).await;

    Ok((StatusCode::CREATED, Json(notification)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let caller = claims.sub;
    let notification = spawn_blocking(move || {
        let key = notification_id.to_string();
        let row = db.get_notification(&key)?.ok_or(Error::NotFound("notification"))?;
        if row.user_id != caller.to_string() {
            return Err(Error::Unauthorized("not your notification"));
        }

        db.mark_notification_read(&key)?;
        let row = db
            .get_notification(&key)?
            .ok_or_else(|| Error::Storage(anyhow::anyhow!("notification {} vanished", key)))?;
        Ok::<_, Error>(row.into_notification()?)
    })
    .await
    .map_err(ApiError::internal)??;

    Ok(Json(notification))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let caller = claims.sub;
    spawn_blocking(move || {
        let key = notification_id.to_string();
        let row = db.get_notification(&key)?.ok_or(Error::NotFound("notification"))?;
        if row.user_id != caller.to_string() {
            return Err(Error::Unauthorized("not your notification"));
        }

        db.delete_notification(&key)?;
        Ok::<_, Error>(())
    })
    .await
    .map_err(ApiError::internal)??;

    Ok(StatusCode::NO_CONTENT)
}
