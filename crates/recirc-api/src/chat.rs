use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tokio::task::spawn_blocking;
use uuid::Uuid;

use recirc_core::chat;
use recirc_types::api::{Claims, SendMessageRequest};

use crate::auth::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor for pagination: the `created_at` timestamp of the oldest
    /// message from the previous page fetches older messages.
    pub before: Option<String>,
}

fn default_limit() -> u32 {
    50
}

/// Chat history. Access is re-derived from the item's currently accepted
/// request on every call; there is no channel to be "in".
pub async fn get_messages(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Query(query): Query<ChatQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let caller = claims.sub;
    let messages = spawn_blocking(move || {
        chat::message_history(&db, item_id, caller, query.limit, query.before.as_deref())
    })
    .await
    .map_err(ApiError::internal)??;

    Ok(Json(messages))
}

/// REST fallback sender; the WebSocket SendChat command takes the same
/// core path. The sender is re-validated at write time either way.
pub async fn send_message(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let caller = claims.sub;
    let message = spawn_blocking(move || chat::send_message(&db, item_id, caller, &req.content))
        .await
        .map_err(ApiError::internal)??;

    state.dispatcher.message_created(message.clone()).await;

    Ok((StatusCode::CREATED, Json(message)))
}
