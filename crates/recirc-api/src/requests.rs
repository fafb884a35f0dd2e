use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tokio::task::spawn_blocking;
use uuid::Uuid;

use recirc_core::exchange;
use recirc_types::api::{Claims, CreateRequestRequest, RequestView};

use crate::auth::AppState;
use crate::error::ApiError;

pub async fn create_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateRequestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let requester = claims.sub;
    let request = spawn_blocking(move || {
        exchange::create_request(&db, req.item_id, requester, req.message.as_deref())
    })
    .await
    .map_err(ApiError::internal)??;

    state.dispatcher.request_changed(request.owner_id, request.requester_id).await;
    // The item moved to REQUESTED, so the feed changed too
    state.dispatcher.items_changed().await;

    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn accept_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let caller = claims.sub;
    let outcome = spawn_blocking(move || exchange::accept_request(&db, request_id, caller))
        .await
        .map_err(ApiError::internal)??;

    let request = outcome.request;
    state.dispatcher.request_changed(request.owner_id, request.requester_id).await;
    // Demoted siblings changed state as well; signal their requesters
    for requester in outcome.demoted_requesters {
        state.dispatcher.request_changed(request.owner_id, requester).await;
    }
    state.dispatcher.items_changed().await;

    Ok(Json(request))
}

pub async fn reject_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let caller = claims.sub;
    let request = spawn_blocking(move || exchange::reject_request(&db, request_id, caller))
        .await
        .map_err(ApiError::internal)??;

    state.dispatcher.request_changed(request.owner_id, request.requester_id).await;

    Ok(Json(request))
}

pub async fn cancel_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let caller = claims.sub;
    let request = spawn_blocking(move || exchange::cancel_request(&db, request_id, caller))
        .await
        .map_err(ApiError::internal)??;

    state.dispatcher.request_changed(request.owner_id, request.requester_id).await;

    Ok(Json(request))
}

pub async fn sent_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let caller = claims.sub;
    let requests = spawn_blocking(move || collect_views(db.sent_requests(&caller.to_string())?))
        .await
        .map_err(ApiError::internal)??;

    Ok(Json(requests))
}

pub async fn received_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let caller = claims.sub;
    let requests = spawn_blocking(move || collect_views(db.received_requests(&caller.to_string())?))
        .await
        .map_err(ApiError::internal)??;

    Ok(Json(requests))
}

pub async fn item_requests(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let requests = spawn_blocking(move || collect_views(db.item_requests(&item_id.to_string())?))
        .await
        .map_err(ApiError::internal)??;

    Ok(Json(requests))
}

fn collect_views(rows: Vec<recirc_db::models::RequestRow>) -> anyhow::Result<Vec<RequestView>> {
    rows.into_iter().map(|r| r.into_view()).collect()
}
