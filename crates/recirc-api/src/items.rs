use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tokio::task::spawn_blocking;
use uuid::Uuid;

use recirc_core::Error;
use recirc_types::api::{Claims, CreateItemRequest, ItemQuery, ItemView, UpdateItemRequest};
use recirc_types::models::ItemStatus;

use crate::auth::AppState;
use crate::error::ApiError;

pub async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<ItemQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let items = spawn_blocking(move || {
        let rows = db.list_items(query.search.as_deref(), query.location.as_deref())?;
        rows.into_iter().map(|r| r.into_view()).collect::<anyhow::Result<Vec<ItemView>>>()
    })
    .await
    .map_err(ApiError::internal)??;

    Ok(Json(items))
}

pub async fn get_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let item = spawn_blocking(move || db.get_item(&item_id.to_string()))
        .await
        .map_err(ApiError::internal)??
        .ok_or(Error::NotFound("item"))?
        .into_view()?;

    Ok(Json(item))
}

pub async fn create_item(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.title.trim().is_empty() {
        return Err(Error::Validation("title is required").into());
    }

    let db = state.db.clone();
    let owner_id = claims.sub;
    let item = spawn_blocking(move || {
        db.create_item(
            &Uuid::new_v4().to_string(),
            &owner_id.to_string(),
            req.title.trim(),
            req.description.as_deref(),
            req.location.as_deref(),
            req.image_url.as_deref(),
        )?
        .into_view()
    })
    .await
    .map_err(ApiError::internal)??;

    state.dispatcher.items_changed().await;

    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let caller = claims.sub;
    let item = spawn_blocking(move || {
        let key = item_id.to_string();
        let existing = db.get_item(&key)?.ok_or(Error::NotFound("item"))?;
        // owner_id is immutable after creation, so check-then-update
        // cannot race into the wrong hands
        if existing.owner_id != caller.to_string() {
            return Err(Error::Unauthorized("only the owner can update an item"));
        }

        let updated = db
            .update_item(
                &key,
                req.title.as_deref(),
                req.description.as_deref(),
                req.location.as_deref(),
                req.image_url.as_deref(),
            )?
            .ok_or(Error::NotFound("item"))?;
        Ok::<_, Error>(updated.into_view()?)
    })
    .await
    .map_err(ApiError::internal)??;

    state.dispatcher.items_changed().await;

    Ok(Json(item))
}

/// Soft delete: the item is kept but drops out of every listing.
pub async fn delete_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let caller = claims.sub;
    spawn_blocking(move || {
        let key = item_id.to_string();
        let existing = db.get_item(&key)?.ok_or(Error::NotFound("item"))?;
        if existing.owner_id != caller.to_string() {
            return Err(Error::Unauthorized("only the owner can delete an item"));
        }

        db.set_item_status(&key, ItemStatus::Deleted)?;
        Ok::<_, Error>(())
    })
    .await
    .map_err(ApiError::internal)??;

    state.dispatcher.items_changed().await;

    Ok(StatusCode::NO_CONTENT)
}
