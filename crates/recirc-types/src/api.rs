use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ItemStatus, RequestStatus};

// -- JWT Claims --

/// JWT claims shared between recirc-api (REST middleware) and
/// recirc-gateway (WebSocket Identify handshake). Canonical definition
/// lives here to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Items --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateItemRequest {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
}

/// Partial update; absent fields are left untouched. `owner_id` and
/// `status` are deliberately not patchable through this surface.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateItemRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemQuery {
    pub search: Option<String>,
    pub location: Option<String>,
}

/// Item plus its owner's display name, as shown in list views and
/// pushed on the item feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemView {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub owner_username: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub status: ItemStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// -- Requests --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRequestRequest {
    pub item_id: Uuid,
    pub message: Option<String>,
}

/// Request joined with its item title and requester name for list views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestView {
    pub id: Uuid,
    pub item_id: Uuid,
    pub item_title: String,
    pub requester_id: Uuid,
    pub requester_username: String,
    pub owner_id: Uuid,
    pub status: RequestStatus,
    pub message: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// -- Chat --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub id: Uuid,
    pub item_id: Uuid,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// -- Notifications --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateNotificationRequest {
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
}
