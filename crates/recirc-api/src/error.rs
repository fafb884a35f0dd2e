use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use recirc_core::Error;

/// Wrapper that maps the domain taxonomy onto HTTP. Storage details are
/// logged server-side and never echoed to the client.
pub struct ApiError(pub Error);

impl ApiError {
    /// For task join failures and other infrastructure hiccups.
    pub fn internal(e: impl std::fmt::Display) -> Self {
        ApiError(Error::Storage(anyhow::anyhow!("{}", e)))
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError(Error::Storage(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            Error::Unauthorized(_) => (StatusCode::FORBIDDEN, self.0.to_string()),
            Error::InvalidState(_) => (StatusCode::CONFLICT, self.0.to_string()),
            Error::SelfRequest | Error::Validation(_) => {
                (StatusCode::BAD_REQUEST, self.0.to_string())
            }
            Error::Storage(e) => {
                error!("storage error: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
