use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use pressroom_core::CoreError;

/// API error type mapping core failures to JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("preview token invalid")]
    PreviewTokenInvalid,

    #[error("preview expired")]
    PreviewExpired,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => ApiError::BadRequest(msg),
            CoreError::NotFound(msg) => ApiError::NotFound(msg),
            CoreError::ImmutableManifest(id) => {
                ApiError::Conflict(format!("manifest already exists for release {id}"))
            }
            CoreError::UnknownRelease(id) => ApiError::NotFound(format!("release {id}")),
            CoreError::InvalidSignature => ApiError::PreviewTokenInvalid,
            CoreError::Expired => ApiError::PreviewExpired,
            CoreError::Serialization(msg) | CoreError::Backend(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "notFound", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "badRequest", msg.clone()),
            ApiError::PreviewTokenInvalid => (
                StatusCode::UNAUTHORIZED,
                "PREVIEW_TOKEN_INVALID",
                "Preview token signature is invalid".to_string(),
            ),
            ApiError::PreviewExpired => (
                StatusCode::GONE,
                "PREVIEW_EXPIRED",
                "Preview token has expired".to_string(),
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internalError",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": {
                "type": error_type,
                "message": message,
                "statusCode": status.as_u16(),
            }
        });

        (status, Json(body)).into_response()
    }
}

/// Convenience type alias for route handlers.
pub type ApiResult<T> = Result<T, ApiError>;
