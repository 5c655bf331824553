//! Service-specific error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Per-request failures rendered as JSON error bodies.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Generation(#[from] key_pool::Error),

    #[error("key storage failed: {0}")]
    Storage(#[from] gemini::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Generation(key_pool::Error::NotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Generation(key_pool::Error::RateLimitExhausted { .. }) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ApiError::Generation(key_pool::Error::Upstream(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Value of `error.type` in the response body.
    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::Generation(e) => e.kind(),
            ApiError::Storage(_) => "storage_error",
        }
    }

    /// Render as `{"error": {"type", "message", "request_id"}}`.
    pub fn into_response_with_id(self, request_id: &str) -> Response {
        let body = serde_json::json!({
            "error": {
                "type": self.error_type(),
                "message": self.to_string(),
                "request_id": request_id,
            }
        });
        (
            self.status_code(),
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

/// Generate a request ID in the `req_{uuid}` format.
pub fn new_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}
