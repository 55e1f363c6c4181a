//! Translates `DispatchError` into the response envelope (spec.md §6):
//! `{"error": {"code", "message", "details"?}}` with the status codes the
//! spec assigns to each error kind.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dispatch_shared::error::DispatchError;
use serde_json::json;

pub struct ApiError {
    pub inner: DispatchError,
    pub details: Option<serde_json::Value>,
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        ApiError { inner: err, details: None }
    }
}

impl ApiError {
    /// Validation failure with per-field details (spec.md §6: 422 with
    /// per-field `details`).
    pub fn invalid_input(message: impl Into<String>, details: serde_json::Value) -> Self {
        ApiError {
            inner: DispatchError::InvalidInput(message.into()),
            details: Some(details),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.inner {
            DispatchError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DispatchError::NotFound { .. } => StatusCode::NOT_FOUND,
            DispatchError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            DispatchError::QuotaExceeded { .. } => StatusCode::PAYMENT_REQUIRED,
            DispatchError::Conflict(_) => StatusCode::CONFLICT,
            DispatchError::TransportError { .. } | DispatchError::Timeout { .. } => StatusCode::BAD_GATEWAY,
            DispatchError::AssertionFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DispatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut error = json!({
            "code": self.inner.code(),
            "message": self.inner.to_string(),
        });
        if let Some(details) = self.details {
            error["details"] = details;
        }
        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Wraps successful payloads in the spec's `{"data": ...}` envelope.
pub fn ok<T: serde::Serialize>(status: StatusCode, data: T) -> Response {
    (status, Json(json!({ "data": data }))).into_response()
}
