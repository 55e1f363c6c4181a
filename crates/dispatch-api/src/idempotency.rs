//! Idempotency-Key middleware (C4, spec.md §4.8). Must run after
//! [`crate::auth::require_api_key`] so [`crate::auth::AuthContext`] is
//! already attached to the request.

use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header::HeaderName, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dispatch_store::idempotency::IdempotencyClaim;
use serde_json::Value as Json;

use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::state::AppState;

static IDEMPOTENCY_KEY: HeaderName = HeaderName::from_static("idempotency-key");
const POLL_INTERVAL_MS: u64 = 100;
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub async fn require_idempotency_key_if_present(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(key) = request
        .headers()
        .get(&IDEMPOTENCY_KEY)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
    else {
        return Ok(next.run(request).await);
    };

    let organization_id = request
        .extensions()
        .get::<AuthContext>()
        .map(|ctx| ctx.organization_id)
        .ok_or_else(|| dispatch_shared::DispatchError::Internal("idempotency middleware ran before auth".into()))?;

    let now = chrono::Utc::now();
    match state.store.get_or_create_idempotency(organization_id, &key, now).await? {
        IdempotencyClaim::Created => {
            let response = next.run(request).await;
            let (parts, body) = response.into_parts();
            let bytes = to_bytes(body, MAX_BODY_BYTES).await.map_err(|e| {
                dispatch_shared::DispatchError::Internal(format!("buffering idempotent response: {e}"))
            })?;
            let parsed: Json =
                serde_json::from_slice(&bytes).unwrap_or_else(|_| Json::String(String::from_utf8_lossy(&bytes).into_owned()));
            state
                .store
                .put_idempotency_result(organization_id, &key, parts.status.as_u16() as i32, &parsed)
                .await?;
            Ok(Response::from_parts(parts, Body::from(bytes)))
        }
        IdempotencyClaim::Existing { result: Some((status_code, body)) } => {
            Ok(replay(status_code, body))
        }
        IdempotencyClaim::Existing { result: None } => wait_for_result(&state, organization_id, &key).await,
    }
}

async fn wait_for_result(state: &AppState, organization_id: dispatch_shared::ids::OrganizationId, key: &str) -> Result<Response, ApiError> {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(state.config.api.idempotency_wait_ms);
    loop {
        let record = state.store.get_idempotency(organization_id, key).await?;
        if let (Some(status_code), Some(body)) = (record.status_code, record.response_body) {
            return Ok(replay(status_code, body));
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(dispatch_shared::DispatchError::Conflict(
                "idempotent request still in flight".into(),
            )
            .into());
        }
        tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
    }
}

fn replay(status_code: i32, body: Json) -> Response {
    let status = StatusCode::from_u16(status_code as u16).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, axum::Json(body)).into_response()
}
