//! `/api/v1/queues[...]` (spec.md §6).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Extension;

use crate::auth::AuthContext;
use crate::dto::QueueResponse;
use crate::error::{ok, ApiError};
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<axum::response::Response, ApiError> {
    let queues = state.store.list_queues(auth.organization_id).await?;
    let resp: Vec<QueueResponse> = queues.into_iter().map(QueueResponse::from).collect();
    Ok(ok(StatusCode::OK, resp))
}

pub async fn pause(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(name): Path<String>,
) -> Result<axum::response::Response, ApiError> {
    state.store.set_queue_paused(auth.organization_id, &name, true).await?;
    Ok(ok(StatusCode::OK, QueueResponse { name, paused: true }))
}

pub async fn resume(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(name): Path<String>,
) -> Result<axum::response::Response, ApiError> {
    state.store.set_queue_paused(auth.organization_id, &name, false).await?;
    let _ = dispatch_scheduler::wake::notify_wake(state.store.pool()).await;
    Ok(ok(StatusCode::OK, QueueResponse { name, paused: false }))
}
