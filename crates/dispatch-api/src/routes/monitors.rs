//! `/api/v1/monitors[...]` and the public `/ping/{token}` heartbeat
//! receiver (spec.md §4.7, §6).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Extension;
use dispatch_shared::ids::MonitorId;
use serde_json::json;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::dto::{MonitorRequest, MonitorResponse};
use crate::error::{ok, ApiError};
use crate::state::AppState;

fn generate_ping_token() -> String {
    Uuid::new_v4().simple().to_string()
}

pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    axum::Json(req): axum::Json<MonitorRequest>,
) -> Result<axum::response::Response, ApiError> {
    req.validate()?;
    let monitor = state
        .store
        .create_monitor(
            MonitorId::new(),
            auth.organization_id,
            &req.name,
            &generate_ping_token(),
            req.interval_seconds,
            req.cron_expression.as_deref(),
            req.grace_period_seconds,
        )
        .await?;
    Ok(ok(StatusCode::CREATED, MonitorResponse::from(monitor)))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<axum::response::Response, ApiError> {
    let monitors = state.store.list_monitors(auth.organization_id).await?;
    let resp: Vec<MonitorResponse> = monitors.into_iter().map(MonitorResponse::from).collect();
    Ok(ok(StatusCode::OK, resp))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<MonitorId>,
) -> Result<axum::response::Response, ApiError> {
    let monitor = state.store.get_monitor(id).await?;
    if monitor.organization_id != auth.organization_id {
        return Err(dispatch_shared::DispatchError::not_found("monitor", id.to_string()).into());
    }
    Ok(ok(StatusCode::OK, MonitorResponse::from(monitor)))
}

#[derive(Debug, serde::Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

pub async fn set_enabled(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<MonitorId>,
    axum::Json(req): axum::Json<SetEnabledRequest>,
) -> Result<axum::response::Response, ApiError> {
    let monitor = state.store.get_monitor(id).await?;
    if monitor.organization_id != auth.organization_id {
        return Err(dispatch_shared::DispatchError::not_found("monitor", id.to_string()).into());
    }
    let updated = state.store.set_monitor_enabled(id, req.enabled).await?;
    Ok(ok(StatusCode::OK, MonitorResponse::from(updated)))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<MonitorId>,
) -> Result<axum::response::Response, ApiError> {
    let monitor = state.store.get_monitor(id).await?;
    if monitor.organization_id != auth.organization_id {
        return Err(dispatch_shared::DispatchError::not_found("monitor", id.to_string()).into());
    }
    state.store.delete_monitor(id).await?;
    Ok(ok(StatusCode::NO_CONTENT, json!(null)))
}

/// `/ping/{token}` (spec.md §6): the token itself is the capability, so
/// this route is mounted outside API-key auth entirely.
pub async fn ping(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<axum::response::Response, ApiError> {
    let now = chrono::Utc::now();
    let (monitor, previous_status) = state.store.record_ping(&token, now).await?;
    let recovered = previous_status == dispatch_shared::types::MonitorStatus::Down;
    if recovered {
        if let Ok(org) = state.store.get_organization(monitor.organization_id).await {
            if let Err(err) = dispatch_worker::notifier::notify_monitor_event(
                state.store.as_ref(),
                state.sink.as_ref(),
                state.config.notifier.throttle_window_s,
                &monitor,
                &org,
                dispatch_worker::NotifyEvent::Recovery,
                now,
            )
            .await
            {
                tracing::warn!(monitor_id = %monitor.id, error = %err, "failed to deliver ping recovery notification");
            }
        }
    }
    Ok(ok(
        StatusCode::OK,
        json!({
            "status": monitor.status,
            "recovered": recovered,
            "next_expected_at": monitor.next_expected_at,
        }),
    ))
}
