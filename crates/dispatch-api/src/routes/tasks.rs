//! `/api/v1/tasks[...]` (spec.md §6): CRUD, batch create, trigger, and
//! queue-scoped cancellation.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use dispatch_shared::ids::{ExecutionId, OrganizationId, TaskId};
use dispatch_shared::types::ScheduleType;
use dispatch_store::tasks::TaskInput;
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthContext;
use crate::dto::{BatchTaskRequest, TaskRequest, TaskResponse};
use crate::error::{ok, ApiError};
use crate::state::AppState;

fn next_run_at(
    schedule_type: ScheduleType,
    cron_expression: Option<&str>,
    scheduled_at: Option<chrono::DateTime<Utc>>,
    now: chrono::DateTime<Utc>,
) -> Result<Option<chrono::DateTime<Utc>>, ApiError> {
    match schedule_type {
        ScheduleType::Once => Ok(scheduled_at),
        ScheduleType::Cron => {
            let expr = cron_expression.ok_or_else(|| {
                ApiError::invalid_input("cron_expression required", json!({"cron_expression": "required"}))
            })?;
            let next = dispatch_shared::cron::next(expr, now + chrono::Duration::seconds(1))
                .map_err(dispatch_shared::error::DispatchError::from)?;
            Ok(Some(next))
        }
    }
}

pub(crate) fn build_input(
    id: TaskId,
    organization_id: OrganizationId,
    req: &TaskRequest,
    now: chrono::DateTime<Utc>,
    external_id: Option<String>,
) -> Result<TaskInput, ApiError> {
    let next_run_at = next_run_at(req.schedule_type, req.cron_expression.as_deref(), req.scheduled_at, now)?;
    Ok(TaskInput {
        id,
        organization_id,
        name: req.name.clone(),
        url: req.url.clone(),
        method: req.method,
        headers: req.headers.clone(),
        body: req.body_bytes(),
        schedule_type: req.schedule_type,
        cron_expression: req.cron_expression.clone(),
        scheduled_at: req.scheduled_at,
        enabled: req.enabled,
        timeout_ms: req.timeout_ms,
        retry_attempts: req.retry_attempts,
        callback_url: req.callback_url.clone(),
        expected_status_codes: req.expected_status_codes.clone(),
        expected_body_pattern: req.expected_body_pattern.clone(),
        queue: req.queue.clone(),
        next_run_at,
        notify_on_failure: req.notify_on_failure,
        notify_on_recovery: req.notify_on_recovery,
        external_id,
    })
}

pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<TaskRequest>,
) -> Result<axum::response::Response, ApiError> {
    req.validate()?;
    let now = Utc::now();
    let input = build_input(TaskId::new(), auth.organization_id, &req, now, None)?;
    let task = state.store.upsert_task(&input).await?;
    let _ = dispatch_scheduler::wake::notify_wake(state.store.pool()).await;
    Ok(ok(StatusCode::CREATED, TaskResponse::from(task)))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<axum::response::Response, ApiError> {
    let tasks = state.store.list_tasks(auth.organization_id).await?;
    let resp: Vec<TaskResponse> = tasks.into_iter().map(TaskResponse::from).collect();
    Ok(ok(StatusCode::OK, resp))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<TaskId>,
) -> Result<axum::response::Response, ApiError> {
    let task = state.store.get_task(id).await?;
    if task.organization_id != auth.organization_id {
        return Err(dispatch_shared::DispatchError::not_found("task", id.to_string()).into());
    }
    Ok(ok(StatusCode::OK, TaskResponse::from(task)))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<TaskId>,
    Json(req): Json<TaskRequest>,
) -> Result<axum::response::Response, ApiError> {
    req.validate()?;
    let existing = state.store.get_task(id).await?;
    if existing.organization_id != auth.organization_id {
        return Err(dispatch_shared::DispatchError::not_found("task", id.to_string()).into());
    }
    let now = Utc::now();
    let input = build_input(id, auth.organization_id, &req, now, None)?;
    let task = state.store.upsert_task(&input).await?;
    if task.enabled {
        let _ = dispatch_scheduler::wake::notify_wake(state.store.pool()).await;
    }
    Ok(ok(StatusCode::OK, TaskResponse::from(task)))
}

pub async fn soft_delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<TaskId>,
) -> Result<axum::response::Response, ApiError> {
    let existing = state.store.get_task(id).await?;
    if existing.organization_id != auth.organization_id {
        return Err(dispatch_shared::DispatchError::not_found("task", id.to_string()).into());
    }
    state.store.soft_delete_task(id, Utc::now()).await?;
    Ok(ok(StatusCode::NO_CONTENT, json!(null)))
}

#[derive(Debug, Deserialize)]
pub struct CancelQueueParams {
    pub queue: String,
}

pub async fn cancel_pending_in_queue(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<CancelQueueParams>,
) -> Result<axum::response::Response, ApiError> {
    let cancelled = state
        .store
        .cancel_pending_in_queue(auth.organization_id, &params.queue)
        .await?;
    Ok(ok(StatusCode::OK, json!({ "cancelled": cancelled, "queue": params.queue })))
}

pub async fn batch_create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<BatchTaskRequest>,
) -> Result<axum::response::Response, ApiError> {
    req.validate()?;
    let now = Utc::now();
    let mut created = 0u32;
    for item in &req.items {
        let mut item = item.clone();
        if item.queue.is_none() {
            item.queue = req.queue.clone();
        }
        let input = build_input(TaskId::new(), auth.organization_id, &item, now, None)?;
        state.store.upsert_task(&input).await?;
        created += 1;
    }
    let _ = dispatch_scheduler::wake::notify_wake(state.store.pool()).await;
    Ok(ok(
        StatusCode::CREATED,
        json!({ "created": created, "queue": req.queue, "scheduled_for": now }),
    ))
}

pub async fn trigger(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<TaskId>,
) -> Result<axum::response::Response, ApiError> {
    let task = state.store.get_task(id).await?;
    if task.organization_id != auth.organization_id {
        return Err(dispatch_shared::DispatchError::not_found("task", id.to_string()).into());
    }

    let org = state.store.get_organization(auth.organization_id).await?;
    let cap = dispatch_worker::quota::monthly_cap(org.tier);
    if dispatch_worker::quota::is_over_quota(org.exec_count, cap) {
        return Err(dispatch_shared::DispatchError::quota_exceeded(
            auth.organization_id.to_string(),
            "executions",
            cap,
        )
        .into());
    }

    let now = Utc::now();
    let execution = state
        .store
        .insert_pending_execution(
            ExecutionId::new(),
            task.id,
            task.organization_id,
            task.queue.as_deref(),
            now,
            1,
            task.callback_url.as_deref(),
            false,
        )
        .await?;
    let _ = dispatch_scheduler::wake::notify_wake(state.store.pool()).await;
    Ok(ok(
        StatusCode::ACCEPTED,
        json!({
            "execution_id": execution.id,
            "status": "pending",
            "scheduled_for": execution.scheduled_for,
        }),
    ))
}
