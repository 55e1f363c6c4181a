//! `/api/v1/endpoints[...]` CRUD and the public `/in/{slug}` fan-out
//! ingress (spec.md §4.5, §6).

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Extension;
use chrono::Utc;
use dispatch_shared::error::DispatchError;
use dispatch_shared::ids::{EndpointId, ExecutionId, InboundEventId, TaskId};
use dispatch_shared::types::{HttpMethod, ScheduleType};
use dispatch_store::tasks::TaskInput;
use serde_json::{json, Value as Json};

use crate::auth::AuthContext;
use crate::dto::{EndpointRequest, EndpointResponse};
use crate::error::{ok, ApiError};
use crate::state::AppState;

fn slugify(name: &str) -> String {
    let raw: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let collapsed: String = raw.split('-').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("-");
    if collapsed.is_empty() {
        EndpointId::new().to_string()
    } else {
        collapsed
    }
}

pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    axum::Json(req): axum::Json<EndpointRequest>,
) -> Result<axum::response::Response, ApiError> {
    req.validate()?;
    let slug = req.slug.clone().unwrap_or_else(|| slugify(&req.name));
    let endpoint = state
        .store
        .create_endpoint(
            EndpointId::new(),
            auth.organization_id,
            &req.name,
            &slug,
            &req.forward_urls,
            req.use_queue,
            req.retry_attempts,
        )
        .await?;
    Ok(ok(StatusCode::CREATED, EndpointResponse::from(endpoint)))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<axum::response::Response, ApiError> {
    let endpoints = state.store.list_endpoints(auth.organization_id).await?;
    let resp: Vec<EndpointResponse> = endpoints.into_iter().map(EndpointResponse::from).collect();
    Ok(ok(StatusCode::OK, resp))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<EndpointId>,
) -> Result<axum::response::Response, ApiError> {
    let endpoint = state.store.get_endpoint(id).await?;
    if endpoint.organization_id != auth.organization_id {
        return Err(DispatchError::not_found("endpoint", id.to_string()).into());
    }
    Ok(ok(StatusCode::OK, EndpointResponse::from(endpoint)))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<EndpointId>,
    axum::Json(req): axum::Json<EndpointRequest>,
) -> Result<axum::response::Response, ApiError> {
    req.validate()?;
    let existing = state.store.get_endpoint(id).await?;
    if existing.organization_id != auth.organization_id {
        return Err(DispatchError::not_found("endpoint", id.to_string()).into());
    }
    let updated = state
        .store
        .update_endpoint(id, &req.name, &req.forward_urls, req.use_queue, req.retry_attempts, existing.enabled)
        .await?;
    Ok(ok(StatusCode::OK, EndpointResponse::from(updated)))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<EndpointId>,
) -> Result<axum::response::Response, ApiError> {
    let existing = state.store.get_endpoint(id).await?;
    if existing.organization_id != auth.organization_id {
        return Err(DispatchError::not_found("endpoint", id.to_string()).into());
    }
    state.store.delete_endpoint(id).await?;
    Ok(ok(StatusCode::NO_CONTENT, json!(null)))
}

/// Header names that must never be persisted or forwarded verbatim
/// (spec.md §4.5 step 2).
fn is_authorization_family(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower == "authorization" || lower.starts_with("proxy-authorization") || lower == "cookie"
}

fn filtered_headers(headers: &HeaderMap) -> Json {
    let mut map = serde_json::Map::new();
    for (name, value) in headers.iter() {
        if is_authorization_family(name.as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            map.insert(name.as_str().to_string(), Json::String(value.to_string()));
        }
    }
    Json::Object(map)
}

/// Creates (or reuses) the synthetic one-shot task that delivers a single
/// `(endpoint, forward_url)` pair, then inserts the pending execution that
/// carries this particular inbound event's body (spec.md §4.5 step 3).
async fn dispatch_forward(
    state: &AppState,
    endpoint: &dispatch_store::models::Endpoint,
    forward_url: &str,
    now: chrono::DateTime<Utc>,
) -> Result<TaskId, ApiError> {
    let candidate_id = TaskId::new();
    let input = TaskInput {
        id: candidate_id,
        organization_id: endpoint.organization_id,
        name: format!("fanout:{}", endpoint.slug),
        url: forward_url.to_string(),
        method: match endpoint.forward_method.as_deref() {
            Some("GET") => HttpMethod::Get,
            Some("PUT") => HttpMethod::Put,
            Some("PATCH") => HttpMethod::Patch,
            Some("DELETE") => HttpMethod::Delete,
            _ => HttpMethod::Post,
        },
        headers: endpoint.forward_headers.clone().unwrap_or(json!({})),
        body: endpoint.forward_body.clone(),
        schedule_type: ScheduleType::Once,
        cron_expression: None,
        scheduled_at: Some(now),
        enabled: false,
        timeout_ms: 30_000,
        retry_attempts: endpoint.retry_attempts,
        callback_url: None,
        expected_status_codes: None,
        expected_body_pattern: None,
        queue: None,
        next_run_at: None,
        notify_on_failure: endpoint.notify_on_failure,
        notify_on_recovery: endpoint.notify_on_recovery,
        external_id: None,
    };
    state.store.upsert_task(&input).await?;

    let task_id = state
        .store
        .get_or_create_fanout_task(endpoint.id, forward_url, || candidate_id)
        .await?;

    // Not internal: a fan-out delivery is a normal execution of the
    // synthetic task above, so `task.retry_attempts` (= endpoint.retry_attempts)
    // governs its retries the same way it would for any other task.
    let queue = if endpoint.use_queue { Some(endpoint.slug.as_str()) } else { None };
    state
        .store
        .insert_pending_execution(ExecutionId::new(), task_id, endpoint.organization_id, queue, now, 1, None, false)
        .await?;
    Ok(task_id)
}

/// `/in/{slug}` (spec.md §4.5): the slug itself is the capability, so this
/// route is mounted outside API-key auth entirely.
pub async fn inbound(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<axum::response::Response, ApiError> {
    let endpoint = state.store.get_endpoint_by_slug(&slug).await.map_err(|_| {
        ApiError::from(DispatchError::not_found("endpoint", slug.clone()))
    })?;
    if !endpoint.enabled {
        return Err(ApiError::from(DispatchError::not_found("endpoint", slug)));
    }

    let now = Utc::now();
    let mut task_ids = Vec::with_capacity(endpoint.forward_urls.len());
    for forward_url in &endpoint.forward_urls {
        task_ids.push(dispatch_forward(&state, &endpoint, forward_url, now).await?);
    }

    state
        .store
        .insert_inbound_event(
            InboundEventId::new(),
            endpoint.id,
            "POST",
            &filtered_headers(&headers),
            if body.is_empty() { None } else { Some(&body) },
            None,
            now,
            &task_ids,
        )
        .await?;
    let _ = dispatch_scheduler::wake::notify_wake(state.store.pool()).await;

    Ok(ok(StatusCode::ACCEPTED, json!({ "received": true, "forwarded": task_ids.len() })))
}

/// Replay contract (spec.md §4.5): re-insert one pending execution per
/// `task_id` on the stored inbound event with `attempt = 1` and the current
/// timestamp. Fails with `no_tasks` if every referenced task is gone.
pub async fn replay(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<dispatch_shared::ids::InboundEventId>,
) -> Result<axum::response::Response, ApiError> {
    let event = state.store.get_inbound_event(id).await?;
    let endpoint = state.store.get_endpoint(event.endpoint_id).await?;
    if endpoint.organization_id != auth.organization_id {
        return Err(DispatchError::not_found("inbound_event", id.to_string()).into());
    }
    if event.task_ids.is_empty() {
        return Err(ApiError::invalid_input("no_tasks", json!({"task_ids": "inbound event has no forward tasks"})));
    }

    let now = Utc::now();
    let mut replayed = 0u32;
    for task_id in &event.task_ids {
        let Ok(task) = state.store.get_task(*task_id).await else {
            continue;
        };
        state
            .store
            .insert_pending_execution(ExecutionId::new(), task.id, endpoint.organization_id, task.queue.as_deref(), now, 1, None, false)
            .await?;
        replayed += 1;
    }
    if replayed == 0 {
        return Err(ApiError::invalid_input("no_tasks", json!({"task_ids": "all referenced tasks were deleted"})));
    }
    let _ = dispatch_scheduler::wake::notify_wake(state.store.pool()).await;
    Ok(ok(StatusCode::ACCEPTED, json!({ "replayed": replayed, "scheduled_for": now })))
}
