//! `/api/v1/sync` (spec.md §6): declarative upsert keyed by `external_id`,
//! with optional removal of tasks no longer present in the request.

use std::collections::HashSet;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use dispatch_shared::ids::TaskId;

use super::tasks::build_input;
use crate::auth::AuthContext;
use crate::dto::SyncRequest;
use crate::error::{ok, ApiError};
use crate::state::AppState;

pub async fn sync(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<SyncRequest>,
) -> Result<axum::response::Response, ApiError> {
    for entry in &req.tasks {
        entry.task.validate()?;
    }

    let now = Utc::now();
    let mut upserted = 0u32;
    let mut seen_external_ids = HashSet::with_capacity(req.tasks.len());
    for entry in &req.tasks {
        seen_external_ids.insert(entry.external_id.clone());
        let id = match state.store.get_task_by_external_id(auth.organization_id, &entry.external_id).await? {
            Some(existing) => existing.id,
            None => TaskId::new(),
        };
        let input = build_input(id, auth.organization_id, &entry.task, now, Some(entry.external_id.clone()))?;
        state.store.upsert_task(&input).await?;
        upserted += 1;
    }

    let mut deleted = 0u32;
    if req.delete_removed {
        for task in state.store.list_synced_tasks(auth.organization_id).await? {
            let Some(external_id) = &task.external_id else { continue };
            if !seen_external_ids.contains(external_id) {
                state.store.soft_delete_task(task.id, now).await?;
                deleted += 1;
            }
        }
    }

    let _ = dispatch_scheduler::wake::notify_wake(state.store.pool()).await;
    Ok(ok(StatusCode::OK, serde_json::json!({ "upserted": upserted, "deleted": deleted })))
}
