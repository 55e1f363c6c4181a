//! API-key authentication middleware (C3, spec.md §4.8): looks up `key_id`
//! in the process-local cache, falling back to the store on a miss, verifies
//! the bearer secret in constant time, and debounces the `last_used_at`
//! touch to at most once per 5 minutes per key.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use chrono::{Duration, Utc};
use dispatch_shared::apikey::{parse_bearer, verify_secret};
use dispatch_shared::ids::OrganizationId;

use crate::error::ApiError;
use crate::state::{AppState, CachedApiKey};

const LAST_USED_DEBOUNCE: Duration = Duration::minutes(5);

/// Attached to the request by [`require_api_key`] so downstream handlers
/// know which organization the caller authenticated as.
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub organization_id: OrganizationId,
}

pub async fn require_api_key(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header_value = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| dispatch_shared::DispatchError::Unauthorized("missing Authorization header".into()))?;

    let (key_id, secret) = parse_bearer(header_value)
        .ok_or_else(|| dispatch_shared::DispatchError::Unauthorized("malformed bearer token".into()))?;

    let cached = match state.api_key_cache.get(key_id).await {
        Some(entry) => entry,
        None => {
            let row = state
                .store
                .find_api_key_by_key_id(key_id)
                .await?
                .ok_or_else(|| dispatch_shared::DispatchError::Unauthorized("unknown api key".into()))?;
            let entry = CachedApiKey {
                id: row.id,
                organization_id: row.organization_id,
                key_hash: row.key_hash,
                last_touched_at: row.last_used_at,
            };
            state.api_key_cache.insert(key_id.to_string(), entry.clone()).await;
            entry
        }
    };

    if !verify_secret(&secret, &cached.key_hash) {
        return Err(dispatch_shared::DispatchError::Unauthorized("invalid api key secret".into()).into());
    }

    let now = Utc::now();
    let needs_touch = cached
        .last_touched_at
        .map(|last| now - last >= LAST_USED_DEBOUNCE)
        .unwrap_or(true);
    if needs_touch {
        let store = state.store.clone();
        let id = cached.id;
        let mut refreshed = cached.clone();
        refreshed.last_touched_at = Some(now);
        state.api_key_cache.insert(key_id.to_string(), refreshed).await;
        // Fire-and-forget per spec.md §5: the request path never waits on this write.
        tokio::spawn(async move {
            let _ = store.touch_api_key_last_used(id, now).await;
        });
    }

    request.extensions_mut().insert(AuthContext {
        organization_id: cached.organization_id,
    });

    Ok(next.run(request).await)
}
