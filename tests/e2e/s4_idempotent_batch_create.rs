//! S4 - Idempotent create (spec.md §8): two concurrent batch-create POSTs
//! with the same `Idempotency-Key` and body produce exactly one batch and
//! byte-identical responses.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use dispatch_shared::ids::ApiKeyId;
use dispatch_store::Store;
use dispatch_store::MIGRATOR;
use std::sync::Arc;
use tower::ServiceExt;

use crate::common::seed_org;

#[sqlx::test(migrator = "MIGRATOR")]
async fn concurrent_batch_create_with_same_key_is_applied_once(pool: sqlx::PgPool) {
    let store = Arc::new(Store::new(pool));
    let now = chrono::Utc::now();
    let org_id = seed_org(&store, dispatch_shared::types::Tier::Free, now).await;

    let new_key = dispatch_shared::apikey::generate();
    store.create_api_key(ApiKeyId::new(), org_id, "ci", &new_key.key_id, &new_key.key_hash).await.unwrap();
    let auth_header = format!("Bearer {}.{}", new_key.key_id, secrecy::ExposeSecret::expose_secret(&new_key.secret));

    let config = Arc::new(dispatch_shared::config::DispatchConfig::default());
    let state = dispatch_api::state::AppState::new(store.clone(), config);
    let router = dispatch_api::router(state);

    let body = serde_json::json!({
        "items": [
            {"name": "a", "url": "https://x.test/a", "schedule_type": "once", "scheduled_at": now},
            {"name": "b", "url": "https://x.test/b", "schedule_type": "once", "scheduled_at": now},
        ]
    });
    let body_bytes = serde_json::to_vec(&body).unwrap();

    let make_request = || {
        Request::builder()
            .method("POST")
            .uri("/api/v1/tasks/batch")
            .header("Authorization", &auth_header)
            .header("Idempotency-Key", "batch-1")
            .header("Content-Type", "application/json")
            .body(Body::from(body_bytes.clone()))
            .unwrap()
    };

    let (resp_a, resp_b) = tokio::join!(router.clone().oneshot(make_request()), router.clone().oneshot(make_request()),);
    let resp_a = resp_a.unwrap();
    let resp_b = resp_b.unwrap();
    assert_eq!(resp_a.status(), StatusCode::CREATED);
    assert_eq!(resp_b.status(), StatusCode::CREATED);

    let bytes_a = to_bytes(resp_a.into_body(), 1024 * 1024).await.unwrap();
    let bytes_b = to_bytes(resp_b.into_body(), 1024 * 1024).await.unwrap();
    assert_eq!(bytes_a, bytes_b);

    let tasks = store.list_tasks(org_id).await.unwrap();
    assert_eq!(tasks.len(), 2);
}
