//! S5 - Endpoint fan-out (spec.md §8): an inbound POST against a
//! multi-target endpoint records the event, materializes one pending
//! execution per target ordered through the queue, and replay
//! re-materializes exactly one fresh execution per still-live task.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use dispatch_shared::ids::{ApiKeyId, EndpointId};
use dispatch_store::Store;
use dispatch_store::MIGRATOR;
use std::sync::Arc;
use tower::ServiceExt;

use crate::common::seed_org;

#[sqlx::test(migrator = "MIGRATOR")]
async fn inbound_fans_out_and_replay_recreates_executions(pool: sqlx::PgPool) {
    let store = Arc::new(Store::new(pool));
    let now = chrono::Utc::now();
    let org_id = seed_org(&store, dispatch_shared::types::Tier::Free, now).await;

    let forward_urls = vec!["https://a.test/".to_string(), "https://b.test/".to_string()];
    let endpoint = store.create_endpoint(EndpointId::new(), org_id, "fanout", "fanout-slug", &forward_urls, true, 5).await.unwrap();

    let config = Arc::new(dispatch_shared::config::DispatchConfig::default());
    let state = dispatch_api::state::AppState::new(store.clone(), config);
    let router = dispatch_api::router(state);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/in/{}", endpoint.slug))
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"hello":"world"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let events = sqlx::query_as::<_, (dispatch_shared::ids::InboundEventId,)>(
        "SELECT id FROM inbound_events WHERE endpoint_id = $1",
    )
    .bind(endpoint.id)
    .fetch_all(store.pool())
    .await
    .unwrap();
    assert_eq!(events.len(), 1);
    let event_id = events[0].0;

    let event = store.get_inbound_event(event_id).await.unwrap();
    assert_eq!(event.task_ids.len(), 2);

    let pending = sqlx::query_as::<_, (dispatch_shared::ids::TaskId,)>(
        "SELECT task_id FROM executions WHERE organization_id = $1 AND status = 'pending' ORDER BY id",
    )
    .bind(org_id)
    .fetch_all(store.pool())
    .await
    .unwrap();
    assert_eq!(pending.len(), 2);

    let first_claim = store.claim_next_execution(now + chrono::Duration::minutes(1), 32, 4).await.unwrap().expect("first target claimable");
    assert_eq!(first_claim.task_id, event.task_ids[0]);
    let second_claim = store.claim_next_execution(now + chrono::Duration::minutes(1), 32, 4).await.unwrap();
    assert!(second_claim.is_none(), "second target blocked while first runs in the same queue");

    let new_key = dispatch_shared::apikey::generate();
    store.create_api_key(ApiKeyId::new(), org_id, "ci", &new_key.key_id, &new_key.key_hash).await.unwrap();
    let auth_header = format!("Bearer {}.{}", new_key.key_id, secrecy::ExposeSecret::expose_secret(&new_key.secret));

    let config = Arc::new(dispatch_shared::config::DispatchConfig::default());
    let state = dispatch_api::state::AppState::new(store.clone(), config);
    let router = dispatch_api::router(state);
    let replay_response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/v1/endpoints/events/{event_id}/replay"))
                .header("Authorization", &auth_header)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(replay_response.status(), StatusCode::ACCEPTED);
    let body = to_bytes(replay_response.into_body(), 1024 * 1024).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["data"]["replayed"], 2);
}
