//! `/healthz` and `/readyz`, grounded on the teacher's circuit-breaker-gated
//! database health evaluator.

use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use dispatch_shared::resilience::CircuitBreakerBehavior;
use serde_json::json;

use crate::state::AppState;

const QUERY_TIMEOUT_MS: u64 = 1_000;

pub async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let breaker = &state.db_health;

    if !breaker.should_allow() {
        let metrics = breaker.metrics();
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unavailable",
                "circuit_breaker_open": true,
                "consecutive_failures": metrics.consecutive_failures,
            })),
        );
    }

    let start = Instant::now();
    let check = tokio::time::timeout(
        Duration::from_millis(QUERY_TIMEOUT_MS),
        sqlx::query("SELECT 1").execute(state.store.pool()),
    )
    .await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match check {
        Ok(Ok(_)) => {
            breaker.record_success();
            (
                StatusCode::OK,
                Json(json!({ "status": "ok", "db_check_ms": duration_ms })),
            )
        }
        Ok(Err(e)) => {
            breaker.record_failure();
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "error": e.to_string() })),
            )
        }
        Err(_elapsed) => {
            breaker.record_failure();
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "error": "db health check timed out" })),
            )
        }
    }
}
