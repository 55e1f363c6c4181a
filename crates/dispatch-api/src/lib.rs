//! `dispatch-api`: the HTTP ingress (C12, spec.md §4.8, §6). Mounts the
//! public capability-based routes (`/in/{slug}`, `/ping/{token}`,
//! `/healthz`, `/readyz`) alongside the API-key-authenticated `/api/v1/*`
//! surface, and wires the auth + idempotency middleware stack in front of
//! the latter.

pub mod auth;
pub mod dto;
pub mod error;
pub mod health;
pub mod idempotency;
pub mod routes;
pub mod state;

use axum::routing::{get, patch, post, put};
use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::AppState;

pub fn router(state: AppState) -> Router {
    let api_v1 = Router::new()
        .route("/tasks", get(routes::tasks::list).post(routes::tasks::create).delete(routes::tasks::cancel_pending_in_queue))
        .route("/tasks/batch", post(routes::tasks::batch_create))
        .route("/tasks/{id}", get(routes::tasks::get).patch(routes::tasks::update).delete(routes::tasks::soft_delete))
        .route("/tasks/{id}/trigger", post(routes::tasks::trigger))
        .route("/queues", get(routes::queues::list))
        .route("/queues/{name}/pause", post(routes::queues::pause))
        .route("/queues/{name}/resume", post(routes::queues::resume))
        .route("/monitors", get(routes::monitors::list).post(routes::monitors::create))
        .route("/monitors/{id}", get(routes::monitors::get).delete(routes::monitors::delete))
        .route("/monitors/{id}/enabled", patch(routes::monitors::set_enabled))
        .route("/endpoints", get(routes::endpoints::list).post(routes::endpoints::create))
        .route("/endpoints/{id}", get(routes::endpoints::get).patch(routes::endpoints::update).delete(routes::endpoints::delete))
        .route("/endpoints/events/{id}/replay", post(routes::endpoints::replay))
        .route("/sync", put(routes::sync::sync))
        .layer(middleware::from_fn_with_state(state.clone(), idempotency::require_idempotency_key_if_present))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_api_key));

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/ping/{token}", get(routes::monitors::ping).post(routes::monitors::ping))
        .route("/in/{slug}", axum::routing::any(routes::endpoints::inbound))
        .nest("/api/v1", api_v1)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
