//! The `dispatch-api` binary: binds the HTTP ingress and serves until
//! interrupted.

use dispatch_shared::config::DispatchConfig;
use dispatch_store::Store;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    dispatch_shared::logging::init(std::env::var("LOG_FORMAT").as_deref() == Ok("json"));

    let config = Arc::new(DispatchConfig::load()?);
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .map_err(|err| {
            error!(error = %err, "failed to connect to database");
            err
        })?;
    dispatch_store::MIGRATOR.run(&pool).await?;
    let store = Arc::new(Store::new(pool));

    let state = dispatch_api::state::AppState::new(store, config.clone());
    let app = dispatch_api::router(state);

    let listener = TcpListener::bind(&config.api.bind_addr).await?;
    info!(addr = %config.api.bind_addr, "dispatch-api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
