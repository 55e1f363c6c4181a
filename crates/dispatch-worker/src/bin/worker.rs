//! The `dispatch-worker` binary: runs a fixed-size pool of claim-dispatch
//! loops against the shared execution queue until interrupted.

use dispatch_shared::config::DispatchConfig;
use dispatch_store::Store;
use dispatch_worker::{pool, LoggingSink};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    dispatch_shared::logging::init(std::env::var("LOG_FORMAT").as_deref() == Ok("json"));

    let config = DispatchConfig::load()?;
    let pool_handle = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .map_err(|err| {
            error!(error = %err, "failed to connect to database");
            err
        })?;
    let store = Arc::new(Store::new(pool_handle));
    let http = Arc::new(reqwest::Client::new());
    let sink: Arc<dyn dispatch_worker::Sink> = Arc::new(LoggingSink);
    let pool_config = Arc::new(pool::PoolConfig::from_worker_config(
        &config.worker,
        config.notifier.throttle_window_s,
        config.ssrf.allowlist.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    info!(worker_count = config.worker.worker_count, "dispatch-worker starting");

    let run = pool::run(store, http, sink, pool_config, shutdown_rx);
    tokio::pin!(run);

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("shutdown signal received");
            shutdown_tx.send(true).ok();
        }
        _ = &mut run => {}
    }

    run.await;
    Ok(())
}
