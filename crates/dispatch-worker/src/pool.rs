//! The worker pool loop (C6, spec.md §4.4 step 1, §5): N independent
//! tokio tasks each polling `claim_next_execution` in a tight loop,
//! falling back to a timed sleep when nothing is claimable. Grounded on
//! the teacher's fixed-size worker pool, generalized from a message-queue
//! consumer to an HTTP dispatch loop.

use crate::dispatch::{self, WorkerContext};
use dispatch_shared::config::WorkerConfig;
use dispatch_store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

pub struct PoolConfig {
    pub worker_count: usize,
    pub poll_interval_ms: u64,
    pub max_response_capture: usize,
    pub retry_backoff_base_s: u64,
    pub retry_backoff_max_s: u64,
    pub retry_jitter: f64,
    pub throttle_window_s: i64,
    pub org_concurrency_cap_free: i32,
    pub org_concurrency_cap_pro: i32,
    pub ssrf_allowlist: Vec<String>,
}

impl PoolConfig {
    pub fn from_worker_config(worker: &WorkerConfig, notifier_throttle_window_s: i64, ssrf_allowlist: Vec<String>) -> Self {
        Self {
            worker_count: worker.worker_count,
            poll_interval_ms: worker.poll_interval_ms,
            max_response_capture: worker.max_response_capture,
            retry_backoff_base_s: worker.retry_backoff_base_s,
            retry_backoff_max_s: worker.retry_backoff_max_s,
            retry_jitter: worker.retry_jitter,
            throttle_window_s: notifier_throttle_window_s,
            org_concurrency_cap_free: worker.org_concurrency_cap_free,
            org_concurrency_cap_pro: worker.org_concurrency_cap_pro,
            ssrf_allowlist,
        }
    }
}

/// Runs `config.worker_count` claim-dispatch loops until `shutdown` fires.
/// Each loop is independent; a panic or error in one claim/dispatch cycle
/// is logged and does not bring down its sibling workers.
pub async fn run(
    store: Arc<Store>,
    http: Arc<reqwest::Client>,
    sink: Arc<dyn crate::notifier::Sink>,
    config: Arc<PoolConfig>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut handles = Vec::with_capacity(config.worker_count);
    for worker_id in 0..config.worker_count {
        let store = store.clone();
        let http = http.clone();
        let sink = sink.clone();
        let config = config.clone();
        let mut shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            worker_loop(worker_id, store, http, sink, config, &mut shutdown).await;
        }));
    }

    shutdown.changed().await.ok();
    for handle in handles {
        let _ = handle.await;
    }
}

async fn worker_loop(
    worker_id: usize,
    store: Arc<Store>,
    http: Arc<reqwest::Client>,
    sink: Arc<dyn crate::notifier::Sink>,
    config: Arc<PoolConfig>,
    shutdown: &mut watch::Receiver<bool>,
) {
    info!(worker_id, "worker loop started");
    loop {
        if *shutdown.borrow() {
            break;
        }

        let now = chrono::Utc::now();
        let claimed = store
            .claim_next_execution(now, config.org_concurrency_cap_pro, config.org_concurrency_cap_free)
            .await;

        match claimed {
            Ok(Some(execution)) => {
                let ctx = WorkerContext {
                    store: &store,
                    http: &http,
                    sink: sink.as_ref(),
                    ssrf_allowlist: &config.ssrf_allowlist,
                    max_response_capture: config.max_response_capture,
                    retry_backoff_base_s: config.retry_backoff_base_s,
                    retry_backoff_max_s: config.retry_backoff_max_s,
                    retry_jitter: config.retry_jitter,
                    throttle_window_s: config.throttle_window_s,
                };
                let execution_id = execution.id;
                if let Err(err) = dispatch::perform(&ctx, execution).await {
                    error!(worker_id, %execution_id, error = %err, "execution dispatch failed");
                }
            }
            Ok(None) => {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)) => {}
                    _ = shutdown.changed() => {}
                }
            }
            Err(err) => {
                warn!(worker_id, error = %err, "claim_next_execution failed, backing off");
                tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)).await;
            }
        }
    }
    info!(worker_id, "worker loop stopped");
}
