//! The `dispatch-scheduler` binary: runs the scheduler tick and monitor
//! watchdog sweep on the leader instance, reacquiring leadership if lost.

use dispatch_scheduler::{scheduler, wake, watchdog, LeaderLock, SchedulerTickConfig};
use dispatch_scheduler::watchdog::WatchdogEvent;
use dispatch_shared::config::DispatchConfig;
use dispatch_store::Store;
use dispatch_worker::{notifier::notify_monitor_event, LoggingSink, NotifyEvent};
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    dispatch_shared::logging::init(std::env::var("LOG_FORMAT").as_deref() == Ok("json"));

    let config = DispatchConfig::load()?;
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .map_err(|err| {
            error!(error = %err, "failed to connect to database");
            err
        })?;
    dispatch_store::MIGRATOR.run(&pool).await?;
    let store = Store::new(pool.clone());

    let mut leader_lock = LeaderLock::new(pool.clone());
    let mut listener = wake::new_listener(&pool).await?;
    let tick_interval = Duration::from_millis(config.scheduler.tick_interval_ms);
    let tick_config = SchedulerTickConfig {
        horizon_s: config.scheduler.horizon_s,
        missed_fire_threshold_s: config.scheduler.missed_fire_threshold_s,
    };
    let sink = LoggingSink;

    info!("dispatch-scheduler starting");

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("shutdown signal received");
                leader_lock.release().await.ok();
                break;
            }
            _ = run_tick_cycle(&store, &mut leader_lock, &mut listener, tick_interval, tick_config, &config, &sink) => {}
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_tick_cycle(
    store: &Store,
    leader_lock: &mut LeaderLock,
    listener: &mut sqlx::postgres::PgListener,
    tick_interval: Duration,
    tick_config: SchedulerTickConfig,
    config: &DispatchConfig,
    sink: &LoggingSink,
) {
    match leader_lock.try_acquire().await {
        Ok(true) => {
            let now = chrono::Utc::now();
            let report = scheduler::tick(store, now, tick_config).await;
            if report.materialized > 0 || report.errors > 0 {
                info!(
                    materialized = report.materialized,
                    caught_up = report.caught_up,
                    errors = report.errors,
                    "scheduler tick complete"
                );
            }

            let events = watchdog::sweep(store, now).await;
            for event in events {
                info!(?event, "watchdog event");
                deliver_watchdog_event(store, sink, config.notifier.throttle_window_s, event, now).await;
            }

            match store.reap_stuck_running(now, config.worker.stuck_running_threshold_s).await {
                Ok(reaped) if !reaped.is_empty() => {
                    warn!(count = reaped.len(), "reaped executions stuck in running past the threshold");
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "failed to reap stuck running executions"),
            }
        }
        Ok(false) => {
            // Not the leader this cycle; just wait out the tick interval.
        }
        Err(err) => {
            warn!(error = %err, "leader lock check failed, backing off");
        }
    }

    wake::sleep_or_wake(listener, tick_interval).await;
}

/// Loads the monitor and its organization fresh (the event only carries an
/// id) and hands the down/recovery transition to the same notifier path
/// task failure/recovery uses.
async fn deliver_watchdog_event(store: &Store, sink: &LoggingSink, throttle_window_s: i64, event: WatchdogEvent, now: chrono::DateTime<chrono::Utc>) {
    let (monitor_id, notify_event) = match event {
        WatchdogEvent::Failure { monitor_id } => (monitor_id, NotifyEvent::Failure),
        WatchdogEvent::Recovery { monitor_id } => (monitor_id, NotifyEvent::Recovery),
    };

    let monitor = match store.get_monitor(monitor_id).await {
        Ok(monitor) => monitor,
        Err(err) => {
            warn!(%monitor_id, error = %err, "failed to load monitor for watchdog notification");
            return;
        }
    };
    let org = match store.get_organization(monitor.organization_id).await {
        Ok(org) => org,
        Err(err) => {
            warn!(%monitor_id, error = %err, "failed to load organization for watchdog notification");
            return;
        }
    };

    if let Err(err) = notify_monitor_event(store, sink, throttle_window_s, &monitor, &org, notify_event, now).await {
        warn!(%monitor_id, error = %err, "failed to deliver watchdog notification");
    }
}
