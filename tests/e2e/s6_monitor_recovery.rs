//! S6 - Monitor down then recovery (spec.md §8): an overdue heartbeat
//! monitor is swept to `down`, and a ping after that transitions it back
//! to `up`, recording a recovery event exactly once and advancing the
//! monitor's schedule from the ping instant rather than the original one.

use chrono::Utc;
use dispatch_scheduler::watchdog::{handle_ping, sweep, WatchdogEvent};
use dispatch_shared::ids::MonitorId;
use dispatch_shared::types::MonitorStatus;
use dispatch_store::Store;
use dispatch_store::MIGRATOR;

use crate::common::seed_org;

#[sqlx::test(migrator = "MIGRATOR")]
async fn down_monitor_recovers_on_next_ping(pool: sqlx::PgPool) {
    let store = Store::new(pool);
    let t0 = Utc::now();
    let org_id = seed_org(&store, dispatch_shared::types::Tier::Free, t0).await;

    let monitor = store.create_monitor(MonitorId::new(), org_id, "heartbeat", "ping-tok", Some(60), None, 30).await.unwrap();
    sqlx::query("UPDATE monitors SET last_ping_at = $2, next_expected_at = $3, status = 'up' WHERE id = $1")
        .bind(monitor.id)
        .bind(t0)
        .bind(t0 + chrono::Duration::seconds(60))
        .execute(store.pool())
        .await
        .unwrap();

    let t_overdue = t0 + chrono::Duration::seconds(91);
    let events = sweep(&store, t_overdue).await;
    assert_eq!(events, vec![WatchdogEvent::Failure { monitor_id: monitor.id }]);
    let down = store.get_monitor(monitor.id).await.unwrap();
    assert_eq!(down.status, MonitorStatus::Down);

    // a second sweep before any ping must not re-emit the failure event
    let repeat = sweep(&store, t_overdue + chrono::Duration::seconds(1)).await;
    assert!(repeat.is_empty());

    let t_ping = t0 + chrono::Duration::seconds(120);
    let event = handle_ping(&store, "ping-tok", t_ping).await.unwrap();
    assert_eq!(event, Some(WatchdogEvent::Recovery { monitor_id: monitor.id }));

    let recovered = store.get_monitor(monitor.id).await.unwrap();
    assert_eq!(recovered.status, MonitorStatus::Up);
    assert_eq!(recovered.next_expected_at, Some(t0 + chrono::Duration::seconds(180)));

    let pings = store.list_pings(monitor.id).await.unwrap();
    let latest = pings.iter().find(|p| p.received_at == t_ping).expect("ping row recorded");
    assert_eq!(latest.expected_interval_seconds, 60);
}
