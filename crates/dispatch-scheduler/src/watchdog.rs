//! The monitor watchdog (C9, spec.md §4.7): runs under the same leader
//! lock and tick as the scheduler, transitioning overdue monitors to
//! `down` and emitting notifier events.

use chrono::{DateTime, Utc};
use dispatch_shared::ids::MonitorId;
use dispatch_shared::types::MonitorStatus;
use dispatch_store::Store;
use tracing::{info, warn};

/// A domain event the caller hands off to the notifier (C10). Kept as a
/// plain enum here rather than calling into `dispatch-worker` directly, so
/// `dispatch-scheduler` never depends on the worker crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchdogEvent {
    Failure { monitor_id: MonitorId },
    Recovery { monitor_id: MonitorId },
}

pub async fn sweep(store: &Store, now: DateTime<Utc>) -> Vec<WatchdogEvent> {
    let mut events = Vec::new();

    let overdue = match store.list_overdue_monitors(now).await {
        Ok(monitors) => monitors,
        Err(err) => {
            warn!(error = %err, "failed to list overdue monitors");
            return events;
        }
    };

    for monitor in overdue {
        match store.transition_monitor(monitor.id, MonitorStatus::Down).await {
            Ok(_) => {
                info!(monitor_id = %monitor.id, "monitor transitioned to down");
                events.push(WatchdogEvent::Failure { monitor_id: monitor.id });
            }
            Err(err) => warn!(monitor_id = %monitor.id, error = %err, "failed to transition monitor to down"),
        }
    }

    events
}

/// Handles an inbound ping (spec.md §4.7): the actual ping-recording logic
/// lives in `Store::record_ping`; this wraps it to produce the recovery
/// event the notifier needs when the monitor had been down.
pub async fn handle_ping(store: &Store, ping_token: &str, now: DateTime<Utc>) -> Result<Option<WatchdogEvent>, dispatch_shared::error::DispatchError> {
    let (monitor, previous_status) = store.record_ping(ping_token, now).await?;
    if previous_status == MonitorStatus::Down {
        Ok(Some(WatchdogEvent::Recovery { monitor_id: monitor.id }))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_shared::ids::OrganizationId;
    use dispatch_shared::types::Tier;
    use dispatch_store::MIGRATOR;

    #[sqlx::test(migrator = "MIGRATOR")]
    async fn sweep_transitions_overdue_monitor_and_emits_failure(pool: sqlx::PgPool) {
        let store = Store::new(pool);
        let org_id = OrganizationId::new();
        store.create_organization(org_id, Tier::Free, "secret", Utc::now()).await.unwrap();
        let monitor = store
            .create_monitor(MonitorId::new(), org_id, "hb", "tok1", Some(60), None, 30)
            .await
            .unwrap();
        let t0 = Utc::now();
        sqlx::query("UPDATE monitors SET last_ping_at = $2, next_expected_at = $3, status = 'up' WHERE id = $1")
            .bind(monitor.id)
            .bind(t0)
            .bind(t0 + chrono::Duration::seconds(60))
            .execute(store.pool())
            .await
            .unwrap();

        let events = sweep(&store, t0 + chrono::Duration::seconds(91)).await;
        assert_eq!(events, vec![WatchdogEvent::Failure { monitor_id: monitor.id }]);

        let event = handle_ping(&store, "tok1", t0 + chrono::Duration::seconds(120)).await.unwrap();
        assert_eq!(event, Some(WatchdogEvent::Recovery { monitor_id: monitor.id }));
    }
}
