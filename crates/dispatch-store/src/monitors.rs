//! Monitor watchdog persistence (spec.md §4.7).

use crate::models::{Monitor, MonitorPing};
use crate::Store;
use chrono::{DateTime, Utc};
use dispatch_shared::error::DispatchError;
use dispatch_shared::ids::{MonitorId, MonitorPingId, OrganizationId};
use dispatch_shared::types::MonitorStatus;

const MONITOR_COLUMNS: &str = "id, organization_id, name, ping_token, schedule_type,
    interval_seconds, cron_expression, grace_period_seconds, status, enabled, last_ping_at,
    next_expected_at, notify_on_failure, notify_on_recovery";

impl Store {
    #[allow(clippy::too_many_arguments)]
    pub async fn create_monitor(
        &self,
        id: MonitorId,
        organization_id: OrganizationId,
        name: &str,
        ping_token: &str,
        interval_seconds: Option<i32>,
        cron_expression: Option<&str>,
        grace_period_seconds: i32,
    ) -> Result<Monitor, DispatchError> {
        let schedule_type = if cron_expression.is_some() { "cron" } else { "interval" };
        sqlx::query_as::<_, Monitor>(&format!(
            r#"INSERT INTO monitors (id, organization_id, name, ping_token, schedule_type,
                   interval_seconds, cron_expression, grace_period_seconds)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING {MONITOR_COLUMNS}"#
        ))
        .bind(id)
        .bind(organization_id)
        .bind(name)
        .bind(ping_token)
        .bind(schedule_type)
        .bind(interval_seconds)
        .bind(cron_expression)
        .bind(grace_period_seconds)
        .fetch_one(self.pool())
        .await
        .map_err(DispatchError::from)
    }

    pub async fn get_monitor_by_token(&self, ping_token: &str) -> Result<Monitor, DispatchError> {
        sqlx::query_as::<_, Monitor>(&format!(
            "SELECT {MONITOR_COLUMNS} FROM monitors WHERE ping_token = $1"
        ))
        .bind(ping_token)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DispatchError::not_found("monitor", ping_token))
    }

    pub async fn get_monitor(&self, id: MonitorId) -> Result<Monitor, DispatchError> {
        sqlx::query_as::<_, Monitor>(&format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DispatchError::not_found("monitor", id.to_string()))
    }

    pub async fn set_monitor_enabled(&self, id: MonitorId, enabled: bool) -> Result<Monitor, DispatchError> {
        sqlx::query_as::<_, Monitor>(&format!(
            "UPDATE monitors SET enabled = $2 WHERE id = $1 RETURNING {MONITOR_COLUMNS}"
        ))
        .bind(id)
        .bind(enabled)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DispatchError::not_found("monitor", id.to_string()))
    }

    pub async fn delete_monitor(&self, id: MonitorId) -> Result<(), DispatchError> {
        let result = sqlx::query("DELETE FROM monitors WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(DispatchError::not_found("monitor", id.to_string()));
        }
        Ok(())
    }

    pub async fn list_monitors(&self, organization_id: OrganizationId) -> Result<Vec<Monitor>, DispatchError> {
        sqlx::query_as::<_, Monitor>(&format!(
            "SELECT {MONITOR_COLUMNS} FROM monitors WHERE organization_id = $1 ORDER BY id"
        ))
        .bind(organization_id)
        .fetch_all(self.pool())
        .await
        .map_err(DispatchError::from)
    }

    /// Monitors whose grace period has expired (spec.md §4.7): `enabled`,
    /// `status IN (new, up)`, and `next_expected_at + grace < now`.
    pub async fn list_overdue_monitors(&self, now: DateTime<Utc>) -> Result<Vec<Monitor>, DispatchError> {
        sqlx::query_as::<_, Monitor>(&format!(
            r#"SELECT {MONITOR_COLUMNS} FROM monitors
               WHERE enabled AND status IN ('new', 'up')
                 AND next_expected_at IS NOT NULL
                 AND next_expected_at + make_interval(secs => grace_period_seconds) < $1"#
        ))
        .bind(now)
        .fetch_all(self.pool())
        .await
        .map_err(DispatchError::from)
    }

    pub async fn transition_monitor(
        &self,
        id: MonitorId,
        to: MonitorStatus,
    ) -> Result<Monitor, DispatchError> {
        sqlx::query_as::<_, Monitor>(&format!(
            "UPDATE monitors SET status = $2 WHERE id = $1 RETURNING {MONITOR_COLUMNS}"
        ))
        .bind(id)
        .bind(to)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DispatchError::not_found("monitor", id.to_string()))
    }

    /// Records an incoming heartbeat (spec.md §4.7): advances
    /// `next_expected_at`, flips `down -> up` if applicable, and snapshots
    /// `expected_interval_seconds` on the ping row for timeline
    /// reconstruction. Returns the monitor's status *before* this ping so
    /// the caller can decide whether to emit a recovery event.
    pub async fn record_ping(
        &self,
        ping_token: &str,
        now: DateTime<Utc>,
    ) -> Result<(Monitor, MonitorStatus), DispatchError> {
        let monitor = self.get_monitor_by_token(ping_token).await?;
        let previous_status = monitor.status;

        let interval_seconds = match monitor.interval_seconds {
            Some(s) => s,
            None => {
                // cron schedule: derive the gap until the next fire from
                // now, snapshotted for this ping's historical record.
                let expr = monitor
                    .cron_expression
                    .as_deref()
                    .ok_or_else(|| DispatchError::Internal("cron monitor missing cron_expression".to_string()))?;
                let next = dispatch_shared::cron::next(expr, now + chrono::Duration::seconds(1))?;
                (next - now).num_seconds().max(0) as i32
            }
        };

        let next_expected_at = match monitor.interval_seconds {
            Some(interval) => now + chrono::Duration::seconds(interval as i64),
            None => {
                let expr = monitor
                    .cron_expression
                    .as_deref()
                    .ok_or_else(|| DispatchError::Internal("cron monitor missing cron_expression".to_string()))?;
                dispatch_shared::cron::next(expr, now + chrono::Duration::seconds(1))?
            }
        };

        let new_status = if previous_status == MonitorStatus::Down {
            MonitorStatus::Up
        } else {
            previous_status
        };

        let updated = sqlx::query_as::<_, Monitor>(&format!(
            r#"UPDATE monitors SET last_ping_at = $2, next_expected_at = $3, status = $4
               WHERE id = $1 RETURNING {MONITOR_COLUMNS}"#
        ))
        .bind(monitor.id)
        .bind(now)
        .bind(next_expected_at)
        .bind(new_status)
        .fetch_one(self.pool())
        .await?;

        sqlx::query(
            "INSERT INTO monitor_pings (id, monitor_id, received_at, expected_interval_seconds) VALUES ($1, $2, $3, $4)",
        )
        .bind(MonitorPingId::new())
        .bind(monitor.id)
        .bind(now)
        .bind(interval_seconds)
        .execute(self.pool())
        .await?;

        Ok((updated, previous_status))
    }

    pub async fn list_pings(&self, monitor_id: MonitorId) -> Result<Vec<MonitorPing>, DispatchError> {
        sqlx::query_as::<_, MonitorPing>(
            "SELECT id, monitor_id, received_at, expected_interval_seconds FROM monitor_pings WHERE monitor_id = $1 ORDER BY received_at",
        )
        .bind(monitor_id)
        .fetch_all(self.pool())
        .await
        .map_err(DispatchError::from)
    }
}
