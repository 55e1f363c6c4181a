//! Throttle bookkeeping for the notifier sink (C10, spec.md §4.6).

use crate::Store;
use chrono::{DateTime, Utc};
use dispatch_shared::error::DispatchError;
use dispatch_shared::ids::OrganizationId;
use uuid::Uuid;

impl Store {
    /// Count of deliveries for `(org, resource, event_type)` sent since
    /// `since`, used to enforce at-most-one-per-`throttle_window`.
    pub async fn count_recent_notifications(
        &self,
        organization_id: OrganizationId,
        resource_type: &str,
        resource_id: Uuid,
        event_type: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, DispatchError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"SELECT COUNT(*) FROM notification_sends
               WHERE organization_id = $1 AND resource_type = $2 AND resource_id = $3
                 AND event_type = $4 AND sent_at >= $5"#,
        )
        .bind(organization_id)
        .bind(resource_type)
        .bind(resource_id)
        .bind(event_type)
        .bind(since)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }

    pub async fn record_notification_sent(
        &self,
        organization_id: OrganizationId,
        resource_type: &str,
        resource_id: Uuid,
        event_type: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        sqlx::query(
            "INSERT INTO notification_sends (id, organization_id, resource_type, resource_id, event_type, sent_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::now_v7())
        .bind(organization_id)
        .bind(resource_type)
        .bind(resource_id)
        .bind(event_type)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
