//! Organization CRUD and the monthly quota counters (C11).

use crate::models::Organization;
use crate::Store;
use chrono::{DateTime, Utc};
use dispatch_shared::error::DispatchError;
use dispatch_shared::ids::OrganizationId;
use dispatch_shared::types::Tier;

impl Store {
    pub async fn get_organization(&self, id: OrganizationId) -> Result<Organization, DispatchError> {
        sqlx::query_as::<_, Organization>(
            r#"SELECT id, tier, webhook_secret, exec_count, reset_at, warning_sent_at,
                      reached_sent_at, notify_on_failure, notify_on_recovery, email, webhook_url
               FROM organizations WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DispatchError::not_found("organization", id.to_string()))
    }

    pub async fn create_organization(
        &self,
        id: OrganizationId,
        tier: Tier,
        webhook_secret: &str,
        now: DateTime<Utc>,
    ) -> Result<Organization, DispatchError> {
        sqlx::query_as::<_, Organization>(
            r#"INSERT INTO organizations (id, tier, webhook_secret, reset_at)
               VALUES ($1, $2, $3, $4)
               RETURNING id, tier, webhook_secret, exec_count, reset_at, warning_sent_at,
                         reached_sent_at, notify_on_failure, notify_on_recovery, email, webhook_url"#,
        )
        .bind(id)
        .bind(tier)
        .bind(webhook_secret)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(DispatchError::from)
    }

    /// Increments the org's monthly execution counter by `delta`, returning
    /// the new count. Only called for attempt-1 terminal outcomes (spec.md
    /// §4.4 step 7).
    pub async fn bump_monthly_counter(
        &self,
        org_id: OrganizationId,
        delta: i64,
    ) -> Result<i64, DispatchError> {
        let (new_count,): (i64,) = sqlx::query_as(
            "UPDATE organizations SET exec_count = exec_count + $2 WHERE id = $1 RETURNING exec_count",
        )
        .bind(org_id)
        .bind(delta)
        .fetch_one(self.pool())
        .await?;
        Ok(new_count)
    }

    pub async fn mark_warning_sent(&self, org_id: OrganizationId, now: DateTime<Utc>) -> Result<(), DispatchError> {
        sqlx::query("UPDATE organizations SET warning_sent_at = $2 WHERE id = $1")
            .bind(org_id)
            .bind(now)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn mark_reached_sent(&self, org_id: OrganizationId, now: DateTime<Utc>) -> Result<(), DispatchError> {
        sqlx::query("UPDATE organizations SET reached_sent_at = $2 WHERE id = $1")
            .bind(org_id)
            .bind(now)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Monthly reset (spec.md §4.9): leader-only periodic job that zeroes
    /// the counter and clears the sent-flags for every org whose `reset_at`
    /// month has rolled over relative to `now`.
    pub async fn reset_monthly_counters(&self, now: DateTime<Utc>) -> Result<u64, DispatchError> {
        let result = sqlx::query(
            r#"UPDATE organizations
               SET exec_count = 0, warning_sent_at = NULL, reached_sent_at = NULL, reset_at = $1
               WHERE date_trunc('month', reset_at) <> date_trunc('month', $1::timestamptz)"#,
        )
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }
}
