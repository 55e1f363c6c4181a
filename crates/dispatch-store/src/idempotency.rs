//! The idempotency primitive backing the API middleware (spec.md §4.8).
//!
//! `get_or_create_idempotency` relies on the `(organization_id, key)`
//! primary key to make "first writer wins" atomic: the first caller's
//! `INSERT` succeeds and returns `Created(None)` (no result yet); every
//! concurrent duplicate gets `Existing` back immediately and polls (in the
//! API layer) until a result is written or `idempotency_wait_ms` elapses.

use crate::models::IdempotencyRecord;
use crate::Store;
use chrono::{DateTime, Utc};
use dispatch_shared::error::DispatchError;
use dispatch_shared::ids::OrganizationId;
use serde_json::Value as Json;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyClaim {
    /// This caller created the placeholder row and should run the handler.
    Created,
    /// Another caller already holds the placeholder. `result` is `Some` if
    /// it has since finished, `None` if still in flight.
    Existing { result: Option<(i32, Json)> },
}

impl Store {
    pub async fn get_or_create_idempotency(
        &self,
        organization_id: OrganizationId,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<IdempotencyClaim, DispatchError> {
        let inserted = sqlx::query(
            "INSERT INTO idempotency_records (organization_id, key, inserted_at) VALUES ($1, $2, $3)
             ON CONFLICT (organization_id, key) DO NOTHING",
        )
        .bind(organization_id)
        .bind(key)
        .bind(now)
        .execute(self.pool())
        .await?;

        if inserted.rows_affected() == 1 {
            return Ok(IdempotencyClaim::Created);
        }

        let record = self.get_idempotency(organization_id, key).await?;
        let result = match (record.status_code, record.response_body) {
            (Some(code), Some(body)) => Some((code, body)),
            _ => None,
        };
        Ok(IdempotencyClaim::Existing { result })
    }

    pub async fn get_idempotency(
        &self,
        organization_id: OrganizationId,
        key: &str,
    ) -> Result<IdempotencyRecord, DispatchError> {
        sqlx::query_as::<_, IdempotencyRecord>(
            "SELECT organization_id, key, status_code, response_body, inserted_at
             FROM idempotency_records WHERE organization_id = $1 AND key = $2",
        )
        .bind(organization_id)
        .bind(key)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DispatchError::not_found("idempotency_record", key))
    }

    pub async fn put_idempotency_result(
        &self,
        organization_id: OrganizationId,
        key: &str,
        status_code: i32,
        response_body: &Json,
    ) -> Result<(), DispatchError> {
        sqlx::query(
            "UPDATE idempotency_records SET status_code = $3, response_body = $4
             WHERE organization_id = $1 AND key = $2",
        )
        .bind(organization_id)
        .bind(key)
        .bind(status_code)
        .bind(response_body)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
