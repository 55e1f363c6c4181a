//! API key persistence backing the process-local cache (C3).

use crate::models::ApiKey;
use crate::Store;
use chrono::{DateTime, Utc};
use dispatch_shared::error::DispatchError;
use dispatch_shared::ids::{ApiKeyId, OrganizationId};

impl Store {
    pub async fn create_api_key(
        &self,
        id: ApiKeyId,
        organization_id: OrganizationId,
        name: &str,
        key_id: &str,
        key_hash: &str,
    ) -> Result<ApiKey, DispatchError> {
        sqlx::query_as::<_, ApiKey>(
            r#"INSERT INTO api_keys (id, organization_id, name, key_id, key_hash)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, organization_id, name, key_id, key_hash, last_used_at"#,
        )
        .bind(id)
        .bind(organization_id)
        .bind(name)
        .bind(key_id)
        .bind(key_hash)
        .fetch_one(self.pool())
        .await
        .map_err(DispatchError::from)
    }

    pub async fn find_api_key_by_key_id(&self, key_id: &str) -> Result<Option<ApiKey>, DispatchError> {
        sqlx::query_as::<_, ApiKey>(
            "SELECT id, organization_id, name, key_id, key_hash, last_used_at FROM api_keys WHERE key_id = $1",
        )
        .bind(key_id)
        .fetch_optional(self.pool())
        .await
        .map_err(DispatchError::from)
    }

    /// Debounced to at most once per 5 minutes by the cache layer (C3); the
    /// store just performs the unconditional write when asked.
    pub async fn touch_api_key_last_used(&self, id: ApiKeyId, now: DateTime<Utc>) -> Result<(), DispatchError> {
        sqlx::query("UPDATE api_keys SET last_used_at = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn delete_api_key(&self, id: ApiKeyId) -> Result<(), DispatchError> {
        sqlx::query("DELETE FROM api_keys WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
