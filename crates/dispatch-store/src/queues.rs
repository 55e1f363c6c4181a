//! Queue lifecycle: created implicitly by the first task that names it,
//! mutated only via pause/resume (spec.md §3).

use crate::models::Queue;
use crate::Store;
use dispatch_shared::error::DispatchError;
use dispatch_shared::ids::OrganizationId;

impl Store {
    pub async fn ensure_queue(&self, organization_id: OrganizationId, name: &str) -> Result<(), DispatchError> {
        sqlx::query(
            "INSERT INTO queues (organization_id, name) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(organization_id)
        .bind(name)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn list_queues(&self, organization_id: OrganizationId) -> Result<Vec<Queue>, DispatchError> {
        sqlx::query_as::<_, Queue>(
            "SELECT organization_id, name, paused FROM queues WHERE organization_id = $1 ORDER BY name",
        )
        .bind(organization_id)
        .fetch_all(self.pool())
        .await
        .map_err(DispatchError::from)
    }

    pub async fn set_queue_paused(
        &self,
        organization_id: OrganizationId,
        name: &str,
        paused: bool,
    ) -> Result<(), DispatchError> {
        let result = sqlx::query("UPDATE queues SET paused = $3 WHERE organization_id = $1 AND name = $2")
            .bind(organization_id)
            .bind(name)
            .bind(paused)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(DispatchError::not_found("queue", name));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MIGRATOR;
    use dispatch_shared::types::Tier;

    #[sqlx::test(migrator = "MIGRATOR")]
    async fn pause_and_resume(pool: sqlx::PgPool) {
        let store = Store::new(pool);
        let org_id = OrganizationId::new();
        store
            .create_organization(org_id, Tier::Free, "secret", chrono::Utc::now())
            .await
            .unwrap();
        store.ensure_queue(org_id, "emails").await.unwrap();

        store.set_queue_paused(org_id, "emails", true).await.unwrap();
        let queues = store.list_queues(org_id).await.unwrap();
        assert!(queues[0].paused);

        store.set_queue_paused(org_id, "emails", false).await.unwrap();
        let queues = store.list_queues(org_id).await.unwrap();
        assert!(!queues[0].paused);
    }
}
