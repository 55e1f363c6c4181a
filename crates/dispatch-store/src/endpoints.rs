//! Endpoint CRUD and the fan-out sibling-task bookkeeping (spec.md §4.5).

use crate::models::{Endpoint, InboundEvent};
use crate::Store;
use chrono::{DateTime, Utc};
use dispatch_shared::error::DispatchError;
use dispatch_shared::ids::{EndpointId, InboundEventId, OrganizationId, TaskId};
use serde_json::Value as Json;

impl Store {
    #[allow(clippy::too_many_arguments)]
    pub async fn create_endpoint(
        &self,
        id: EndpointId,
        organization_id: OrganizationId,
        name: &str,
        slug: &str,
        forward_urls: &[String],
        use_queue: bool,
        retry_attempts: i32,
    ) -> Result<Endpoint, DispatchError> {
        sqlx::query_as::<_, Endpoint>(
            r#"INSERT INTO endpoints (id, organization_id, name, slug, forward_urls, use_queue, retry_attempts)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING id, organization_id, name, slug, forward_urls, forward_method,
                         forward_headers, forward_body, retry_attempts, use_queue, enabled,
                         notify_on_failure, notify_on_recovery, on_failure_url, on_recovery_url"#,
        )
        .bind(id)
        .bind(organization_id)
        .bind(name)
        .bind(slug)
        .bind(forward_urls)
        .bind(use_queue)
        .bind(retry_attempts)
        .fetch_one(self.pool())
        .await
        .map_err(DispatchError::from)
    }

    pub async fn get_endpoint_by_slug(&self, slug: &str) -> Result<Endpoint, DispatchError> {
        sqlx::query_as::<_, Endpoint>(
            r#"SELECT id, organization_id, name, slug, forward_urls, forward_method,
                      forward_headers, forward_body, retry_attempts, use_queue, enabled,
                      notify_on_failure, notify_on_recovery, on_failure_url, on_recovery_url
               FROM endpoints WHERE slug = $1"#,
        )
        .bind(slug)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DispatchError::not_found("endpoint", slug))
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn update_endpoint(
        &self,
        id: EndpointId,
        name: &str,
        forward_urls: &[String],
        use_queue: bool,
        retry_attempts: i32,
        enabled: bool,
    ) -> Result<Endpoint, DispatchError> {
        sqlx::query_as::<_, Endpoint>(
            r#"UPDATE endpoints SET name = $2, forward_urls = $3, use_queue = $4,
                   retry_attempts = $5, enabled = $6
               WHERE id = $1
               RETURNING id, organization_id, name, slug, forward_urls, forward_method,
                         forward_headers, forward_body, retry_attempts, use_queue, enabled,
                         notify_on_failure, notify_on_recovery, on_failure_url, on_recovery_url"#,
        )
        .bind(id)
        .bind(name)
        .bind(forward_urls)
        .bind(use_queue)
        .bind(retry_attempts)
        .bind(enabled)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DispatchError::not_found("endpoint", id.to_string()))
    }

    pub async fn delete_endpoint(&self, id: EndpointId) -> Result<(), DispatchError> {
        let result = sqlx::query("DELETE FROM endpoints WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(DispatchError::not_found("endpoint", id.to_string()));
        }
        Ok(())
    }

    pub async fn list_endpoints(&self, organization_id: OrganizationId) -> Result<Vec<Endpoint>, DispatchError> {
        sqlx::query_as::<_, Endpoint>(
            r#"SELECT id, organization_id, name, slug, forward_urls, forward_method,
                      forward_headers, forward_body, retry_attempts, use_queue, enabled,
                      notify_on_failure, notify_on_recovery, on_failure_url, on_recovery_url
               FROM endpoints WHERE organization_id = $1 ORDER BY id"#,
        )
        .bind(organization_id)
        .fetch_all(self.pool())
        .await
        .map_err(DispatchError::from)
    }

    pub async fn get_endpoint(&self, id: EndpointId) -> Result<Endpoint, DispatchError> {
        sqlx::query_as::<_, Endpoint>(
            r#"SELECT id, organization_id, name, slug, forward_urls, forward_method,
                      forward_headers, forward_body, retry_attempts, use_queue, enabled,
                      notify_on_failure, notify_on_recovery, on_failure_url, on_recovery_url
               FROM endpoints WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DispatchError::not_found("endpoint", id.to_string()))
    }

    /// The endpoint that owns a fan-out synthetic task, if any (spec.md
    /// §4.5/§4.6): lets the notifier resolve `on_failure_url`/
    /// `on_recovery_url` overrides for executions of that task.
    pub async fn get_endpoint_for_task(&self, task_id: TaskId) -> Result<Option<Endpoint>, DispatchError> {
        sqlx::query_as::<_, Endpoint>(
            r#"SELECT e.id, e.organization_id, e.name, e.slug, e.forward_urls, e.forward_method,
                      e.forward_headers, e.forward_body, e.retry_attempts, e.use_queue, e.enabled,
                      e.notify_on_failure, e.notify_on_recovery, e.on_failure_url, e.on_recovery_url
               FROM endpoints e
               JOIN endpoint_fanout_tasks t ON t.endpoint_id = e.id
               WHERE t.task_id = $1"#,
        )
        .bind(task_id)
        .fetch_optional(self.pool())
        .await
        .map_err(DispatchError::from)
    }

    /// Looks up (or creates) the synthetic one-shot task used to deliver a
    /// single `(endpoint, forward_url)` pair, so repeated inbound events on
    /// the same endpoint reuse one task row instead of growing unbounded
    /// (spec.md §4.5 step 3).
    pub async fn get_or_create_fanout_task(
        &self,
        endpoint_id: EndpointId,
        forward_url: &str,
        make_task: impl FnOnce() -> TaskId,
    ) -> Result<TaskId, DispatchError> {
        if let Some((task_id,)) = sqlx::query_as::<_, (TaskId,)>(
            "SELECT task_id FROM endpoint_fanout_tasks WHERE endpoint_id = $1 AND forward_url = $2",
        )
        .bind(endpoint_id)
        .bind(forward_url)
        .fetch_optional(self.pool())
        .await?
        {
            return Ok(task_id);
        }

        let task_id = make_task();
        sqlx::query(
            "INSERT INTO endpoint_fanout_tasks (endpoint_id, forward_url, task_id) VALUES ($1, $2, $3)
             ON CONFLICT (endpoint_id, forward_url) DO NOTHING",
        )
        .bind(endpoint_id)
        .bind(forward_url)
        .bind(task_id)
        .execute(self.pool())
        .await?;

        // A concurrent caller may have won the race; re-read to get the
        // canonical row.
        let (winner,): (TaskId,) = sqlx::query_as(
            "SELECT task_id FROM endpoint_fanout_tasks WHERE endpoint_id = $1 AND forward_url = $2",
        )
        .bind(endpoint_id)
        .bind(forward_url)
        .fetch_one(self.pool())
        .await?;
        Ok(winner)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_inbound_event(
        &self,
        id: InboundEventId,
        endpoint_id: EndpointId,
        method: &str,
        headers: &Json,
        body: Option<&[u8]>,
        source_ip: Option<&str>,
        received_at: DateTime<Utc>,
        task_ids: &[TaskId],
    ) -> Result<InboundEvent, DispatchError> {
        sqlx::query_as::<_, InboundEvent>(
            r#"INSERT INTO inbound_events (id, endpoint_id, method, headers, body, source_ip, received_at, task_ids)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING id, endpoint_id, method, headers, body, source_ip, received_at, task_ids"#,
        )
        .bind(id)
        .bind(endpoint_id)
        .bind(method)
        .bind(headers)
        .bind(body)
        .bind(source_ip)
        .bind(received_at)
        .bind(task_ids)
        .fetch_one(self.pool())
        .await
        .map_err(DispatchError::from)
    }

    pub async fn get_inbound_event(&self, id: InboundEventId) -> Result<InboundEvent, DispatchError> {
        sqlx::query_as::<_, InboundEvent>(
            "SELECT id, endpoint_id, method, headers, body, source_ip, received_at, task_ids FROM inbound_events WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DispatchError::not_found("inbound_event", id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskInput;
    use crate::MIGRATOR;
    use dispatch_shared::types::{HttpMethod, ScheduleType, Tier};

    async fn insert_task_row(store: &Store, org_id: OrganizationId, id: TaskId) {
        store
            .upsert_task(&TaskInput {
                id,
                organization_id: org_id,
                name: "fanout".to_string(),
                url: "https://a.test/".to_string(),
                method: HttpMethod::Post,
                headers: serde_json::json!({}),
                body: None,
                schedule_type: ScheduleType::Once,
                cron_expression: None,
                scheduled_at: Some(Utc::now()),
                enabled: false,
                timeout_ms: 30_000,
                retry_attempts: 0,
                callback_url: None,
                expected_status_codes: None,
                expected_body_pattern: None,
                queue: None,
                next_run_at: None,
                notify_on_failure: None,
                notify_on_recovery: None,
                external_id: None,
            })
            .await
            .unwrap();
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    async fn fanout_task_lookup_is_stable_across_calls(pool: sqlx::PgPool) {
        let store = Store::new(pool);
        let org_id = OrganizationId::new();
        store.create_organization(org_id, Tier::Free, "secret", Utc::now()).await.unwrap();
        let endpoint = store
            .create_endpoint(
                EndpointId::new(),
                org_id,
                "orders",
                "orders-webhook",
                &["https://a.test/".to_string(), "https://b.test/".to_string()],
                true,
                5,
            )
            .await
            .unwrap();

        let candidate_a = TaskId::new();
        insert_task_row(&store, org_id, candidate_a).await;
        let first = store
            .get_or_create_fanout_task(endpoint.id, "https://a.test/", || candidate_a)
            .await
            .unwrap();

        let candidate_b = TaskId::new();
        insert_task_row(&store, org_id, candidate_b).await;
        let second = store
            .get_or_create_fanout_task(endpoint.id, "https://a.test/", || candidate_b)
            .await
            .unwrap();
        assert_eq!(first, second, "second call must reuse the existing mapping, not candidate_b");
    }
}
