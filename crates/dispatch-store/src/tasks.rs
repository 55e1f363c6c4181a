//! Task CRUD and the due-task query the scheduler polls (spec.md §4.3).

use crate::models::Task;
use crate::Store;
use chrono::{DateTime, Utc};
use dispatch_shared::error::DispatchError;
use dispatch_shared::ids::{OrganizationId, TaskId};
use dispatch_shared::types::{HttpMethod, ScheduleType};
use serde_json::Value as Json;

/// Total field coverage for a task mutation, decoded once at the API
/// boundary (spec.md §9: "runtime-typed params" are replaced by validated
/// structs with total field coverage).
#[derive(Debug, Clone)]
pub struct TaskInput {
    pub id: TaskId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub url: String,
    pub method: HttpMethod,
    pub headers: Json,
    pub body: Option<Vec<u8>>,
    pub schedule_type: ScheduleType,
    pub cron_expression: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub enabled: bool,
    pub timeout_ms: i32,
    pub retry_attempts: i32,
    pub callback_url: Option<String>,
    pub expected_status_codes: Option<Vec<i32>>,
    pub expected_body_pattern: Option<String>,
    pub queue: Option<String>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub notify_on_failure: Option<bool>,
    pub notify_on_recovery: Option<bool>,
    pub external_id: Option<String>,
}

const TASK_COLUMNS: &str = "id, organization_id, name, url, method, headers, body, schedule_type,
    cron_expression, scheduled_at, enabled, timeout_ms, retry_attempts, callback_url,
    expected_status_codes, expected_body_pattern, queue, next_run_at, last_execution_at,
    last_execution_status, deleted_at, notify_on_failure, notify_on_recovery, external_id";

impl Store {
    pub async fn upsert_task(&self, input: &TaskInput) -> Result<Task, DispatchError> {
        if let Some(queue) = &input.queue {
            self.ensure_queue(input.organization_id, queue).await?;
        }

        let row = sqlx::query_as::<_, Task>(&format!(
            r#"INSERT INTO tasks (id, organization_id, name, url, method, headers, body,
                   schedule_type, cron_expression, scheduled_at, enabled, timeout_ms,
                   retry_attempts, callback_url, expected_status_codes, expected_body_pattern,
                   queue, next_run_at, notify_on_failure, notify_on_recovery, external_id)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
               ON CONFLICT (id) DO UPDATE SET
                   name = EXCLUDED.name, url = EXCLUDED.url, method = EXCLUDED.method,
                   headers = EXCLUDED.headers, body = EXCLUDED.body,
                   schedule_type = EXCLUDED.schedule_type, cron_expression = EXCLUDED.cron_expression,
                   scheduled_at = EXCLUDED.scheduled_at, enabled = EXCLUDED.enabled,
                   timeout_ms = EXCLUDED.timeout_ms, retry_attempts = EXCLUDED.retry_attempts,
                   callback_url = EXCLUDED.callback_url,
                   expected_status_codes = EXCLUDED.expected_status_codes,
                   expected_body_pattern = EXCLUDED.expected_body_pattern, queue = EXCLUDED.queue,
                   next_run_at = EXCLUDED.next_run_at, notify_on_failure = EXCLUDED.notify_on_failure,
                   notify_on_recovery = EXCLUDED.notify_on_recovery, external_id = EXCLUDED.external_id,
                   updated_at = now()
               RETURNING {TASK_COLUMNS}"#
        ))
        .bind(input.id)
        .bind(input.organization_id)
        .bind(&input.name)
        .bind(&input.url)
        .bind(input.method)
        .bind(&input.headers)
        .bind(&input.body)
        .bind(input.schedule_type)
        .bind(&input.cron_expression)
        .bind(input.scheduled_at)
        .bind(input.enabled)
        .bind(input.timeout_ms)
        .bind(input.retry_attempts)
        .bind(&input.callback_url)
        .bind(&input.expected_status_codes)
        .bind(&input.expected_body_pattern)
        .bind(&input.queue)
        .bind(input.next_run_at)
        .bind(input.notify_on_failure)
        .bind(input.notify_on_recovery)
        .bind(&input.external_id)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn get_task_by_external_id(
        &self,
        organization_id: OrganizationId,
        external_id: &str,
    ) -> Result<Option<Task>, DispatchError> {
        sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE organization_id = $1 AND external_id = $2"
        ))
        .bind(organization_id)
        .bind(external_id)
        .fetch_optional(self.pool())
        .await
        .map_err(DispatchError::from)
    }

    pub async fn get_task(&self, id: TaskId) -> Result<Task, DispatchError> {
        sqlx::query_as::<_, Task>(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DispatchError::not_found("task", id.to_string()))
    }

    /// Tasks this org manages declaratively, i.e. carry an `external_id`
    /// (spec.md §6 `/api/v1/sync`). Used to compute the removal set when
    /// `delete_removed` is set.
    pub async fn list_synced_tasks(&self, organization_id: OrganizationId) -> Result<Vec<Task>, DispatchError> {
        sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE organization_id = $1 AND deleted_at IS NULL AND external_id IS NOT NULL"
        ))
        .bind(organization_id)
        .fetch_all(self.pool())
        .await
        .map_err(DispatchError::from)
    }

    pub async fn list_tasks(&self, organization_id: OrganizationId) -> Result<Vec<Task>, DispatchError> {
        sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE organization_id = $1 AND deleted_at IS NULL ORDER BY id"
        ))
        .bind(organization_id)
        .fetch_all(self.pool())
        .await
        .map_err(DispatchError::from)
    }

    /// Soft delete (spec.md §3): the row stays for execution history but
    /// becomes invisible to the scheduler and to `list_tasks`.
    pub async fn soft_delete_task(&self, id: TaskId, now: DateTime<Utc>) -> Result<(), DispatchError> {
        let result = sqlx::query("UPDATE tasks SET deleted_at = $2 WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .bind(now)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(DispatchError::not_found("task", id.to_string()));
        }
        Ok(())
    }

    /// Tasks the scheduler should consider materializing this tick: enabled,
    /// not deleted, with a `next_run_at` inside the horizon (spec.md §4.3).
    pub async fn list_due_tasks(
        &self,
        now: DateTime<Utc>,
        horizon_s: i64,
    ) -> Result<Vec<Task>, DispatchError> {
        let horizon = now + chrono::Duration::seconds(horizon_s);
        sqlx::query_as::<_, Task>(&format!(
            r#"SELECT {TASK_COLUMNS} FROM tasks
               WHERE enabled AND deleted_at IS NULL AND next_run_at IS NOT NULL AND next_run_at <= $1
               ORDER BY next_run_at, id"#
        ))
        .bind(horizon)
        .fetch_all(self.pool())
        .await
        .map_err(DispatchError::from)
    }

    pub async fn set_next_run_at(&self, id: TaskId, next_run_at: Option<DateTime<Utc>>) -> Result<(), DispatchError> {
        sqlx::query("UPDATE tasks SET next_run_at = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(next_run_at)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn record_task_last_execution(
        &self,
        id: TaskId,
        at: DateTime<Utc>,
        status: &str,
    ) -> Result<(), DispatchError> {
        sqlx::query(
            "UPDATE tasks SET last_execution_at = $2, last_execution_status = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .bind(status)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// `DELETE /api/v1/tasks?queue=N`: cancels all pending executions in a
    /// queue without touching the task definitions.
    pub async fn cancel_pending_in_queue(
        &self,
        organization_id: OrganizationId,
        queue: &str,
    ) -> Result<u64, DispatchError> {
        // `cancelled` is not one of the five execution statuses in spec.md
        // §3 (`pending | running | success | failed | timeout`); cancelling
        // a queue removes the rows instead, matching "Cancel all pending in
        // queue" literally rather than inventing a new status.
        let result = sqlx::query(
            "DELETE FROM executions WHERE organization_id = $1 AND queue = $2 AND status = 'pending'",
        )
        .bind(organization_id)
        .bind(queue)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MIGRATOR;
    use dispatch_shared::types::Tier;

    fn sample_input(org_id: OrganizationId) -> TaskInput {
        TaskInput {
            id: TaskId::new(),
            organization_id: org_id,
            name: "ping".to_string(),
            url: "https://x.test/ok".to_string(),
            method: HttpMethod::Get,
            headers: serde_json::json!({}),
            body: None,
            schedule_type: ScheduleType::Cron,
            cron_expression: Some("*/5 * * * *".to_string()),
            scheduled_at: None,
            enabled: true,
            timeout_ms: 5000,
            retry_attempts: 2,
            callback_url: None,
            expected_status_codes: None,
            expected_body_pattern: None,
            queue: None,
            next_run_at: Some(Utc::now()),
            notify_on_failure: None,
            notify_on_recovery: None,
            external_id: None,
        }
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    async fn upsert_then_soft_delete_hides_from_due_list(pool: sqlx::PgPool) {
        let store = Store::new(pool);
        let org_id = OrganizationId::new();
        store
            .create_organization(org_id, Tier::Free, "secret", Utc::now())
            .await
            .unwrap();

        let input = sample_input(org_id);
        let task = store.upsert_task(&input).await.unwrap();
        assert_eq!(task.name, "ping");

        let due = store.list_due_tasks(Utc::now(), 30).await.unwrap();
        assert_eq!(due.len(), 1);

        store.soft_delete_task(task.id, Utc::now()).await.unwrap();
        let due = store.list_due_tasks(Utc::now(), 30).await.unwrap();
        assert!(due.is_empty());
    }
}
