//! The execution lifecycle, anchored by the atomic claim primitive
//! (spec.md §4.2, §4.4, §4.7). This is the concurrency keystone of the
//! whole system: every worker process calls `claim_next_execution` in a
//! tight loop, and the `FOR UPDATE SKIP LOCKED` clause is what lets N
//! workers poll the same table without ever double-claiming a row.

use crate::models::{Execution, ExecutionOutcome};
use crate::Store;
use chrono::{DateTime, Utc};
use dispatch_shared::error::DispatchError;
use dispatch_shared::ids::{ExecutionId, OrganizationId, TaskId};

const EXECUTION_COLUMNS: &str = "id, task_id, organization_id, queue, status, scheduled_for,
    started_at, finished_at, status_code, duration_ms, response_body, error_message, attempt,
    callback_url, is_internal";

impl Store {
    /// Inserts a new pending execution. Enforces invariant 1 (no duplicate
    /// pending materialization for the same `(task_id, scheduled_for)`) via
    /// the unique index; callers that expect this to be a no-op on conflict
    /// (the scheduler's due-task loop) should check for `Conflict` and
    /// treat it as "already materialized".
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_pending_execution(
        &self,
        id: ExecutionId,
        task_id: TaskId,
        organization_id: OrganizationId,
        queue: Option<&str>,
        scheduled_for: DateTime<Utc>,
        attempt: i32,
        callback_url: Option<&str>,
        is_internal: bool,
    ) -> Result<Execution, DispatchError> {
        sqlx::query_as::<_, Execution>(&format!(
            r#"INSERT INTO executions (id, task_id, organization_id, queue, status, scheduled_for,
                   attempt, callback_url, is_internal)
               VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7, $8)
               RETURNING {EXECUTION_COLUMNS}"#
        ))
        .bind(id)
        .bind(task_id)
        .bind(organization_id)
        .bind(queue)
        .bind(scheduled_for)
        .bind(attempt)
        .bind(callback_url)
        .bind(is_internal)
        .fetch_one(self.pool())
        .await
        .map_err(DispatchError::from)
    }

    /// True if a pending or running execution already exists at this exact
    /// `(task_id, scheduled_for)` instant, used by the scheduler to skip
    /// work it already knows is covered (spec.md §4.3).
    pub async fn execution_exists_at(
        &self,
        task_id: TaskId,
        scheduled_for: DateTime<Utc>,
    ) -> Result<bool, DispatchError> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM executions WHERE task_id = $1 AND scheduled_for = $2)",
        )
        .bind(task_id)
        .bind(scheduled_for)
        .fetch_one(self.pool())
        .await?;
        Ok(exists)
    }

    /// The atomic claim primitive (spec.md §4.2). Candidate ordering:
    /// 1. tier priority (pro before free), 2. queue eligibility (not
    /// blocked by a running sibling or a paused queue), 3. org fairness
    /// (running count under the tier's concurrency cap), 4. earliest
    /// `scheduled_for`, ties broken by `id`.
    pub async fn claim_next_execution(
        &self,
        now: DateTime<Utc>,
        pro_concurrency_cap: i32,
        free_concurrency_cap: i32,
    ) -> Result<Option<Execution>, DispatchError> {
        let row = sqlx::query_as::<_, Execution>(&format!(
            r#"WITH candidate AS (
                   SELECT e.id
                   FROM executions e
                   JOIN organizations o ON o.id = e.organization_id
                   LEFT JOIN queues q ON q.organization_id = e.organization_id AND q.name = e.queue
                   WHERE e.status = 'pending'
                     AND e.scheduled_for <= $1
                     AND COALESCE(q.paused, FALSE) = FALSE
                     AND NOT EXISTS (
                         SELECT 1 FROM executions r
                         WHERE r.organization_id = e.organization_id
                           AND e.queue IS NOT NULL
                           AND r.queue = e.queue
                           AND r.status = 'running'
                     )
                     AND (
                         SELECT COUNT(*) FROM executions r2
                         WHERE r2.organization_id = e.organization_id AND r2.status = 'running'
                     ) < CASE o.tier WHEN 'pro' THEN $2 ELSE $3 END
                   ORDER BY (o.tier = 'pro') DESC, e.scheduled_for ASC, e.id ASC
                   LIMIT 1
                   FOR UPDATE OF e SKIP LOCKED
               )
               UPDATE executions
               SET status = 'running', started_at = $1
               FROM candidate
               WHERE executions.id = candidate.id
               RETURNING executions.{EXECUTION_COLUMNS}"#
        ))
        .bind(now)
        .bind(pro_concurrency_cap)
        .bind(free_concurrency_cap)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn get_execution(&self, id: ExecutionId) -> Result<Execution, DispatchError> {
        sqlx::query_as::<_, Execution>(&format!("SELECT {EXECUTION_COLUMNS} FROM executions WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DispatchError::not_found("execution", id.to_string()))
    }

    pub async fn list_executions_for_task(&self, task_id: TaskId) -> Result<Vec<Execution>, DispatchError> {
        sqlx::query_as::<_, Execution>(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM executions WHERE task_id = $1 ORDER BY attempt"
        ))
        .bind(task_id)
        .fetch_all(self.pool())
        .await
        .map_err(DispatchError::from)
    }

    /// Writes the terminal outcome of a claimed execution (spec.md §4.4
    /// step 5). `status` must be one of the three terminal statuses;
    /// invariant 2 (terminal monotonicity) is enforced by the `WHERE status
    /// = 'running'` guard, which makes a second finalize of the same row a
    /// silent no-op rather than an overwrite.
    pub async fn record_execution_finished(
        &self,
        id: ExecutionId,
        finished_at: DateTime<Utc>,
        outcome: &ExecutionOutcome,
    ) -> Result<(), DispatchError> {
        let result = sqlx::query(
            r#"UPDATE executions
               SET status = $2, finished_at = $3, status_code = $4, duration_ms = $5,
                   response_body = $6, error_message = $7
               WHERE id = $1 AND status = 'running'"#,
        )
        .bind(id)
        .bind(outcome.status)
        .bind(finished_at)
        .bind(outcome.status_code)
        .bind(outcome.duration_ms)
        .bind(&outcome.response_body)
        .bind(&outcome.error_message)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(DispatchError::Conflict(format!(
                "execution {id} was not in running state"
            )));
        }
        Ok(())
    }

    /// Janitor sweep (spec.md §4.2): executions stuck in `running` past
    /// `stuck_running_threshold_s` are reaped as `failed(reason="worker
    /// lost")` so a dead worker can't hold a claim forever.
    pub async fn reap_stuck_running(
        &self,
        now: DateTime<Utc>,
        stuck_running_threshold_s: i64,
    ) -> Result<Vec<Execution>, DispatchError> {
        let cutoff = now - chrono::Duration::seconds(stuck_running_threshold_s);
        sqlx::query_as::<_, Execution>(&format!(
            r#"UPDATE executions
               SET status = 'failed', finished_at = $1, error_message = 'worker lost'
               WHERE status = 'running' AND started_at <= $2
               RETURNING {EXECUTION_COLUMNS}"#
        ))
        .bind(now)
        .bind(cutoff)
        .fetch_all(self.pool())
        .await
        .map_err(DispatchError::from)
    }

    /// Count of attempt-1 terminal executions finalized since `since`, used
    /// to cross-check invariant 7 (quota accounting) in tests.
    pub async fn count_attempt_one_terminal_since(
        &self,
        organization_id: OrganizationId,
        since: DateTime<Utc>,
    ) -> Result<i64, DispatchError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"SELECT COUNT(*) FROM executions
               WHERE organization_id = $1 AND attempt = 1
                 AND status IN ('success', 'failed', 'timeout') AND finished_at >= $2"#,
        )
        .bind(organization_id)
        .bind(since)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskInput;
    use crate::MIGRATOR;
    use dispatch_shared::types::{ExecutionStatus, HttpMethod, ScheduleType, Tier};

    async fn seed_org_and_task(store: &Store, tier: Tier, queue: Option<&str>) -> (OrganizationId, TaskId) {
        let org_id = OrganizationId::new();
        store.create_organization(org_id, tier, "secret", Utc::now()).await.unwrap();
        let task_id = TaskId::new();
        let input = TaskInput {
            id: task_id,
            organization_id: org_id,
            name: "t".to_string(),
            url: "https://x.test/ok".to_string(),
            method: HttpMethod::Get,
            headers: serde_json::json!({}),
            body: None,
            schedule_type: ScheduleType::Cron,
            cron_expression: Some("* * * * *".to_string()),
            scheduled_at: None,
            enabled: true,
            timeout_ms: 5000,
            retry_attempts: 2,
            callback_url: None,
            expected_status_codes: None,
            expected_body_pattern: None,
            queue: queue.map(str::to_string),
            next_run_at: None,
            notify_on_failure: None,
            notify_on_recovery: None,
            external_id: None,
        };
        store.upsert_task(&input).await.unwrap();
        (org_id, task_id)
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    async fn claim_returns_distinct_rows_and_then_none(pool: sqlx::PgPool) {
        let store = Store::new(pool);
        let (org_id, task_id) = seed_org_and_task(&store, Tier::Free, None).await;
        let now = Utc::now();
        store
            .insert_pending_execution(ExecutionId::new(), task_id, org_id, None, now, 1, None, false)
            .await
            .unwrap();

        let claimed = store.claim_next_execution(now, 32, 4).await.unwrap();
        assert!(claimed.is_some());
        assert_eq!(claimed.unwrap().status, ExecutionStatus::Running);

        let second = store.claim_next_execution(now, 32, 4).await.unwrap();
        assert!(second.is_none());
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    async fn pro_tier_claimed_before_free(pool: sqlx::PgPool) {
        let store = Store::new(pool);
        let (free_org, free_task) = seed_org_and_task(&store, Tier::Free, None).await;
        let (pro_org, pro_task) = seed_org_and_task(&store, Tier::Pro, None).await;
        let now = Utc::now();
        store
            .insert_pending_execution(ExecutionId::new(), free_task, free_org, None, now, 1, None, false)
            .await
            .unwrap();
        store
            .insert_pending_execution(ExecutionId::new(), pro_task, pro_org, None, now, 1, None, false)
            .await
            .unwrap();

        let claimed = store.claim_next_execution(now, 32, 4).await.unwrap().unwrap();
        assert_eq!(claimed.organization_id, pro_org);
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    async fn queue_serialization_blocks_second_running_sibling(pool: sqlx::PgPool) {
        let store = Store::new(pool);
        let (org_id, task_id) = seed_org_and_task(&store, Tier::Free, Some("emails")).await;
        let now = Utc::now();
        store
            .insert_pending_execution(ExecutionId::new(), task_id, org_id, Some("emails"), now, 1, None, false)
            .await
            .unwrap();
        store
            .insert_pending_execution(ExecutionId::new(), task_id, org_id, Some("emails"), now + chrono::Duration::seconds(1), 1, None, false)
            .await
            .unwrap();

        let first = store.claim_next_execution(now, 32, 4).await.unwrap();
        assert!(first.is_some());
        let second = store.claim_next_execution(now, 32, 4).await.unwrap();
        assert!(second.is_none(), "second execution in the same queue must wait");
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    async fn paused_queue_is_never_claimed(pool: sqlx::PgPool) {
        let store = Store::new(pool);
        let (org_id, task_id) = seed_org_and_task(&store, Tier::Free, Some("emails")).await;
        store.set_queue_paused(org_id, "emails", true).await.unwrap();
        let now = Utc::now();
        store
            .insert_pending_execution(ExecutionId::new(), task_id, org_id, Some("emails"), now, 1, None, false)
            .await
            .unwrap();

        let claimed = store.claim_next_execution(now, 32, 4).await.unwrap();
        assert!(claimed.is_none());
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    async fn fairness_cap_blocks_claims_over_the_limit(pool: sqlx::PgPool) {
        let store = Store::new(pool);
        let (org_id, task_id) = seed_org_and_task(&store, Tier::Free, None).await;
        let now = Utc::now();
        store
            .insert_pending_execution(ExecutionId::new(), task_id, org_id, None, now, 1, None, false)
            .await
            .unwrap();
        store
            .insert_pending_execution(ExecutionId::new(), task_id, org_id, None, now, 2, None, false)
            .await
            .unwrap();

        let first = store.claim_next_execution(now, 32, 1).await.unwrap();
        assert!(first.is_some());
        let second = store.claim_next_execution(now, 32, 1).await.unwrap();
        assert!(second.is_none(), "free org with cap=1 cannot claim a second concurrent execution");
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    async fn reap_stuck_running_fails_executions_past_the_threshold(pool: sqlx::PgPool) {
        let store = Store::new(pool);
        let (org_id, task_id) = seed_org_and_task(&store, Tier::Free, None).await;
        let now = Utc::now();
        store
            .insert_pending_execution(ExecutionId::new(), task_id, org_id, None, now, 1, None, false)
            .await
            .unwrap();
        let claimed = store.claim_next_execution(now, 32, 4).await.unwrap().unwrap();

        let too_soon = store.reap_stuck_running(now + chrono::Duration::seconds(60), 900).await.unwrap();
        assert!(too_soon.is_empty(), "execution within the threshold must not be reaped");

        let later = now + chrono::Duration::seconds(901);
        let reaped = store.reap_stuck_running(later, 900).await.unwrap();
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].id, claimed.id);
        assert_eq!(reaped[0].status, ExecutionStatus::Failed);
        assert_eq!(reaped[0].error_message.as_deref(), Some("worker lost"));

        let again = store.reap_stuck_running(later, 900).await.unwrap();
        assert!(again.is_empty(), "an already-reaped execution must not be reaped twice");
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    async fn finalize_is_idempotent(pool: sqlx::PgPool) {
        let store = Store::new(pool);
        let (org_id, task_id) = seed_org_and_task(&store, Tier::Free, None).await;
        let now = Utc::now();
        let exec = store
            .insert_pending_execution(ExecutionId::new(), task_id, org_id, None, now, 1, None, false)
            .await
            .unwrap();
        store.claim_next_execution(now, 32, 4).await.unwrap();

        let outcome = ExecutionOutcome {
            status: ExecutionStatus::Success,
            status_code: Some(200),
            duration_ms: Some(10),
            response_body: None,
            error_message: None,
        };
        store.record_execution_finished(exec.id, now, &outcome).await.unwrap();
        let err = store.record_execution_finished(exec.id, now, &outcome).await;
        assert!(err.is_err(), "finalizing an already-terminal execution must not silently succeed");
    }
}
