//! The scheduler tick (spec.md §4.3): materializes due task instances into
//! pending execution rows. Never performs HTTP work itself.

use chrono::{DateTime, Utc};
use dispatch_shared::error::DispatchError;
use dispatch_shared::ids::ExecutionId;
use dispatch_shared::types::ScheduleType;
use dispatch_store::models::Task;
use dispatch_store::Store;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct SchedulerTickConfig {
    pub horizon_s: i64,
    pub missed_fire_threshold_s: i64,
}

#[derive(Debug, Default)]
pub struct TickReport {
    pub materialized: u32,
    pub caught_up: u32,
    pub errors: u32,
}

/// Runs one scheduler tick: considers every due task and either leaves it
/// alone (an execution already exists at that instant), materializes a
/// fresh pending execution, or — for a cron task whose fire is older than
/// `missed_fire_threshold_s` — inserts a single catch-up execution and
/// jumps `next_run_at` forward instead of backfilling every missed minute.
pub async fn tick(store: &Store, now: DateTime<Utc>, config: SchedulerTickConfig) -> TickReport {
    let mut report = TickReport::default();

    let due = match store.list_due_tasks(now, config.horizon_s).await {
        Ok(tasks) => tasks,
        Err(err) => {
            warn!(error = %err, "failed to list due tasks");
            report.errors += 1;
            return report;
        }
    };

    for task in due {
        match materialize_task(store, &task, now, config).await {
            Ok(MaterializeOutcome::Materialized) => report.materialized += 1,
            Ok(MaterializeOutcome::CaughtUp) => {
                report.materialized += 1;
                report.caught_up += 1;
            }
            Ok(MaterializeOutcome::AlreadyExists) => {}
            Err(err) => {
                warn!(task_id = %task.id, error = %err, "failed to materialize task");
                report.errors += 1;
            }
        }
    }

    report
}

enum MaterializeOutcome {
    Materialized,
    CaughtUp,
    AlreadyExists,
}

async fn materialize_task(
    store: &Store,
    task: &Task,
    now: DateTime<Utc>,
    config: SchedulerTickConfig,
) -> Result<MaterializeOutcome, DispatchError> {
    let due_at = match task.next_run_at {
        Some(t) => t,
        None => return Ok(MaterializeOutcome::AlreadyExists),
    };

    let missed = task.schedule_type == ScheduleType::Cron
        && (now - due_at).num_seconds() > config.missed_fire_threshold_s;

    let already_exists = store.execution_exists_at(task.id, due_at).await?;
    let outcome = if already_exists {
        MaterializeOutcome::AlreadyExists
    } else {
        store
            .insert_pending_execution(
                ExecutionId::new(),
                task.id,
                task.organization_id,
                task.queue.as_deref(),
                due_at,
                1,
                task.callback_url.as_deref(),
                false,
            )
            .await?;
        info!(task_id = %task.id, scheduled_for = %due_at, missed, "materialized pending execution");
        if missed {
            MaterializeOutcome::CaughtUp
        } else {
            MaterializeOutcome::Materialized
        }
    };

    let next_run_at = match task.schedule_type {
        ScheduleType::Once => None,
        ScheduleType::Cron => {
            let expr = task
                .cron_expression
                .as_deref()
                .ok_or_else(|| DispatchError::Internal(format!("cron task {} missing cron_expression", task.id)))?;
            Some(dispatch_shared::cron::next(expr, now + chrono::Duration::seconds(1))?)
        }
    };
    store.set_next_run_at(task.id, next_run_at).await?;

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_shared::ids::{OrganizationId, TaskId};
    use dispatch_shared::types::{HttpMethod, Tier};
    use dispatch_store::tasks::TaskInput;
    use dispatch_store::MIGRATOR;

    async fn seed(store: &Store, schedule_type: ScheduleType, next_run_at: DateTime<Utc>) -> TaskId {
        let org_id = OrganizationId::new();
        store.create_organization(org_id, Tier::Free, "secret", Utc::now()).await.unwrap();
        let task_id = TaskId::new();
        let (cron_expression, scheduled_at) = match schedule_type {
            ScheduleType::Cron => (Some("*/5 * * * *".to_string()), None),
            ScheduleType::Once => (None, Some(next_run_at)),
        };
        store
            .upsert_task(&TaskInput {
                id: task_id,
                organization_id: org_id,
                name: "t".to_string(),
                url: "https://x.test/ok".to_string(),
                method: HttpMethod::Get,
                headers: serde_json::json!({}),
                body: None,
                schedule_type,
                cron_expression,
                scheduled_at,
                enabled: true,
                timeout_ms: 5000,
                retry_attempts: 2,
                callback_url: None,
                expected_status_codes: None,
                expected_body_pattern: None,
                queue: None,
                next_run_at: Some(next_run_at),
                notify_on_failure: None,
                notify_on_recovery: None,
                external_id: None,
            })
            .await
            .unwrap();
        task_id
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    async fn cron_happy_path_materializes_and_advances_s1(pool: sqlx::PgPool) {
        let store = Store::new(pool);
        let now = Utc::now();
        let task_id = seed(&store, ScheduleType::Cron, now).await;

        let config = SchedulerTickConfig { horizon_s: 30, missed_fire_threshold_s: 120 };
        let report = tick(&store, now, config).await;
        assert_eq!(report.materialized, 1);
        assert_eq!(report.errors, 0);

        let executions = store.list_executions_for_task(task_id).await.unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].scheduled_for, now);

        let task = store.get_task(task_id).await.unwrap();
        assert!(task.next_run_at.unwrap() > now);
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    async fn does_not_double_materialize_on_repeated_ticks(pool: sqlx::PgPool) {
        let store = Store::new(pool);
        let now = Utc::now();
        let task_id = seed(&store, ScheduleType::Cron, now).await;
        let config = SchedulerTickConfig { horizon_s: 30, missed_fire_threshold_s: 120 };

        tick(&store, now, config).await;
        // Reset next_run_at back to the same instant to simulate a second
        // tick observing the same due task before it advances naturally.
        store.set_next_run_at(task_id, Some(now)).await.unwrap();
        tick(&store, now, config).await;

        let executions = store.list_executions_for_task(task_id).await.unwrap();
        assert_eq!(executions.len(), 1, "invariant 1: no duplicate pending materialization");
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    async fn missed_fire_catches_up_once_and_jumps_ahead(pool: sqlx::PgPool) {
        let store = Store::new(pool);
        let now = Utc::now();
        let stale_due = now - chrono::Duration::seconds(300);
        let task_id = seed(&store, ScheduleType::Cron, stale_due).await;

        let config = SchedulerTickConfig { horizon_s: 30, missed_fire_threshold_s: 120 };
        let report = tick(&store, now, config).await;
        assert_eq!(report.caught_up, 1);

        let task = store.get_task(task_id).await.unwrap();
        assert!(task.next_run_at.unwrap() > now, "next_run_at must jump strictly past now, not backfill");
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    async fn one_shot_task_clears_next_run_at(pool: sqlx::PgPool) {
        let store = Store::new(pool);
        let now = Utc::now();
        let task_id = seed(&store, ScheduleType::Once, now).await;
        let config = SchedulerTickConfig { horizon_s: 30, missed_fire_threshold_s: 120 };

        tick(&store, now, config).await;
        let task = store.get_task(task_id).await.unwrap();
        assert!(task.next_run_at.is_none());
    }
}
