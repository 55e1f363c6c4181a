//! S3 - Queue serialization (spec.md §8): two tasks sharing a named queue
//! never run concurrently; the second stays pending until the first
//! reaches a terminal status.

use chrono::Utc;
use dispatch_shared::ids::{ExecutionId, TaskId};
use dispatch_shared::types::{ExecutionStatus, HttpMethod, ScheduleType};
use dispatch_store::models::ExecutionOutcome;
use dispatch_store::tasks::TaskInput;
use dispatch_store::Store;
use dispatch_store::MIGRATOR;

use crate::common::seed_org;

async fn make_task(store: &Store, org_id: dispatch_shared::ids::OrganizationId, now: chrono::DateTime<Utc>, name: &str) -> TaskId {
    let task = store
        .upsert_task(&TaskInput {
            id: TaskId::new(),
            organization_id: org_id,
            name: name.to_string(),
            url: "https://x.test/ok".to_string(),
            method: HttpMethod::Get,
            headers: serde_json::json!({}),
            body: None,
            schedule_type: ScheduleType::Once,
            cron_expression: None,
            scheduled_at: Some(now),
            enabled: true,
            timeout_ms: 5_000,
            retry_attempts: 0,
            callback_url: None,
            expected_status_codes: None,
            expected_body_pattern: None,
            queue: Some("emails".to_string()),
            next_run_at: Some(now),
            notify_on_failure: None,
            notify_on_recovery: None,
            external_id: None,
        })
        .await
        .unwrap();
    task.id
}

#[sqlx::test(migrator = "MIGRATOR")]
async fn second_task_waits_for_first_to_finish(pool: sqlx::PgPool) {
    let store = Store::new(pool);
    let now = Utc::now();
    let org_id = seed_org(&store, dispatch_shared::types::Tier::Free, now).await;

    let task_a = make_task(&store, org_id, now, "a").await;
    let task_b = make_task(&store, org_id, now, "b").await;
    store.insert_pending_execution(ExecutionId::new(), task_a, org_id, Some("emails"), now, 1, None, false).await.unwrap();
    store.insert_pending_execution(ExecutionId::new(), task_b, org_id, Some("emails"), now, 1, None, false).await.unwrap();

    let first = store.claim_next_execution(now, 32, 4).await.unwrap().expect("first claim succeeds");
    assert_eq!(first.task_id, task_a);

    // The queue holds a running execution, so the second task's pending
    // execution must not be claimable yet.
    let blocked = store.claim_next_execution(now, 32, 4).await.unwrap();
    assert!(blocked.is_none());

    store
        .record_execution_finished(
            first.id,
            now,
            &ExecutionOutcome { status: ExecutionStatus::Success, status_code: Some(200), duration_ms: Some(5), response_body: None, error_message: None },
        )
        .await
        .unwrap();

    let second = store.claim_next_execution(now, 32, 4).await.unwrap().expect("second claim succeeds once the queue frees up");
    assert_eq!(second.task_id, task_b);
}
