//! S2 - Retry exhaustion (spec.md §8): `retry_attempts=2` against a
//! remote that always returns 500 yields exactly three failed executions,
//! each retry scheduled no sooner than the exponential backoff floor.

use chrono::Utc;
use dispatch_shared::ids::TaskId;
use dispatch_shared::types::{ExecutionStatus, HttpMethod, ScheduleType};
use dispatch_store::tasks::TaskInput;
use dispatch_store::Store;
use dispatch_store::MIGRATOR;
use dispatch_worker::dispatch::{perform, WorkerContext};
use dispatch_worker::notifier::LoggingSink;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::seed_org;

#[sqlx::test(migrator = "MIGRATOR")]
async fn retries_exhaust_after_three_attempts(pool: sqlx::PgPool) {
    let store = Store::new(pool);
    let now = Utc::now();
    let org_id = seed_org(&store, dispatch_shared::types::Tier::Free, now).await;

    let upstream = MockServer::start().await;
    Mock::given(method("GET")).and(path("/broken")).respond_with(ResponseTemplate::new(500)).mount(&upstream).await;

    let task = store
        .upsert_task(&TaskInput {
            id: TaskId::new(),
            organization_id: org_id,
            name: "flaky".to_string(),
            url: format!("{}/broken", upstream.uri()),
            method: HttpMethod::Get,
            headers: serde_json::json!({}),
            body: None,
            schedule_type: ScheduleType::Once,
            cron_expression: None,
            scheduled_at: Some(now),
            enabled: true,
            timeout_ms: 5_000,
            retry_attempts: 2,
            callback_url: None,
            expected_status_codes: None,
            expected_body_pattern: None,
            queue: None,
            next_run_at: Some(now),
            notify_on_failure: None,
            notify_on_recovery: None,
            external_id: None,
        })
        .await
        .unwrap();

    store
        .insert_pending_execution(dispatch_shared::ids::ExecutionId::new(), task.id, org_id, None, now, 1, None, false)
        .await
        .unwrap();

    let http = reqwest::Client::new();
    let sink = LoggingSink;
    let ctx = WorkerContext {
        store: &store,
        http: &http,
        sink: &sink,
        ssrf_allowlist: &[],
        max_response_capture: 65_536,
        retry_backoff_base_s: 8,
        retry_backoff_max_s: 600,
        retry_jitter: 0.0,
        throttle_window_s: 300,
    };

    let mut finished_at_by_attempt = std::collections::HashMap::new();
    loop {
        let Some(execution) = store.claim_next_execution(Utc::now() + chrono::Duration::hours(1), 32, 4).await.unwrap() else {
            break;
        };
        let attempt = execution.attempt;
        perform(&ctx, execution.clone()).await.unwrap();
        let finished = store.get_execution(execution.id).await.unwrap();
        finished_at_by_attempt.insert(attempt, finished.finished_at.unwrap());
    }

    let all = store.list_executions_for_task(task.id).await.unwrap();
    assert_eq!(all.len(), 3);
    for execution in &all {
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.status_code, Some(500));
    }

    let attempt2 = all.iter().find(|e| e.attempt == 2).unwrap();
    let attempt3 = all.iter().find(|e| e.attempt == 3).unwrap();
    let gap_1_to_2 = attempt2.scheduled_for - *finished_at_by_attempt.get(&1).unwrap();
    let gap_2_to_3 = attempt3.scheduled_for - *finished_at_by_attempt.get(&2).unwrap();
    assert!(gap_1_to_2 >= chrono::Duration::seconds(8));
    assert!(gap_2_to_3 >= chrono::Duration::seconds(16));
}
