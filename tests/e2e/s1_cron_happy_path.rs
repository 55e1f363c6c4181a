//! S1 - Cron happy path (spec.md §8): a cron task due `now` materializes
//! one pending execution, the worker claims and runs it successfully, and
//! the scheduler advances `next_run_at` to the next five-minute boundary.

use chrono::{TimeZone, Utc};
use dispatch_shared::ids::TaskId;
use dispatch_shared::types::{HttpMethod, ScheduleType};
use dispatch_scheduler::scheduler::{tick, SchedulerTickConfig};
use dispatch_store::tasks::TaskInput;
use dispatch_store::Store;
use dispatch_store::MIGRATOR;
use dispatch_worker::dispatch::{perform, WorkerContext};
use dispatch_worker::notifier::LoggingSink;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::seed_org;

#[sqlx::test(migrator = "MIGRATOR")]
async fn cron_task_fires_runs_and_reschedules(pool: sqlx::PgPool) {
    let store = Store::new(pool);
    let now = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
    let org_id = seed_org(&store, dispatch_shared::types::Tier::Free, now).await;

    let upstream = MockServer::start().await;
    Mock::given(method("GET")).and(path("/ok")).respond_with(ResponseTemplate::new(200)).mount(&upstream).await;

    let task = store
        .upsert_task(&TaskInput {
            id: TaskId::new(),
            organization_id: org_id,
            name: "ok-check".to_string(),
            url: format!("{}/ok", upstream.uri()),
            method: HttpMethod::Get,
            headers: serde_json::json!({}),
            body: None,
            schedule_type: ScheduleType::Cron,
            cron_expression: Some("*/5 * * * *".to_string()),
            scheduled_at: None,
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

    let report = tick(&store, now, SchedulerTickConfig { horizon_s: 30, missed_fire_threshold_s: 120 }).await;
    assert_eq!(report.materialized, 1);
    assert_eq!(report.errors, 0);

    let refreshed = store.get_task(task.id).await.unwrap();
    assert_eq!(refreshed.next_run_at, Some(Utc.with_ymd_and_hms(2026, 3, 2, 12, 5, 0).unwrap()));

    let execution = store.claim_next_execution(now, 32, 4).await.unwrap().expect("execution claimable");
    assert_eq!(execution.scheduled_for, now);

    let http = reqwest::Client::new();
    let sink = LoggingSink;
    let ctx = WorkerContext {
        store: &store,
        http: &http,
        sink: &sink,
        ssrf_allowlist: &[],
        max_response_capture: 65_536,
        retry_backoff_base_s: 10,
        retry_backoff_max_s: 600,
        retry_jitter: 0.0,
        throttle_window_s: 300,
    };
    perform(&ctx, execution.clone()).await.unwrap();

    let finished = store.get_execution(execution.id).await.unwrap();
    assert_eq!(finished.status, dispatch_shared::types::ExecutionStatus::Success);
    assert_eq!(finished.status_code, Some(200));
}
