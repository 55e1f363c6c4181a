//! `perform(exec)` (spec.md §4.4 steps 1-9): the body of the worker loop.
//! Loads the owning task, makes the HTTP call under the SSRF guard and a
//! hard timeout, evaluates success, writes the terminal outcome, and
//! drives the retry/quota/notifier/callback side effects.

use crate::notifier::{effective_flag, NotifyEvent, Notifier, Sink};
use crate::retry::backoff;
use crate::ssrf::SsrfGuard;
use chrono::Utc;
use dispatch_shared::error::DispatchError;
use dispatch_shared::ids::ExecutionId;
use dispatch_shared::types::ExecutionStatus;
use dispatch_store::models::{Execution, ExecutionOutcome, Task};
use dispatch_store::Store;
use secrecy::SecretString;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

pub struct WorkerContext<'a> {
    pub store: &'a Store,
    pub http: &'a reqwest::Client,
    pub sink: &'a dyn Sink,
    pub ssrf_allowlist: &'a [String],
    pub max_response_capture: usize,
    pub retry_backoff_base_s: u64,
    pub retry_backoff_max_s: u64,
    pub retry_jitter: f64,
    pub throttle_window_s: i64,
}

pub async fn perform(ctx: &WorkerContext<'_>, execution: Execution) -> Result<(), DispatchError> {
    let task = ctx.store.get_task(execution.task_id).await?;
    let previous_status = task.last_execution_status.clone();

    let (status, status_code, duration_ms, response_body, error_message) =
        dispatch_one(ctx, &task, &execution).await;

    let now = Utc::now();
    let truncated_body = response_body
        .as_deref()
        .map(|b| Store::truncate_response(b, ctx.max_response_capture));

    let outcome = ExecutionOutcome {
        status,
        status_code,
        duration_ms,
        response_body: truncated_body,
        error_message,
    };
    ctx.store.record_execution_finished(execution.id, now, &outcome).await?;
    ctx.store
        .record_task_last_execution(task.id, now, status_str(status))
        .await?;

    let is_retryable = matches!(status, ExecutionStatus::Failed | ExecutionStatus::Timeout);
    let will_retry = is_retryable && execution.attempt <= task.retry_attempts && !execution.is_internal;

    if will_retry {
        let delay = backoff(execution.attempt, ctx.retry_backoff_base_s, ctx.retry_backoff_max_s, ctx.retry_jitter);
        ctx.store
            .insert_pending_execution(
                ExecutionId::new(),
                task.id,
                task.organization_id,
                task.queue.as_deref(),
                now + delay,
                execution.attempt + 1,
                task.callback_url.as_deref(),
                false,
            )
            .await?;
        info!(task_id = %task.id, attempt = execution.attempt + 1, delay_ms = delay.num_milliseconds(), "scheduled retry");
    }

    if execution.attempt == 1 && !execution.is_internal {
        let org = ctx.store.get_organization(task.organization_id).await?;
        let new_count = ctx.store.bump_monthly_counter(task.organization_id, 1).await?;
        let cap = crate::quota::monthly_cap(org.tier);
        if let Some(event) = crate::quota::check_threshold(new_count, cap, org.warning_sent_at.is_some(), org.reached_sent_at.is_some()) {
            match event {
                crate::quota::QuotaThresholdEvent::Warning => ctx.store.mark_warning_sent(task.organization_id, now).await?,
                crate::quota::QuotaThresholdEvent::Reached => ctx.store.mark_reached_sent(task.organization_id, now).await?,
            }
            notify_quota_threshold(ctx, &org, event, now).await;
        }
    }

    if !execution.is_internal {
        maybe_notify(ctx, &task, &execution, status, will_retry, previous_status.as_deref(), now).await;
    }

    if !execution.is_internal {
        maybe_enqueue_callback(ctx, &task, &execution, status, status_code, duration_ms).await?;
    }

    Ok(())
}

async fn dispatch_one(
    ctx: &WorkerContext<'_>,
    task: &Task,
    execution: &Execution,
) -> (ExecutionStatus, Option<i32>, Option<i32>, Option<Vec<u8>>, Option<String>) {
    let url = match Url::parse(&task.url) {
        Ok(u) => u,
        Err(err) => return (ExecutionStatus::Failed, None, None, None, Some(format!("invalid url: {err}"))),
    };

    let guard = SsrfGuard::new(ctx.ssrf_allowlist);
    if let Err(err) = guard.check(&url) {
        return (ExecutionStatus::Failed, None, None, None, Some(err.to_string()));
    }

    let mut builder = ctx.http.request(task.method.as_reqwest(), url);
    if let Some(headers) = task.headers.as_object() {
        for (k, v) in headers {
            if let Some(v) = v.as_str() {
                builder = builder.header(k, v);
            }
        }
    }
    if let Some(body) = &task.body {
        builder = builder.body(body.clone());
    }
    builder = builder.timeout(Duration::from_millis(task.timeout_ms as u64));

    let started = std::time::Instant::now();
    let response = builder.send().await;
    let duration_ms = started.elapsed().as_millis() as i32;

    let response = match response {
        Ok(r) => r,
        Err(err) if err.is_timeout() => {
            return (ExecutionStatus::Timeout, None, Some(duration_ms), None, Some(err.to_string()));
        }
        Err(err) => {
            return (ExecutionStatus::Failed, None, Some(duration_ms), None, Some(err.to_string()));
        }
    };

    let status_code = response.status().as_u16() as i32;
    let body = response.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
    let truncated = Store::truncate_response(&body, ctx.max_response_capture);

    let status = evaluate_success(task, status_code, &truncated);
    (status, Some(status_code), Some(duration_ms), Some(body), None)
}

/// Spec.md §4.4 step 4: status-code check, then (if configured) a
/// substring body-pattern check within the truncated capture window.
fn evaluate_success(task: &Task, status_code: i32, truncated_body: &[u8]) -> ExecutionStatus {
    let status_ok = match &task.expected_status_codes {
        Some(codes) => codes.contains(&status_code),
        None => (200..300).contains(&status_code),
    };
    if !status_ok {
        return ExecutionStatus::Failed;
    }

    if let Some(pattern) = task.expected_body_pattern.as_deref().filter(|p| !p.is_empty()) {
        let found = std::str::from_utf8(truncated_body)
            .map(|s| s.contains(pattern))
            .unwrap_or(false);
        if !found {
            return ExecutionStatus::Failed;
        }
    }

    ExecutionStatus::Success
}

fn status_str(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Success => "success",
        ExecutionStatus::Failed => "failed",
        ExecutionStatus::Timeout => "timeout",
        ExecutionStatus::Pending => "pending",
        ExecutionStatus::Running => "running",
    }
}

async fn maybe_notify(
    ctx: &WorkerContext<'_>,
    task: &Task,
    execution: &Execution,
    status: ExecutionStatus,
    will_retry: bool,
    previous_status: Option<&str>,
    now: chrono::DateTime<Utc>,
) {
    let org = match ctx.store.get_organization(task.organization_id).await {
        Ok(org) => org,
        Err(err) => {
            warn!(error = %err, "failed to load organization for notifier decision");
            return;
        }
    };
    let secret = SecretString::from(org.webhook_secret.clone());
    let notifier = Notifier::new(ctx.store, ctx.sink, ctx.throttle_window_s);

    // A task minted for endpoint fan-out (spec.md §4.5) carries its
    // owning endpoint's `on_failure_url`/`on_recovery_url` as the webhook
    // target in preference to the organization's default.
    let endpoint = ctx.store.get_endpoint_for_task(task.id).await.ok().flatten();

    let is_final_failure = !will_retry && matches!(status, ExecutionStatus::Failed | ExecutionStatus::Timeout);
    if is_final_failure && effective_flag(task.notify_on_failure, org.notify_on_failure) {
        let webhook_url = endpoint.as_ref().and_then(|e| e.on_failure_url.as_deref()).or(org.webhook_url.as_deref());
        let _ = notifier
            .notify(task.organization_id, "task", task.id.0, NotifyEvent::Failure, org.email.as_deref(), webhook_url, &secret, now)
            .await;
    }

    let was_failing = matches!(previous_status, Some("failed") | Some("timeout"));
    if status == ExecutionStatus::Success && was_failing && effective_flag(task.notify_on_recovery, org.notify_on_recovery) {
        let webhook_url = endpoint.as_ref().and_then(|e| e.on_recovery_url.as_deref()).or(org.webhook_url.as_deref());
        let _ = notifier
            .notify(task.organization_id, "task", task.id.0, NotifyEvent::Recovery, org.email.as_deref(), webhook_url, &secret, now)
            .await;
    }

    let _ = execution;
}

/// Spec.md §4.9/C11: delivers the 80% warning / 100% reached threshold
/// crossing the same way task failure/recovery is delivered. The
/// at-most-once decision already happened in `check_threshold`/
/// `mark_*_sent`; the notifier's own throttle is a second, independent
/// guard rather than the source of truth here.
async fn notify_quota_threshold(
    ctx: &WorkerContext<'_>,
    org: &dispatch_store::models::Organization,
    event: crate::quota::QuotaThresholdEvent,
    now: chrono::DateTime<Utc>,
) {
    let notify_event = match event {
        crate::quota::QuotaThresholdEvent::Warning => NotifyEvent::QuotaWarning,
        crate::quota::QuotaThresholdEvent::Reached => NotifyEvent::QuotaReached,
    };
    let secret = SecretString::from(org.webhook_secret.clone());
    let notifier = Notifier::new(ctx.store, ctx.sink, ctx.throttle_window_s);
    let _ = notifier
        .notify(org.id, "organization", org.id.0, notify_event, org.email.as_deref(), org.webhook_url.as_deref(), &secret, now)
        .await;
}

/// Spec.md §4.4 step 9: delivered via the same worker pool as a synthetic
/// pending execution marked internal, with no retries and no notifier
/// feedback.
async fn maybe_enqueue_callback(
    ctx: &WorkerContext<'_>,
    task: &Task,
    execution: &Execution,
    status: ExecutionStatus,
    status_code: Option<i32>,
    duration_ms: Option<i32>,
) -> Result<(), DispatchError> {
    let Some(callback_url) = execution.callback_url.clone().or_else(|| task.callback_url.clone()) else {
        return Ok(());
    };

    let payload = serde_json::json!({
        "task_id": task.id,
        "execution_id": execution.id,
        "status": status_str(status),
        "status_code": status_code,
        "duration_ms": duration_ms,
    });

    let callback_task_id = dispatch_shared::ids::TaskId::new();
    ctx.store
        .upsert_task(&dispatch_store::tasks::TaskInput {
            id: callback_task_id,
            organization_id: task.organization_id,
            name: format!("callback:{}", execution.id),
            url: callback_url,
            method: dispatch_shared::types::HttpMethod::Post,
            headers: serde_json::json!({"content-type": "application/json"}),
            body: Some(serde_json::to_vec(&payload).unwrap_or_default()),
            schedule_type: dispatch_shared::types::ScheduleType::Once,
            cron_expression: None,
            scheduled_at: Some(Utc::now()),
            enabled: true,
            timeout_ms: 10_000,
            retry_attempts: 0,
            callback_url: None,
            expected_status_codes: None,
            expected_body_pattern: None,
            queue: None,
            next_run_at: None,
            notify_on_failure: Some(false),
            notify_on_recovery: Some(false),
            external_id: None,
        })
        .await?;

    ctx.store
        .insert_pending_execution(ExecutionId::new(), callback_task_id, task.organization_id, None, Utc::now(), 1, None, true)
        .await?;
    Ok(())
}
