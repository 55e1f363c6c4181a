//! `dispatch-ctl task ...`.

use chrono::Utc;
use dispatch_shared::ids::{ExecutionId, TaskId};
use dispatch_shared::types::{HttpMethod, ScheduleType};
use dispatch_store::tasks::TaskInput;
use dispatch_store::Store;

use crate::output;
use crate::TaskCommands;

pub async fn handle(store: &Store, cmd: TaskCommands) -> anyhow::Result<()> {
    match cmd {
        TaskCommands::Create { org, name, url, cron, queue } => create(store, org, name, url, cron, queue).await,
        TaskCommands::List { org } => list(store, org).await,
        TaskCommands::Trigger { task_id } => trigger(store, task_id).await,
    }
}

async fn create(
    store: &Store,
    org: dispatch_shared::ids::OrganizationId,
    name: String,
    url: String,
    cron: Option<String>,
    queue: Option<String>,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let (schedule_type, cron_expression, scheduled_at, next_run_at) = match &cron {
        Some(expr) => {
            let next = dispatch_shared::cron::next(expr, now + chrono::Duration::seconds(1))?;
            (ScheduleType::Cron, Some(expr.clone()), None, Some(next))
        }
        None => (ScheduleType::Once, None, Some(now), Some(now)),
    };

    let input = TaskInput {
        id: TaskId::new(),
        organization_id: org,
        name,
        url,
        method: HttpMethod::Get,
        headers: serde_json::json!({}),
        body: None,
        schedule_type,
        cron_expression,
        scheduled_at,
        enabled: true,
        timeout_ms: 30_000,
        retry_attempts: 3,
        callback_url: None,
        expected_status_codes: None,
        expected_body_pattern: None,
        queue,
        next_run_at,
        notify_on_failure: None,
        notify_on_recovery: None,
        external_id: None,
    };

    let task = store.upsert_task(&input).await?;
    let _ = dispatch_scheduler::wake::notify_wake(store.pool()).await;
    output::success(format!("created task {}", task.id));
    output::label("name", &task.name);
    output::label("url", &task.url);
    Ok(())
}

async fn list(store: &Store, org: dispatch_shared::ids::OrganizationId) -> anyhow::Result<()> {
    let tasks = store.list_tasks(org).await?;
    if tasks.is_empty() {
        output::dim("no tasks");
        return Ok(());
    }
    for task in tasks {
        output::item(format!("{} {} ({:?})", task.id, task.name, task.status()));
    }
    Ok(())
}

async fn trigger(store: &Store, task_id: TaskId) -> anyhow::Result<()> {
    let task = store.get_task(task_id).await?;
    let now = Utc::now();
    store
        .insert_pending_execution(ExecutionId::new(), task.id, task.organization_id, task.queue.as_deref(), now, 1, task.callback_url.as_deref(), false)
        .await?;
    let _ = dispatch_scheduler::wake::notify_wake(store.pool()).await;
    output::success(format!("queued execution for task {}", task.id));
    Ok(())
}
