//! `dispatch-ctl endpoint ...`.

use chrono::Utc;
use dispatch_shared::ids::ExecutionId;
use dispatch_store::Store;

use crate::output;
use crate::EndpointCommands;

pub async fn handle(store: &Store, cmd: EndpointCommands) -> anyhow::Result<()> {
    match cmd {
        EndpointCommands::Replay { event_id } => replay(store, event_id).await,
    }
}

async fn replay(store: &Store, event_id: dispatch_shared::ids::InboundEventId) -> anyhow::Result<()> {
    let event = store.get_inbound_event(event_id).await?;
    let endpoint = store.get_endpoint(event.endpoint_id).await?;
    if event.task_ids.is_empty() {
        anyhow::bail!("inbound event {event_id} has no forward tasks");
    }

    let now = Utc::now();
    let mut replayed = 0u32;
    for task_id in &event.task_ids {
        let Ok(task) = store.get_task(*task_id).await else {
            continue;
        };
        store
            .insert_pending_execution(ExecutionId::new(), task.id, endpoint.organization_id, task.queue.as_deref(), now, 1, None, true)
            .await?;
        replayed += 1;
    }
    if replayed == 0 {
        anyhow::bail!("all tasks referenced by inbound event {event_id} were deleted");
    }
    let _ = dispatch_scheduler::wake::notify_wake(store.pool()).await;
    output::success(format!("replayed {replayed} task(s) from event {event_id}"));
    Ok(())
}
