//! `dispatch-ctl queue ...`.

use dispatch_store::Store;

use crate::output;
use crate::QueueCommands;

pub async fn handle(store: &Store, cmd: QueueCommands) -> anyhow::Result<()> {
    match cmd {
        QueueCommands::List { org } => list(store, org).await,
        QueueCommands::Pause { org, name } => {
            store.set_queue_paused(org, &name, true).await?;
            output::success(format!("paused queue {name}"));
            Ok(())
        }
        QueueCommands::Resume { org, name } => {
            store.set_queue_paused(org, &name, false).await?;
            output::success(format!("resumed queue {name}"));
            Ok(())
        }
    }
}

async fn list(store: &Store, org: dispatch_shared::ids::OrganizationId) -> anyhow::Result<()> {
    let queues = store.list_queues(org).await?;
    if queues.is_empty() {
        output::dim("no queues");
        return Ok(());
    }
    for queue in queues {
        let state = if queue.paused { "paused" } else { "running" };
        output::item(format!("{} ({state})", queue.name));
    }
    Ok(())
}
