//! `dispatch-ctl monitor ...`.

use dispatch_store::Store;

use crate::output;
use crate::MonitorCommands;

pub async fn handle(store: &Store, cmd: MonitorCommands) -> anyhow::Result<()> {
    match cmd {
        MonitorCommands::List { org } => list(store, org).await,
    }
}

async fn list(store: &Store, org: dispatch_shared::ids::OrganizationId) -> anyhow::Result<()> {
    let monitors = store.list_monitors(org).await?;
    if monitors.is_empty() {
        output::dim("no monitors");
        return Ok(());
    }
    for monitor in monitors {
        output::item(format!("{} {} ({:?})", monitor.id, monitor.name, monitor.status));
    }
    Ok(())
}
