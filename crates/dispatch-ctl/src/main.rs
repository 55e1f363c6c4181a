//! `dispatch-ctl`: the operator CLI. Talks to the database directly
//! (rather than through `dispatch-api`) the same way the `dispatch-worker`
//! and `dispatch-scheduler` binaries do, since this tool runs alongside
//! those processes rather than as an external API client.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use dispatch_shared::config::DispatchConfig;
use dispatch_shared::ids::OrganizationId;
use dispatch_store::Store;
use sqlx::postgres::PgPoolOptions;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "dispatch-ctl", version, about = "Operator CLI for the dispatch task scheduler", styles = output::clap_styles())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run pending database migrations.
    Migrate,
    /// Run the HTTP API in the foreground (equivalent to the `dispatch-api` binary).
    Serve,
    /// Manage tasks.
    Task {
        #[command(subcommand)]
        cmd: TaskCommands,
    },
    /// Manage queues.
    Queue {
        #[command(subcommand)]
        cmd: QueueCommands,
    },
    /// Inspect monitors.
    Monitor {
        #[command(subcommand)]
        cmd: MonitorCommands,
    },
    /// Replay a fan-out endpoint's inbound event.
    Endpoint {
        #[command(subcommand)]
        cmd: EndpointCommands,
    },
    /// Mint API keys.
    Apikey {
        #[command(subcommand)]
        cmd: ApikeyCommands,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Create a one-shot or cron task.
    Create {
        #[arg(long)]
        org: OrganizationId,
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
        #[arg(long)]
        cron: Option<String>,
        #[arg(long)]
        queue: Option<String>,
    },
    /// List an organization's tasks.
    List {
        #[arg(long)]
        org: OrganizationId,
    },
    /// Insert an immediate pending execution for a task.
    Trigger {
        task_id: dispatch_shared::ids::TaskId,
    },
}

#[derive(Subcommand)]
enum QueueCommands {
    List {
        #[arg(long)]
        org: OrganizationId,
    },
    Pause {
        #[arg(long)]
        org: OrganizationId,
        name: String,
    },
    Resume {
        #[arg(long)]
        org: OrganizationId,
        name: String,
    },
}

#[derive(Subcommand)]
enum MonitorCommands {
    List {
        #[arg(long)]
        org: OrganizationId,
    },
}

#[derive(Subcommand)]
enum EndpointCommands {
    Replay {
        event_id: dispatch_shared::ids::InboundEventId,
    },
}

#[derive(Subcommand)]
enum ApikeyCommands {
    Create {
        #[arg(long)]
        org: OrganizationId,
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    dispatch_shared::logging::init(std::env::var("LOG_FORMAT").as_deref() == Ok("json"));

    if let Err(err) = run().await {
        output::error(format!("{err:#}"));
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = DispatchConfig::load()?;

    if matches!(cli.command, Commands::Migrate) {
        let pool = PgPoolOptions::new().max_connections(1).connect(&config.database.url).await?;
        dispatch_store::MIGRATOR.run(&pool).await?;
        output::success("migrations applied");
        return Ok(());
    }

    if matches!(cli.command, Commands::Serve) {
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .connect(&config.database.url)
            .await?;
        dispatch_store::MIGRATOR.run(&pool).await?;
        let store = std::sync::Arc::new(Store::new(pool));
        let config = std::sync::Arc::new(config);
        let state = dispatch_api::state::AppState::new(store.clone(), config.clone());
        let app = dispatch_api::router(state);
        let listener = tokio::net::TcpListener::bind(&config.api.bind_addr).await?;
        output::success(format!("listening on {}", config.api.bind_addr));
        axum::serve(listener, app).await?;
        return Ok(());
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;
    let store = Store::new(pool);

    match cli.command {
        Commands::Migrate | Commands::Serve => unreachable!("handled above"),
        Commands::Task { cmd } => commands::task::handle(&store, cmd).await,
        Commands::Queue { cmd } => commands::queue::handle(&store, cmd).await,
        Commands::Monitor { cmd } => commands::monitor::handle(&store, cmd).await,
        Commands::Endpoint { cmd } => commands::endpoint::handle(&store, cmd).await,
        Commands::Apikey { cmd } => commands::apikey::handle(&store, cmd).await,
    }
}
