#![warn(clippy::all)]

mod alert;
mod channel;
mod config;
mod database;
mod error;
mod fleet;
mod heartbeat;
mod pool;
mod scheduler;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::Parser;
use tokio::sync::mpsc;

use alert::{LogAlertSink, UptimeDeterminer};
use channel::LoopbackChannel;
use config::{Config, DeploymentMode};
use fleet::WorkerFleetRegistry;
use heartbeat::{CheckTimeouts, HeartbeatExecutor};
use scheduler::SchedulerCore;

#[derive(Parser, Debug)]
#[command(name = "uptide", version, about = "Distributed uptime monitoring engine")]
struct Cli {
    /// Path to the config file (defaults to $XDG_CONFIG_HOME/uptide/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the deployment mode from the config file
    #[arg(long, value_enum)]
    mode: Option<CliMode>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliMode {
    Monolith,
    Distributed,
}

impl From<CliMode> for DeploymentMode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::Monolith => DeploymentMode::Monolith,
            CliMode::Distributed => DeploymentMode::Distributed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logger::init();

    let cli = Cli::parse();
    let config = Config::from_config(cli.config.as_deref())
        .map_err(|err| anyhow!("failed to load config: {err:?}"))?;
    let mode = cli.mode.map(DeploymentMode::from).unwrap_or(config.deployment.mode);

    tracing::info!(?mode, database = %config.database.path, "starting uptide");

    let pool = pool::build_pool(&config.database.path).await?;
    {
        let conn = pool.get().await?;
        database::initialize_database(&conn).await?;
    }
    let db: Arc<dyn database::Database> = Arc::new(database::DatabaseImpl::new_from_pool(pool));

    // TODO: replace the loopback channel with the websocket transport once
    // the worker agent lands.
    let channel = Arc::new(LoopbackChannel::new());
    let fleet = Arc::new(WorkerFleetRegistry::new(db.clone(), channel.clone()));

    let determiner = Arc::new(UptimeDeterminer::new(db.clone(), vec![Arc::new(LogAlertSink)]));
    let executor = Arc::new(HeartbeatExecutor::new(
        db.clone(),
        determiner,
        config.scheduler.max_concurrent_checks,
        CheckTimeouts {
            default_ms: config.checks.default_timeout_ms,
            ceiling_ms: config.checks.transport_timeout_ms,
        },
    )?);

    let scheduler = Arc::new(SchedulerCore::new(
        mode,
        db.clone(),
        executor,
        fleet.clone(),
        channel.clone(),
        config.scheduler.bootstrap_page_size,
    ));

    let (_event_tx, event_rx) = mpsc::channel(64);
    let fleet_loop = tokio::spawn(Arc::clone(&fleet).run_event_loop(event_rx));

    scheduler.bootstrap().await?;
    let sweep = scheduler.start_liveness_sweep(config.scheduler.liveness_interval_secs);

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    sweep.abort();
    fleet_loop.abort();
    Ok(())
}
