//! Gatescan worker binary.
//!
//! Usage:
//!     gatescan-worker serve
//!     gatescan-worker set-epoch [--epoch N]

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use gatescan_protocol::config::WorkerConfig;
use gatescan_worker::{ClusterCoordinator, EngineClient, ScannerTaskService, WorkerPool};

#[derive(Parser, Debug)]
#[command(name = "gatescan-worker", about = "Gatescan scan worker")]
struct Args {
    /// Verbose logging (RUST_LOG overrides)
    #[arg(long, short)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the worker pool (default)
    Serve,
    /// Bump the cluster target epoch to trigger a coordinated reload
    SetEpoch {
        /// Target epoch; defaults to TARGET_EPOCH or current + 1
        #[arg(long, env = "TARGET_EPOCH")]
        epoch: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    gatescan_logging::init_logging(gatescan_logging::LogConfig {
        verbose: args.verbose,
    });

    let config = Arc::new(WorkerConfig::from_env());

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::SetEpoch { epoch } => set_epoch(config, epoch).await,
    }
}

async fn serve(config: Arc<WorkerConfig>) -> anyhow::Result<()> {
    info!("starting gatescan worker");
    info!("  store:  {}", config.state_store_url);
    info!("  engine: {}", config.clamd_url);
    info!("  queues: {:?}", config.queues);
    info!("  node:   {}", config.node_id);

    let store = gatescan_state::open(&config.state_store_url)
        .await
        .context("failed to open state store")?;
    let engine = Arc::new(EngineClient::new(&config.clamd_url).context("bad CLAMD_URL")?);
    let service = Arc::new(ScannerTaskService::new(
        store.clone(),
        Arc::clone(&engine),
        Arc::clone(&config),
    ));
    let coordinator = Arc::new(ClusterCoordinator::new(
        store.clone(),
        Arc::clone(&engine),
        config.node_id.clone(),
        config.deployment_name.clone(),
    ));
    let pool = WorkerPool::new(store, service, coordinator, config.pool_size);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    pool.run(shutdown_rx).await
}

async fn set_epoch(config: Arc<WorkerConfig>, epoch: Option<u64>) -> anyhow::Result<()> {
    let store = gatescan_state::open(&config.state_store_url)
        .await
        .context("failed to open state store")?;
    let new_epoch = gatescan_worker::set_target_epoch(&store, epoch).await?;
    info!("target epoch set to {new_epoch}; nodes will reload sequentially");
    Ok(())
}
