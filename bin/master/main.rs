//! Fleet Benchmarker Master
//!
//! Runs the master node: snapshot fetcher, job scheduler and the worker
//! dispatch server, sharing one in-memory state.

use anyhow::Result;
use clap::Parser;
use fleet_benchmarker::{
    config::MasterConfig, dispatch, fetcher::SnapshotFetcher, scheduler::JobScheduler,
    state::MasterState,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "fleet-master")]
#[command(about = "Master node for a distributed benchmarking fleet")]
struct Args {
    /// Path to the master configuration file
    #[arg(short, long, default_value = "master.toml", env = "MASTER_CONFIG")]
    config: PathBuf,

    /// Override the dispatch server port
    #[arg(short, long, env = "MASTER_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fleet_benchmarker=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    let mut config = MasterConfig::load(&args.config)?;
    if let Some(port) = args.port {
        config.dispatch.port = port;
    }
    let config = Arc::new(config);

    info!("Starting Fleet Benchmarker Master");
    info!("  API URL: {}", config.api_url);
    info!("  Player: {}", config.player_id);
    info!("  Job pairs: {}", config.jobs.len());
    info!(
        "  Dispatch: {}:{}",
        config.dispatch.host, config.dispatch.port
    );

    let state = Arc::new(MasterState::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // First snapshot up front, so scheduling and dispatch never start
    // against an empty world.
    let fetcher = SnapshotFetcher::new(config.clone(), state.clone(), shutdown_rx.clone());
    fetcher.refresh().await?;

    let scheduler = JobScheduler::new(config.clone(), state.clone(), shutdown_rx);
    let scheduler_handle = tokio::spawn(scheduler.run());
    let fetcher_handle = tokio::spawn(fetcher.run());

    let host = config.dispatch.host.clone();
    let port = config.dispatch.port;
    tokio::select! {
        result = dispatch::serve(state, &host, port) => {
            if let Err(e) = result {
                error!("dispatch server failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received exit signal, shutting down");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = scheduler_handle.await;
    let _ = fetcher_handle.await;

    Ok(())
}
