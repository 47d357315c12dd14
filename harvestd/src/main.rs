use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info};

use harvestd::api::{router, AppState};
use harvestd::registry::Registry;
use harvestd::store::ConfigStore;
use harvestd::supervisor::Supervisor;

/// Harvest daemon - supervises report-harvest workers
#[derive(Parser)]
#[command(name = "harvestd", about = "Supervisor and control daemon for report-harvest workers")]
struct Args {
    /// Address for the local control listener
    #[arg(long, default_value = "127.0.0.1:5000")]
    listen: SocketAddr,

    /// Directory holding the persisted job document (default: ~/.harvestd)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory containing the worker executables (default: current dir)
    #[arg(long, default_value = ".")]
    workers_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting harvest daemon");

    let data_dir = args.data_dir.unwrap_or_else(harvestd::global_state_dir);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&data_dir)?;
    }
    #[cfg(not(unix))]
    {
        std::fs::create_dir_all(&data_dir)?;
    }

    let registry = Registry::builtin(&args.workers_dir);
    let store = ConfigStore::new(data_dir.join("jobs.json"));
    let state = AppState::new(registry, store, Supervisor::new());

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    info!("Control listener on {}", args.listen);

    let shutdown_state = state.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            info!("Shutdown requested, stopping workers");
            if let Err(e) = shutdown_state.supervisor.stop_all().await {
                error!("Error stopping workers during shutdown: {}", e);
            }
        })
        .await?;

    info!("Daemon shutting down");
    Ok(())
}
