//! ChunkVault Storage Node Daemon
//!
//! Serves the chunk API over HTTP from a local data directory and exposes
//! Prometheus metrics at `/metrics`.

use anyhow::Context;
use axum::{routing::get, Router};
use chunkvault_node::{install_recorder, router, BlobStore, NodeConfig, NodeState};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chunkvault-node")]
#[command(about = "ChunkVault storage node daemon")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "node.toml")]
    config: PathBuf,

    /// Node id (overrides config file)
    #[arg(long)]
    node_id: Option<String>,

    /// Storage directory (overrides config file)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// HTTP listen address (overrides config file)
    #[arg(short, long)]
    listen: Option<String>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit JSON logs
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!("ChunkVault Storage Node starting...");

    // Priority: CLI args > env > config file > defaults
    let config = NodeConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {:?}", cli.config))?
        .with_env_overrides()?
        .with_overrides(cli.node_id, cli.data_dir, cli.listen);

    if let Err(e) = config.validate() {
        error!(error = %e, "Configuration validation failed");
        return Err(e.into());
    }
    let addr = config.server.socket_addr()?;

    info!(
        node_id = %config.node.id,
        data_dir = ?config.storage.data_dir,
        listen = %addr,
        "Configuration loaded"
    );

    let metrics_handle = install_recorder().context("installing metrics recorder")?;

    let store = BlobStore::open(&config.storage.data_dir)
        .await
        .with_context(|| format!("opening data dir {:?}", config.storage.data_dir))?;
    let blobs = store.count().await?;
    let state = Arc::new(NodeState::new(config.node.id.clone(), store));
    state.metrics.set_blob_count(blobs);
    info!(blobs, "Blob store ready");

    let app = Router::new()
        .route(
            "/metrics",
            get(move || {
                let handle = metrics_handle.clone();
                async move { handle.render() }
            }),
        )
        .merge(router(state, config.server.max_blob_bytes()));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(addr = %addr, "Chunk API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Storage node shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
