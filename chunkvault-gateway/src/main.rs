//! ChunkVault Gateway
//!
//! Serves the file and admin API, and runs the node health monitor and the
//! rebalancer daemon in the background.

use anyhow::Context;
use chunkvault_gateway::{
    metrics, router, AppState, GatewayConfig, NodeMonitor, RebalancerDaemon,
};
use chunkvault_metadata::{MemoryMetadataStore, MetadataStore, PgMetadataStore};
use chunkvault_network::{ChunkStore, HttpChunkStore};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chunkvault-gateway")]
#[command(about = "ChunkVault encrypted replicated storage gateway")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    /// HTTP listen address (overrides config file)
    #[arg(short, long)]
    listen: Option<String>,

    /// PostgreSQL URL; without one metadata is kept in memory
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

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

    info!("ChunkVault Gateway starting...");

    // Priority: CLI args > env > config file > defaults
    let mut config = GatewayConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {:?}", cli.config))?
        .with_env_overrides()?;
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }
    if let Some(url) = cli.database_url {
        config.database.url = Some(url);
    }
    if let Err(e) = config.validate() {
        error!(error = %e, "Configuration validation failed");
        return Err(e.into());
    }
    let addr = config.server.socket_addr()?;

    info!(
        listen = %addr,
        replication_factor = config.storage.replication_factor,
        chunk_size = config.storage.chunk_size,
        configured_nodes = config.nodes.len(),
        "Configuration loaded"
    );

    let metrics_handle = metrics::install_recorder().context("installing metrics recorder")?;

    let store: Arc<dyn MetadataStore> = match config.db_config() {
        Some(db) => {
            let pg = PgMetadataStore::connect(&db)
                .await
                .context("connecting to metadata database")?;
            pg.migrate().await.context("running migrations")?;
            info!("Using PostgreSQL metadata store");
            Arc::new(pg)
        }
        None => {
            warn!("No database configured; metadata is kept in memory and lost on exit");
            Arc::new(MemoryMetadataStore::new())
        }
    };
    let chunks: Arc<dyn ChunkStore> = Arc::new(HttpChunkStore::new(config.node_client_config())?);

    let state = Arc::new(AppState::new(&config, store.clone(), chunks.clone())?);
    let nodes = state.registry().register_configured(&config.nodes).await?;
    info!(
        registered = nodes.len(),
        up = nodes.iter().filter(|n| n.is_up()).count(),
        "Configured nodes registered"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let monitor = Arc::new(NodeMonitor::new(
        store,
        chunks,
        config.health.check_interval(),
    ));
    let monitor_handle = monitor.start(shutdown_rx.clone());

    let rebalancer = Arc::new(RebalancerDaemon::new());
    let rebalancer_handle = rebalancer.start(state.clone(), shutdown_rx);

    let app = router(state, &config.server).merge(metrics::routes(metrics_handle));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(addr = %addr, "Gateway API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(monitor_handle, rebalancer_handle);

    info!("Gateway shutdown complete");
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
