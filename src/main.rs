use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{debug, info};

use data_explorer::{config::Config, routes::create_router, utils::init_logger, AppState, DataEngine};

#[derive(Debug, Parser)]
#[command(name = "data-explorer", version, about = "Tabular dataset profiling and chart aggregation server")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides server.host
    #[arg(long)]
    host: Option<String>,

    /// Overrides server.port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let _log_guard = init_logger(&config.logging)?;
    info!("Configuration loaded: {:?}", config.server);

    let engine = DataEngine::new(config.engine.clone());
    spawn_session_sweeper(engine.clone(), config.engine.session_sweep_interval_secs);

    let state = AppState {
        config: config.clone(),
        engine,
    };
    let app = create_router(state);

    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Server stopped");
    Ok(())
}

/// Periodically drops upload sessions abandoned by their clients.
fn spawn_session_sweeper(engine: DataEngine, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        // first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let reaped = engine.reap_idle_sessions().await;
            debug!(reaped, "Upload session sweep finished");
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
