//! Cheops webhook server

use anyhow::Context;
use cheops_config::load_system_config;
use cheops_config::system::DEFAULT_CONFIG_PATH;
use cheops_scheduler::Orchestrator;
use cheops_server::{AppState, routes};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cheops-server")]
#[command(about = "Cheops CI webhook server", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the server configuration
    #[arg(short, long, env = "CHEOPS_CONFIG_FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = load_system_config(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;
    info!(
        repositories = config.repositories.len(),
        sources = config.sources.len(),
        credentials = config.credentials.len(),
        "Configuration loaded"
    );

    let orchestrator = Orchestrator::from_config(&config)
        .await
        .context("initializing providers")?;
    orchestrator
        .register_repositories()
        .await
        .context("registering repositories")?;

    let state = AppState::new(Arc::new(orchestrator));
    let app = routes::router(state).layer(TraceLayer::new_for_http());

    let addr = config.general.bind_addr;
    info!("Starting server on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
    }
}
