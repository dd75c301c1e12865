use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use refgate::config::loader;
use refgate::state::GatewayState;

#[derive(Parser)]
#[command(name = "refgate")]
#[command(about = "Ref-scoped git smart HTTP gateway", long_about = None)]
struct Args {
    /// Path to a RON config file (default: discovery via REFGATE_CONFIG_PATH,
    /// refgate.ron, .refgate/config.ron)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file
    #[arg(long)]
    listen: Option<String>,

    /// Served hierarchy root, overrides the config file
    #[arg(long)]
    root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => loader::load_from_file(path)?,
        None => loader::load_with_discovery()?,
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Some(root) = args.root {
        config.app_root = root;
    }

    let listen_addr = config.listen_addr.clone();
    tracing::info!(
        "serving {} (repository {}) on {listen_addr}",
        config.app_root.display(),
        config.repository_dir().display()
    );

    let state = GatewayState::new(config)?;
    let app = refgate::app(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to install ctrl-c handler: {err}");
        return;
    }
    tracing::info!("shutting down");
}
