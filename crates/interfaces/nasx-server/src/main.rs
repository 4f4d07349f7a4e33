use anyhow::Context;
use clap::Parser;
use nasx_server::{AppState, ServerConfig, ENDPOINTS};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();

    let fallback = if config.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("installing log subscriber")?;

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!("Starting {} on {}", nasx_config::SERVICE_NAME, listener.local_addr()?);
    info!("Available endpoints:");
    for (method, path) in ENDPOINTS {
        info!("  {:<5}{}", method, path);
    }
    for mount in &config.shares {
        info!("Share {} -> {}", mount.prefix, mount.mount_point);
    }
    if config.default_credentials().is_some() {
        info!("Default share credentials loaded from configuration");
    }

    let state = AppState::new(config.pipeline());
    nasx_server::serve(listener, state, shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
