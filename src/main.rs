//! Gridline Game Server
//!
//! Standalone authoritative server binary. Hosts two-player rooms on a
//! LAN-reachable TCP port until shut down with Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use gridline::{GameServer, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    info!("Gridline Server v{}", VERSION);

    let mut config = ServerConfig::default();
    if let Ok(addr) = std::env::var("GRIDLINE_ADDR") {
        config.bind_addr = addr
            .parse()
            .with_context(|| format!("invalid GRIDLINE_ADDR '{}'", addr))?;
    }

    let server = Arc::new(
        GameServer::bind(config)
            .await
            .context("failed to bind listener")?,
    );

    let signal_target = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_target.shutdown();
        }
    });

    server.run().await?;
    info!("server stopped");
    Ok(())
}
