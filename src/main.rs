use std::sync::Arc;

use anyhow::Context;
use prefix_proxy::config::Config;
use prefix_proxy::server::{self, Router};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;

    let router = Router::from_config(&cfg.mounts).context("invalid mount configuration")?;
    if router.is_empty() {
        tracing::warn!("No mounts configured, every request will get 404");
    }

    tokio::select! {
        res = server::listener::run(&cfg.server.listen_addr, Arc::new(router)) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
