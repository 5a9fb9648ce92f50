//! verse-gateway — 诗歌生成网关服务入口
//!
//! Usage:
//!   verse-gateway            Serve on BIND_ADDR (default 0.0.0.0:3000)
//!
//! Configuration is read from the environment; see `GatewayConfig::from_env`.

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use verse_gateway::config::GatewayConfig;
use verse_gateway::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::from_env().context("loading configuration")?;
    let state = AppState::from_config(&config)
        .await
        .context("building gateway state")?;
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;

    server::serve(listener, state).await?;
    Ok(())
}
