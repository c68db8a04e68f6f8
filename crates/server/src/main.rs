//! Tideway - transfer proxy for Bedrock servers
//!
//! Main proxy binary

mod console;

use anyhow::Context;
use std::sync::Arc;
use tideway_config::ProxyConfig;
use tideway_network::{NetworkConfig, ProxyServer, ServerInfoMap};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(level: &str) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging is not up yet; report a bad config once it is
    let loaded = ProxyConfig::load_default();
    let config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => ProxyConfig::default(),
    };
    init_tracing(&config.log_level);

    info!("🌊 Tideway starting up...");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    match loaded {
        Ok(_) => info!("✓ Configuration loaded from config/"),
        Err(e) => {
            warn!("⚠️  Failed to load config/: {}", e);
            warn!("   Using default configuration (port 19132, no servers)");
            info!("   Create config/proxy.txt and config/servers.txt to configure the proxy");
        }
    }
    config.display();

    if config.servers.is_empty() {
        warn!("No servers configured; players will be disconnected on join");
    }
    let servers = ServerInfoMap::from_entries(&config.servers);
    let network_config = NetworkConfig::from(&config);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let server = Arc::new(
        ProxyServer::bind(network_config, servers)
            .await
            .context("failed to start proxy")?,
    );
    info!("📡 Waiting for players on {}...", server.local_addr()?);

    tokio::spawn(console::run(server.clone()));

    if let Err(e) = server.run().await {
        error!("💥 Proxy error: {}", e);
        return Err(e.into());
    }
    info!("👋 Proxy shut down gracefully");
    Ok(())
}
