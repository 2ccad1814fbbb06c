//! Netboot daemon
//!
//! Serves iPXE scripts, kickstart and ignition documents and phone-home
//! relays to bare-metal machines, backed by the hardware inventory.
//!
//! Configuration comes from environment variables (see `netboot::Config`).

use anyhow::{Context, Result};
use inventory_client::{InventoryClient, InventoryClientTrait};
use netboot::{Config, NetbootServer};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting netboot daemon");

    let config = Config::from_env().context("invalid configuration")?;

    info!("Configuration:");
    info!("  HTTP: {}", config.http_addr);
    info!("  Public URL: {}", config.public_url());
    info!("  Facility: {}", config.facility_code);
    info!("  Inventory URL: {}", config.inventory_url);
    info!("  Trusted proxies: {}", config.trusted_proxies.len());

    let inventory = InventoryClient::new(
        config.inventory_url.clone(),
        config.inventory_token.clone(),
        config.inventory_timeout,
    )
    .context("failed to build inventory client")?;

    // Requests fail closed while the inventory is down, so a bad token or an
    // unreachable backend at startup is not fatal.
    info!("Validating inventory token and connectivity...");
    match inventory.validate_token().await {
        Ok(()) => info!("Inventory token validated"),
        Err(e) => warn!("Inventory validation failed (will continue): {}", e),
    }

    let server = NetbootServer::new(config, Arc::new(inventory)).context("failed to initialize server")?;
    server.run(shutdown_signal()).await.context("server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
