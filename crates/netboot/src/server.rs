//! Netboot server.
//!
//! Wires the resolver, installers, event forwarder and metrics together and
//! runs the HTTP front until shutdown is requested.

use crate::client_addr::TrustedProxies;
use crate::config::Config;
use crate::dhcp::DhcpResponder;
use crate::error::BootError;
use crate::events::EventForwarder;
use crate::http::{self, AppState};
use crate::installers::Installers;
use crate::job::Resolver;
use crate::metrics::Metrics;
use axum::Router;
use chrono::Utc;
use inventory_client::InventoryClientTrait;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Debug)]
pub struct NetbootServer {
    config: Arc<Config>,
    state: AppState,
}

impl NetbootServer {
    pub fn new(config: Config, inventory: Arc<dyn InventoryClientTrait>) -> Result<Self, BootError> {
        let config = Arc::new(config);
        let resolver = Arc::new(Resolver::new(
            Arc::clone(&inventory),
            config.facility_code.clone(),
            config.inventory_timeout,
        ));

        let state = AppState {
            resolver,
            installers: Arc::new(Installers::new(Arc::clone(&config))),
            forwarder: Arc::new(EventForwarder::new(inventory, config.inventory_timeout)),
            metrics: Arc::new(Metrics::new()?),
            proxies: Arc::new(TrustedProxies::new(config.trusted_proxies.clone())),
            started: Instant::now(),
            started_at: Utc::now(),
        };

        Ok(Self { config, state })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> Router {
        http::router(self.state.clone())
    }

    /// DHCP responder sharing this server's resolver and metrics
    pub fn dhcp_responder(&self) -> DhcpResponder {
        DhcpResponder::new(
            Arc::clone(&self.state.resolver),
            Arc::clone(&self.config),
            Arc::clone(&self.state.metrics),
        )
    }

    /// Serve HTTP on the configured address until `shutdown` completes.
    pub async fn run<F>(self, shutdown: F) -> Result<(), BootError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.http_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve HTTP on an already bound listener until `shutdown` completes.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), BootError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(
            "Serving HTTP on {} as {} (inventory {})",
            listener.local_addr()?,
            self.config.public_url(),
            self.state.resolver.inventory().base_url()
        );

        axum::serve(listener, self.router().into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}
