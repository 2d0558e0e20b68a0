//! HTTP server using Axum
//!
//! Serves the chat page and upgrades `/ws` requests into relay connections.

use std::net::SocketAddr;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::config::{ConnectionConfig, ServerConfig};
use crate::error::{RelayError, Result};
use crate::hub::RegistryHandle;

use super::routes;

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: RegistryHandle,
    pub connection: ConnectionConfig,
    pub started_at: Instant,
}

/// Relay HTTP server
pub struct RelayServer {
    config: ServerConfig,
    state: AppState,
}

impl RelayServer {
    /// Create a new server attached to a running registry
    pub fn new(
        server_config: ServerConfig,
        connection: ConnectionConfig,
        registry: RegistryHandle,
    ) -> Self {
        let state = AppState {
            registry,
            connection,
            started_at: Instant::now(),
        };

        Self {
            config: server_config,
            state,
        }
    }

    /// Build the router
    fn build_router(&self) -> Router {
        routes::create_router(self.state.clone()).layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address. Hostnames are resolved.
    pub async fn bind(&self) -> Result<TcpListener> {
        TcpListener::bind(self.config.addr.as_str())
            .await
            .map_err(|e| {
                RelayError::InvalidConfig(format!(
                    "cannot listen on {}: {}",
                    self.config.addr, e
                ))
            })
    }

    /// Bind the configured address and serve until shutdown
    #[instrument(skip(self, shutdown), fields(addr = %self.config.addr))]
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until shutdown
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let router = self.build_router();

        info!("Relay server listening on {}", listener.local_addr()?);

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow_and_update() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .map_err(|e| RelayError::Internal(e.to_string()))?;

        info!("Relay server shut down");
        Ok(())
    }
}
