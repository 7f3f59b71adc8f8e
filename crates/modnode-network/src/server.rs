//! Local HTTP API server.
//!
//! Binds the listening socket up front (so callers learn the port before
//! serving) and runs the [`router`](crate::api::router) with `axum::serve`
//! until the shutdown token is cancelled. In-flight requests are allowed to
//! finish.
//!
//! # Example
//!
//! ```no_run
//! use modnode_network::{ApiServer, ApiServerConfig, ModuleApi};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(api: Arc<dyn ModuleApi>) -> Result<(), Box<dyn std::error::Error>> {
//! let server = ApiServer::bind(ApiServerConfig::default()).await?;
//! println!("listening on {}", server.local_addr()?);
//!
//! let shutdown = CancellationToken::new();
//! server.serve(api, shutdown.clone()).await;
//! # Ok(())
//! # }
//! ```

use crate::api::{ModuleApi, router};
use crate::error::ServerError;
use modnode_core::constants::{DEFAULT_HTTP_PORT, MAX_REQUEST_BODY};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Configuration for [`ApiServer`]
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Address to listen on
    pub bind_addr: SocketAddr,

    /// Largest accepted request body, in bytes
    pub max_body: usize,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_HTTP_PORT)),
            max_body: MAX_REQUEST_BODY,
        }
    }
}

impl ApiServerConfig {
    /// Create a configuration listening on `bind_addr`
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Set the request body limit
    pub fn max_body(mut self, bytes: usize) -> Self {
        self.max_body = bytes;
        self
    }
}

/// HTTP server for the node API.
#[derive(Debug)]
pub struct ApiServer {
    listener: TcpListener,
    max_body: usize,
}

impl ApiServer {
    /// Bind the listening socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is unavailable.
    pub async fn bind(config: ApiServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        info!(addr = %listener.local_addr()?, "HTTP API listening");

        Ok(Self {
            listener,
            max_body: config.max_body,
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn serve(self, api: Arc<dyn ModuleApi>, shutdown: CancellationToken) {
        let app = router(api, self.max_body);

        let result = axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await;

        match result {
            Ok(()) => info!("HTTP API shut down"),
            Err(e) => error!(error = %e, "HTTP API stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ApiServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.bind_addr.ip().is_unspecified());
        assert_eq!(config.max_body, MAX_REQUEST_BODY);
    }

    #[tokio::test]
    async fn test_server_bind() {
        let server = ApiServer::bind(ApiServerConfig::new("127.0.0.1:0".parse().unwrap()))
            .await
            .unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_conflict_names_address() {
        let first = ApiServer::bind(ApiServerConfig::new("127.0.0.1:0".parse().unwrap()))
            .await
            .unwrap();
        let taken = first.local_addr().unwrap();

        let error = ApiServer::bind(ApiServerConfig::new(taken)).await.unwrap_err();
        assert!(error.to_string().contains(&taken.to_string()));
    }
}
