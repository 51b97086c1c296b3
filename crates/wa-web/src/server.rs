//! Web shell configuration and startup

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tracing::info;
use wa_core::{Dispatcher, ServerConfig};

use crate::api::{WebState, create_router};
use crate::error::{Result, WebError};

/// Web shell configuration
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for WebConfig {
    fn from(config: &ServerConfig) -> Self {
        Self::new(config.host.clone(), config.port)
    }
}

impl WebConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .map_err(|e| WebError::ConfigError(format!("Invalid address {}: {}", addr, e)))
    }
}

/// Web shell server
pub struct WebServer {
    config: WebConfig,
    state: WebState,
}

impl WebServer {
    pub fn new(config: WebConfig, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            config,
            state: WebState::new(dispatcher),
        }
    }

    /// Get the router
    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.socket_addr()?;
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| WebError::ServerError(format!("Failed to bind {}: {}", addr, e)))?;

        info!("Web shell listening on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| WebError::ServerError(format!("Server error: {}", e)))?;

        info!("Web shell stopped");
        Ok(())
    }
}
