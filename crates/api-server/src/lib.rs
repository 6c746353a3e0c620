//! Monitoring and control surface for the autonomous trading core.
//!
//! # Features
//!
//! - **REST API**: health, metrics, configuration, candidates, emergency stop
//! - **OpenAPI**: auto-generated Swagger documentation under `/docs`
//!
//! Handlers never touch trading state directly: they read published
//! snapshots and talk to the scheduler through the emergency-stop handle.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use systemx_core::config::MonitoringConfig;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Enable CORS for all origins (dashboard access).
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_permissive: true,
        }
    }
}

impl ServerConfig {
    pub fn from_monitoring(monitoring: &MonitoringConfig) -> Self {
        Self {
            host: monitoring.host.clone(),
            port: monitoring.port,
            ..Default::default()
        }
    }

    /// Get the socket address.
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

/// The API server.
pub struct ApiServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    /// Serve until the process exits or the task is aborted.
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.socket_addr()?;

        let mut router = routes::create_router(self.state).layer(
            TraceLayer::new_for_http()
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );
        if self.config.cors_permissive {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "Monitoring surface listening");
        axum::serve(listener, router).await?;
        Ok(())
    }
}
