//! HTTP front end for the template service.
//!
//! Every request that does not hit one of the `/_templet/*` endpoints is
//! handed to [`TemplateService::handle`](crate::service::TemplateService::handle)
//! on the blocking thread pool, and the resulting outcome is mapped onto an
//! HTTP response.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use templet::server::{ServerConfig, TemplateServer};
//! use templet::service::TemplateService;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = Arc::new(TemplateService::builder("templates").build()?);
//!     TemplateServer::new(ServerConfig::default(), service).run().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use crate::service::TemplateService;

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: SocketAddr,
    /// Whether to enable CORS
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            enable_cors: false,
        }
    }
}

impl ServerConfig {
    /// Set the bind address.
    pub fn with_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }

    /// Enable or disable CORS.
    pub fn with_cors(mut self, enabled: bool) -> Self {
        self.enable_cors = enabled;
        self
    }
}

/// The template HTTP server.
pub struct TemplateServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl TemplateServer {
    /// Create a server for `service`.
    pub fn new(config: ServerConfig, service: Arc<TemplateService>) -> Self {
        Self {
            config,
            state: Arc::new(AppState::new(service)),
        }
    }

    /// Build the router with all routes.
    pub fn router(&self) -> Router {
        let mut app = routes::template_routes(Arc::clone(&self.state));

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            app = app.layer(cors);
        }

        app.layer(TraceLayer::new_for_http())
    }

    /// Run the server until the process is stopped.
    pub async fn run(self) -> Result<(), std::io::Error> {
        self.run_with_shutdown(std::future::pending()).await
    }

    /// Run the server with graceful shutdown support.
    pub async fn run_with_shutdown(
        self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let addr = self.config.bind_address;
        let router = self.router();

        let listener = TcpListener::bind(addr).await?;
        info!(
            address = %listener.local_addr()?,
            root = %self.state.service.root().display(),
            "Serving templates"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
    }

    /// Get a reference to the application state.
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }
}

/// Resolves when the process receives Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
