//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the polling and status handlers
//! - Wire up middleware (tracing, request timeout)
//! - Bind server to listener
//! - Close every polling connection when shutdown begins

use std::time::Duration;

use axum::{
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::validation::validate_config;
use crate::config::{ConfigError, ServerConfig};
use crate::http::handlers::{handle_poll, handle_status};
use crate::polling::Transport;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub transport: Transport,
}

/// HTTP server exposing a polling transport.
pub struct PollingServer {
    router: Router,
    config: ServerConfig,
    transport: Transport,
}

impl PollingServer {
    /// Create a new HTTP server serving `transport`.
    ///
    /// The configuration is validated here as well, so a hand-built config
    /// cannot set a request timeout that cuts parked polls short.
    pub fn new(config: ServerConfig, transport: Transport) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let state = AppState {
            transport: transport.clone(),
        };
        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            config,
            transport,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        let path = mount_path(&config.listener.path);
        let status_path = format!("{}/status", path.trim_end_matches('/'));

        Router::new()
            .route(&path, any(handle_poll))
            .route(&status_path, get(handle_status))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.listener.request_timeout_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// Add application routes (handshake, admin) next to the polling endpoint.
    pub fn merge(mut self, routes: Router) -> Self {
        self.router = self.router.merge(routes);
        self
    }

    /// The router, for embedding into a larger application.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            path = %self.config.listener.path,
            "Polling server starting"
        );

        let transport = self.transport.clone();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                // Parked polls would otherwise hold the drain open until their ping timeout.
                transport.close_all();
            })
            .await?;

        tracing::info!("Polling server stopped");
        Ok(())
    }
}

fn mount_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}
