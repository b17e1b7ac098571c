//! Long-polling echo server.
//!
//! Serves the polling transport and a tiny demo application on top of it:
//! `POST {path}/open` issues a session id and attaches an echo loop that sends
//! every client message straight back.
//!
//! ```text
//!   browser ── POST /polling/open ──► session id + ping policy
//!           ── POST /polling?sid= ──► Connection::receive ─┐
//!           ◄─ GET  /polling?sid= ─── Connection::send ◄───┘ (echo)
//! ```

use std::path::PathBuf;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use clap::Parser;
use serde_json::json;
use tokio::net::TcpListener;
use uuid::Uuid;

use polling_transport::config::{load_config, ServerConfig};
use polling_transport::lifecycle::{shutdown_signal, Shutdown};
use polling_transport::observability::{logging, metrics};
use polling_transport::polling::{Connection, Transport, TransportError};
use polling_transport::PollingServer;

#[derive(Parser)]
#[command(name = "polling-server")]
#[command(about = "HTTP long-polling echo server", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!("polling-server v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        path = %config.listener.path,
        ping_interval_ms = config.transport.ping_interval_ms,
        ping_timeout_ms = config.transport.ping_timeout_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let transport = Transport::new(&config.transport)?;
    let open_path = format!("{}/open", config.listener.path.trim_end_matches('/'));
    let open_route = Router::new()
        .route(&open_path, post(open_session))
        .with_state(transport.clone());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = PollingServer::new(config, transport)?.merge(open_route);

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.trigger();
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Issue a session id, bind a fresh connection to it and start echoing.
async fn open_session(State(transport): State<Transport>) -> Response {
    let connection = transport.create_connection();
    let sid = Uuid::new_v4().simple().to_string();

    if let Err(e) = transport.bind_session(sid.as_str(), &connection) {
        // A fresh v4 id colliding is not something we recover from.
        tracing::error!(session_id = %sid, error = %e, "Failed to bind new session");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response();
    }

    let policy = connection.ping_policy();
    tokio::spawn(echo(connection));

    Json(json!({
        "sid": sid,
        "pingInterval": policy.interval.as_millis() as u64,
        "pingTimeout": policy.timeout.as_millis() as u64,
    }))
    .into_response()
}

/// Send every received message back until the client goes quiet.
async fn echo(connection: Connection) {
    loop {
        match connection.receive().await {
            Ok(message) => match connection.send(message).await {
                Ok(()) => {}
                Err(TransportError::Closed) => break,
                Err(e) => tracing::warn!(connection_id = %connection.id(), error = %e, "Echo not delivered"),
            },
            Err(TransportError::Timeout(_)) => {
                tracing::info!(connection_id = %connection.id(), "Client idle, closing session");
                connection.close();
                break;
            }
            Err(_) => break,
        }
    }
}
