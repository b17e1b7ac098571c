//! Axum handlers for the polling endpoint.

use axum::{
    body::Body,
    extract::{rejection::QueryRejection, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::http::server::AppState;
use crate::polling::ResponseSink;

/// Query parameters of a polling request. Anything else the client sends
/// along (protocol version, cache busters) is ignored.
#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub sid: Option<String>,
}

/// Transport summary served next to the polling endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransportStatus {
    pub version: String,
    pub sessions: usize,
    pub parked_polls: usize,
    pub ping_interval_ms: u64,
    pub ping_timeout_ms: u64,
}

/// GET/POST entry point. Hands the request to the transport and relays its response.
///
/// Every response, including the ones produced here, carries the polling header set.
pub async fn handle_poll(
    State(state): State<AppState>,
    method: Method,
    query: Result<Query<SessionQuery>, QueryRejection>,
    body: Body,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Malformed polling query");
            return state
                .transport
                .respond(StatusCode::BAD_REQUEST, rejection.body_text())
                .into_response();
        }
    };

    let Some(sid) = query.sid.filter(|sid| !sid.is_empty()) else {
        return state
            .transport
            .respond(StatusCode::BAD_REQUEST, "missing sid")
            .into_response();
    };

    let (sink, pending) = ResponseSink::channel();
    let transport = state.transport.clone();

    // The exchange outlives this handler if the client disconnects, so that it
    // can tell a pending send its message never went out.
    tokio::spawn(async move {
        match transport.serve_request(&method, &sid, body, sink).await {
            Ok(exchange) => {
                tracing::trace!(session_id = %sid, method = %method, outcome = exchange.as_str(), "Polling request served");
            }
            Err(e) => {
                tracing::debug!(session_id = %sid, method = %method, error = %e, "Polling request failed");
            }
        }
    });

    match pending.wait().await {
        Some(response) => response.into_response(),
        None => state
            .transport
            .respond(StatusCode::INTERNAL_SERVER_ERROR, "exchange aborted")
            .into_response(),
    }
}

pub async fn handle_status(State(state): State<AppState>) -> Json<TransportStatus> {
    let policy = state.transport.ping_policy();
    Json(TransportStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions: state.transport.session_count(),
        parked_polls: state.transport.parked_polls(),
        ping_interval_ms: policy.interval.as_millis() as u64,
        ping_timeout_ms: policy.timeout.as_millis() as u64,
    })
}
