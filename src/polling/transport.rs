//! The polling transport: session lifecycle and the request protocol.
//!
//! # Exchanges
//! ```text
//! GET  ?sid=..   Waiting ─┬─ message ready  → "<len>:<payload>"  → DeliveredData
//!                         ├─ ping timeout   → "1:3"              → DeliveredHeartbeat
//!                         ├─ write fails    → outcome to sender  → WriteFailed
//!                         ├─ client left    → nothing consumed   → ClientGone
//!                         └─ closed         → 410                → ConnectionClosed
//!
//! POST ?sid=..   read body → strip "<len>:" → hand to receive() → "ok" → Forwarded
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};

use crate::config::TransportConfig;
use crate::observability::metrics;
use crate::polling::connection::{Connection, PingPolicy, Polled, WriteOutcome};
use crate::polling::error::{TransportError, TransportResult};
use crate::polling::framing;
use crate::polling::session::{SessionId, SessionRegistry};
use crate::polling::sink::{polling_headers, PollResponse, ResponseSink};

/// Resolved transport settings, shared by the transport and its connections.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    pub receive_timeout: Duration,
    pub send_timeout: Duration,
    pub inbound_timeout: Duration,
    pub max_body_bytes: usize,
    /// Complete header set for every response (defaults plus fixed headers).
    pub headers: HeaderMap,
}

impl TryFrom<&TransportConfig> for TransportSettings {
    type Error = TransportError;

    fn try_from(config: &TransportConfig) -> Result<Self, Self::Error> {
        let mut defaults = HeaderMap::new();
        for (name, value) in &config.headers {
            let invalid = |reason: String| TransportError::InvalidHeader {
                name: name.clone(),
                reason,
            };
            let header_name =
                HeaderName::try_from(name.as_str()).map_err(|e| invalid(e.to_string()))?;
            let header_value =
                HeaderValue::try_from(value.as_str()).map_err(|e| invalid(e.to_string()))?;
            defaults.insert(header_name, header_value);
        }

        Ok(Self {
            ping_interval: config.ping_interval(),
            ping_timeout: config.ping_timeout(),
            receive_timeout: config.receive_timeout(),
            send_timeout: config.send_timeout(),
            inbound_timeout: config.inbound_timeout(),
            max_body_bytes: config.max_body_bytes,
            headers: polling_headers(&defaults),
        })
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        let config = TransportConfig::default();
        Self {
            ping_interval: config.ping_interval(),
            ping_timeout: config.ping_timeout(),
            receive_timeout: config.receive_timeout(),
            send_timeout: config.send_timeout(),
            inbound_timeout: config.inbound_timeout(),
            max_body_bytes: config.max_body_bytes,
            headers: polling_headers(&HeaderMap::new()),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) settings: Arc<TransportSettings>,
    pub(crate) sessions: SessionRegistry,
    parked_polls: AtomicUsize,
}

/// Counts a poll as parked for as long as it is alive.
struct ParkedPoll<'a>(&'a AtomicUsize);

impl<'a> ParkedPoll<'a> {
    fn enter(count: &'a AtomicUsize) -> Self {
        metrics::set_parked_polls(count.fetch_add(1, Ordering::SeqCst) + 1);
        Self(count)
    }
}

impl Drop for ParkedPoll<'_> {
    fn drop(&mut self) {
        metrics::set_parked_polls(self.0.fetch_sub(1, Ordering::SeqCst) - 1);
    }
}

/// Terminal state of one served request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    /// A queued message was written to the poll.
    DeliveredData,
    /// The poll idled out and got the heartbeat frame.
    DeliveredHeartbeat,
    /// Writing the poll's response failed.
    WriteFailed,
    /// The client left while the poll was waiting; nothing was consumed.
    ClientGone,
    /// The connection was closed while the poll was waiting.
    ConnectionClosed,
    /// A posted message was handed to the application.
    Forwarded,
}

impl Exchange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::DeliveredData => "delivered_data",
            Exchange::DeliveredHeartbeat => "delivered_heartbeat",
            Exchange::WriteFailed => "write_failed",
            Exchange::ClientGone => "client_gone",
            Exchange::ConnectionClosed => "connection_closed",
            Exchange::Forwarded => "forwarded",
        }
    }
}

/// Long-polling transport. One per server; cheap to clone.
#[derive(Debug, Clone)]
pub struct Transport {
    shared: Arc<Shared>,
}

impl Transport {
    /// Build a transport from configuration.
    pub fn new(config: &TransportConfig) -> TransportResult<Self> {
        Ok(Self::with_settings(TransportSettings::try_from(config)?))
    }

    pub fn with_settings(settings: TransportSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                settings: Arc::new(settings),
                sessions: SessionRegistry::new(),
                parked_polls: AtomicUsize::new(0),
            }),
        }
    }

    pub fn ping_policy(&self) -> PingPolicy {
        PingPolicy {
            interval: self.shared.settings.ping_interval,
            timeout: self.shared.settings.ping_timeout,
        }
    }

    /// Allocate a connection that is not yet reachable by any session id.
    pub fn create_connection(&self) -> Connection {
        Connection::new(&self.shared)
    }

    /// Make `connection` reachable by requests carrying `id`.
    ///
    /// See [`SessionRegistry::bind`] for the rebinding rules.
    pub fn bind_session(
        &self,
        id: impl Into<SessionId>,
        connection: &Connection,
    ) -> TransportResult<()> {
        let id = id.into();
        if let Err(e) = self.shared.sessions.bind(id.clone(), connection) {
            tracing::warn!(session_id = %id, connection_id = %connection.id(), error = %e, "Session bind rejected");
            return Err(e);
        }

        let sessions = self.shared.sessions.len();
        metrics::set_active_sessions(sessions);
        tracing::info!(session_id = %id, connection_id = %connection.id(), sessions, "Session bound");
        Ok(())
    }

    pub fn lookup(&self, id: &str) -> Option<Connection> {
        self.shared.sessions.get(id)
    }

    pub fn session_count(&self) -> usize {
        self.shared.sessions.len()
    }

    /// Number of GET requests currently waiting for data or a heartbeat.
    pub fn parked_polls(&self) -> usize {
        self.shared.parked_polls.load(Ordering::SeqCst)
    }

    /// Close every bound connection.
    pub fn close_all(&self) {
        let connections = self.shared.sessions.connections();
        let count = connections.len();
        for connection in connections {
            connection.close();
        }
        tracing::info!(count, "Closed all polling connections");
    }

    /// Serve one HTTP request for `session_id`, writing the response into `sink`.
    ///
    /// GET waits for outbound data (or a heartbeat); POST forwards the body to
    /// the application. Every path writes exactly one response, errors
    /// included.
    pub async fn serve_request(
        &self,
        method: &Method,
        session_id: &str,
        body: Body,
        sink: ResponseSink,
    ) -> TransportResult<Exchange> {
        if *method != Method::GET && *method != Method::POST {
            self.reject(sink, StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
            return Err(TransportError::MethodNotAllowed(method.clone()));
        }

        let Some(connection) = self.lookup(session_id) else {
            tracing::debug!(session_id, method = %method, "Request for unknown session");
            self.reject(sink, StatusCode::NOT_FOUND, "session not found");
            return Err(TransportError::UnknownSession(session_id.into()));
        };

        if *method == Method::GET {
            Ok(self.poll(session_id, &connection, sink).await)
        } else {
            self.deliver(session_id, &connection, body, sink).await
        }
    }

    async fn poll(&self, session_id: &str, connection: &Connection, mut sink: ResponseSink) -> Exchange {
        let wait = self.shared.settings.ping_timeout;

        let polled = {
            let _parked = ParkedPoll::enter(&self.shared.parked_polls);
            connection.next_outbound(wait, &mut sink).await
        };

        let exchange = match polled {
            Polled::Message(item) => {
                let frame = framing::encode(&item.payload);
                let (exchange, outcome) = match sink.write(self.respond(StatusCode::OK, frame)) {
                    Ok(()) => (Exchange::DeliveredData, WriteOutcome::Delivered),
                    Err(e) => (Exchange::WriteFailed, WriteOutcome::Failed(e.to_string())),
                };
                if item.outcome.send(outcome).is_err() {
                    tracing::debug!(session_id, "Sender stopped waiting before the outcome arrived");
                }
                exchange
            }
            Polled::Idle => match sink.write(self.respond(StatusCode::OK, framing::HEARTBEAT_FRAME)) {
                Ok(()) => Exchange::DeliveredHeartbeat,
                Err(e) => {
                    tracing::debug!(session_id, error = %e, "Heartbeat write failed");
                    Exchange::WriteFailed
                }
            },
            Polled::ClientGone => Exchange::ClientGone,
            Polled::Closed => {
                self.reject(sink, StatusCode::GONE, "connection closed");
                Exchange::ConnectionClosed
            }
        };

        metrics::record_exchange(exchange.as_str());
        tracing::debug!(session_id, connection_id = %connection.id(), outcome = exchange.as_str(), "Poll finished");
        exchange
    }

    async fn deliver(
        &self,
        session_id: &str,
        connection: &Connection,
        body: Body,
        sink: ResponseSink,
    ) -> TransportResult<Exchange> {
        let text = match read_body(body, self.shared.settings.max_body_bytes).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "Failed to read polling request body");
                self.reject(sink, StatusCode::BAD_REQUEST, "unreadable body");
                return Err(e);
            }
        };

        let payload = framing::strip_length_prefix(&text).to_string();

        if let Err(e) = connection.forward_inbound(payload).await {
            let status = match e {
                TransportError::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
                TransportError::Closed => StatusCode::GONE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            tracing::warn!(session_id, error = %e, "Inbound message not forwarded");
            self.reject(sink, status, &e.to_string());
            return Err(e);
        }

        if sink.write(self.respond(StatusCode::OK, "ok")).is_err() {
            tracing::debug!(session_id, "Client left before the acknowledgment was written");
        }
        metrics::record_exchange(Exchange::Forwarded.as_str());
        Ok(Exchange::Forwarded)
    }

    /// A response carrying the full polling header set.
    pub fn respond(&self, status: StatusCode, body: impl Into<String>) -> PollResponse {
        PollResponse::new(status, self.shared.settings.headers.clone(), body)
    }

    fn reject(&self, sink: ResponseSink, status: StatusCode, reason: &str) {
        // Nobody is left to tell if the client is gone.
        let _ = sink.write(self.respond(status, reason));
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::with_settings(TransportSettings::default())
    }
}

async fn read_body(body: Body, limit: usize) -> TransportResult<String> {
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| TransportError::BodyRead(e.to_string()))?;
    String::from_utf8(bytes.to_vec()).map_err(|e| TransportError::BodyRead(e.to_string()))
}
