//! Error types for the polling transport.

use std::time::Duration;

use axum::http::Method;
use thiserror::Error;

use crate::polling::session::SessionId;

/// Errors surfaced by connections and the transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// A receive or send wait exceeded its bound.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Writing the message to the HTTP client failed.
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    /// The request names a session with no bound connection.
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),

    /// The connection was closed while (or before) waiting.
    #[error("connection closed")]
    Closed,

    /// Nobody claimed a posted message within the inbound timeout.
    #[error("no receiver claimed the message within {0:?}")]
    Busy(Duration),

    /// Another connection is already bound to the session id.
    #[error("session {0} is already bound to another connection")]
    SessionAlreadyBound(SessionId),

    /// The connection is already bound under a different session id.
    #[error("connection is already bound to session {0}")]
    ConnectionAlreadyBound(SessionId),

    /// The request body could not be read as text.
    #[error("unreadable request body: {0}")]
    BodyRead(String),

    /// Neither a receive-style nor a send-style request.
    #[error("method {0} not allowed")]
    MethodNotAllowed(Method),

    /// A configured default header is not a valid HTTP header.
    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },
}

impl TransportError {
    /// Short stable label, used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Timeout(_) => "timeout",
            TransportError::DeliveryFailed(_) => "delivery_failed",
            TransportError::UnknownSession(_) => "unknown_session",
            TransportError::Closed => "closed",
            TransportError::Busy(_) => "busy",
            TransportError::SessionAlreadyBound(_) => "session_already_bound",
            TransportError::ConnectionAlreadyBound(_) => "connection_already_bound",
            TransportError::BodyRead(_) => "body_read",
            TransportError::MethodNotAllowed(_) => "method_not_allowed",
            TransportError::InvalidHeader { .. } => "invalid_header",
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// The HTTP client went away before its response could be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("client disconnected before the response was written")]
pub struct ClientGone;
