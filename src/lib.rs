//! HTTP long-polling transport for engine.io-style messaging.
//!
//! Clients receive with GET and send with POST; each request names its
//! session with `?sid=`. Application code talks to a [`polling::Connection`]
//! as if it were a duplex stream.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod polling;

pub use config::schema::ServerConfig;
pub use http::PollingServer;
pub use lifecycle::Shutdown;
pub use polling::{Connection, Transport, TransportError};
