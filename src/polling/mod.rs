//! Long-polling transport subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP layer                            application
//!     │ create_connection / bind_session      │
//!     ▼                                       │
//! transport.rs ── session.rs (sid → Connection)
//!     │ serve_request(GET|POST, sid, body, sink)
//!     ▼                                       │
//! connection.rs ◄──── receive() / send() ─────┘
//!     │
//!     ▼
//! framing.rs ("<len>:<payload>") → sink.rs (one response per request)
//! ```
//!
//! # Design Decisions
//! - Queues hold one item; they are hand-off points, not buffers
//! - Every outbound message has its own outcome channel; heartbeats have none
//! - Timeouts and `close` are the only cancellation; nothing is retried
//! - The registry lock is never held across an await

pub mod connection;
pub mod error;
pub mod framing;
pub mod session;
pub mod sink;
pub mod transport;

pub use connection::{Connection, ConnectionId, PingPolicy};
pub use error::{ClientGone, TransportError, TransportResult};
pub use session::{SessionId, SessionRegistry};
pub use sink::{PendingResponse, PollResponse, ResponseSink};
pub use transport::{Exchange, Transport, TransportSettings};
