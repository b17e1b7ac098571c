//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, timeout + trace layers)
//!     → handlers.rs (extract sid, spawn the exchange)
//!     → polling::Transport::serve_request (GET poll / POST forward)
//!     → ResponseSink → response back to the client
//! ```

pub mod handlers;
pub mod server;

pub use handlers::{SessionQuery, TransportStatus};
pub use server::{AppState, PollingServer};
