//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! polling / http subsystems produce:
//!     → logging.rs (structured log events, session and connection ids as fields)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;
