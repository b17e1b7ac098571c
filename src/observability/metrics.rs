//! Metrics collection and exposition.
//!
//! # Metrics
//! - `polling_exchanges_total` (counter): finished requests by outcome
//! - `polling_sends_total` (counter): application sends by outcome
//! - `polling_send_duration_seconds` (histogram): time from send to outcome
//! - `polling_receives_total` (counter): application receives by outcome
//! - `polling_forwards_total` (counter): posted messages handed off, by outcome
//! - `polling_active_sessions` (gauge): bound sessions
//! - `polling_parked_polls` (gauge): GET requests waiting for data
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Prometheus exposition is opt-in via configuration

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_exchange(outcome: &'static str) {
    metrics::counter!("polling_exchanges_total", "outcome" => outcome).increment(1);
}

pub fn record_send(outcome: &'static str, elapsed: Duration) {
    metrics::counter!("polling_sends_total", "outcome" => outcome).increment(1);
    metrics::histogram!("polling_send_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_receive(outcome: &'static str) {
    metrics::counter!("polling_receives_total", "outcome" => outcome).increment(1);
}

pub fn record_forward(outcome: &'static str) {
    metrics::counter!("polling_forwards_total", "outcome" => outcome).increment(1);
}

pub fn set_active_sessions(count: usize) {
    metrics::gauge!("polling_active_sessions").set(count as f64);
}

pub fn set_parked_polls(count: usize) {
    metrics::gauge!("polling_parked_polls").set(count as f64);
}
