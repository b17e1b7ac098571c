//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the polling server.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the polling server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, mount path).
    pub listener: ListenerConfig,

    /// Long-polling transport settings.
    pub transport: TransportConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Path the polling endpoint is mounted on.
    pub path: String,

    /// Upper bound on a single HTTP request, in seconds.
    /// Must outlast the ping and inbound timeouts.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            path: "/polling".to_string(),
            request_timeout_secs: 120,
        }
    }
}

/// Timeouts and response shaping for the polling transport.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Interval at which clients are expected to ping, in milliseconds.
    pub ping_interval_ms: u64,

    /// How long a poll is held open before a heartbeat is sent, in milliseconds.
    pub ping_timeout_ms: u64,

    /// How long `receive` waits for a client message, in milliseconds.
    pub receive_timeout_ms: u64,

    /// How long `send` waits for a poll to deliver its message, in milliseconds.
    pub send_timeout_ms: u64,

    /// How long a posted message waits for a receiver, in milliseconds.
    pub inbound_timeout_ms: u64,

    /// Largest accepted request body.
    pub max_body_bytes: usize,

    /// Extra headers attached to every response.
    pub headers: BTreeMap<String, String>,
}

impl TransportConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn inbound_timeout(&self) -> Duration {
        Duration::from_millis(self.inbound_timeout_ms)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: 30_000,
            ping_timeout_ms: 60_000,
            receive_timeout_ms: 60_000,
            send_timeout_ms: 60_000,
            inbound_timeout_ms: 60_000,
            max_body_bytes: 1024 * 1024, // 1MB
            headers: BTreeMap::new(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
