//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check that default headers are legal HTTP headers
//! - Keep the HTTP request timeout longer than any long-poll wait
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue};
use thiserror::Error;

use crate::config::schema::ServerConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} {value:?} is not a socket address")]
    BadAddress { field: &'static str, value: String },

    #[error("listener.path {0:?} must start with '/'")]
    BadPath(String),

    #[error("transport.headers: {name:?} is not a valid header")]
    BadHeader { name: String },

    #[error("listener.request_timeout_secs ({request_ms}ms) must exceed transport.{field} ({wait_ms}ms)")]
    RequestTimeoutTooShort {
        field: &'static str,
        request_ms: u64,
        wait_ms: u64,
    },
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let transport = &config.transport;
    let listener = &config.listener;

    let durations = [
        ("transport.ping_interval_ms", transport.ping_interval_ms),
        ("transport.ping_timeout_ms", transport.ping_timeout_ms),
        ("transport.receive_timeout_ms", transport.receive_timeout_ms),
        ("transport.send_timeout_ms", transport.send_timeout_ms),
        ("transport.inbound_timeout_ms", transport.inbound_timeout_ms),
        ("listener.request_timeout_secs", listener.request_timeout_secs),
    ];
    for (field, value) in durations {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }
    if transport.max_body_bytes == 0 {
        errors.push(ValidationError::Zero { field: "transport.max_body_bytes" });
    }

    if listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BadAddress {
            field: "listener.bind_address",
            value: listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::BadAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if !listener.path.starts_with('/') {
        errors.push(ValidationError::BadPath(listener.path.clone()));
    }

    for (name, value) in &transport.headers {
        if HeaderName::try_from(name.as_str()).is_err() || HeaderValue::try_from(value.as_str()).is_err() {
            errors.push(ValidationError::BadHeader { name: name.clone() });
        }
    }

    let request_ms = listener.request_timeout_secs.saturating_mul(1000);
    for (field, wait_ms) in [
        ("ping_timeout_ms", transport.ping_timeout_ms),
        ("inbound_timeout_ms", transport.inbound_timeout_ms),
    ] {
        if request_ms <= wait_ms {
            errors.push(ValidationError::RequestTimeoutTooShort { field, request_ms, wait_ms });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&ServerConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = ServerConfig::default();
        config.transport.ping_timeout_ms = 0;
        config.transport.max_body_bytes = 0;
        config.listener.bind_address = "nowhere".into();
        config.listener.path = "polling".into();
        config.transport.headers.insert("bad header".into(), "x".into());

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::Zero { field: "transport.ping_timeout_ms" }));
        assert!(errors.contains(&ValidationError::Zero { field: "transport.max_body_bytes" }));
        assert!(errors.contains(&ValidationError::BadPath("polling".into())));
        assert!(errors.contains(&ValidationError::BadHeader { name: "bad header".into() }));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::BadAddress { field: "listener.bind_address", .. })));
    }

    #[test]
    fn request_timeout_must_outlast_long_polls() {
        let mut config = ServerConfig::default();
        config.listener.request_timeout_secs = 60;
        config.transport.ping_timeout_ms = 60_000;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::RequestTimeoutTooShort {
                    field: "ping_timeout_ms",
                    request_ms: 60_000,
                    wait_ms: 60_000,
                },
                ValidationError::RequestTimeoutTooShort {
                    field: "inbound_timeout_ms",
                    request_ms: 60_000,
                    wait_ms: 60_000,
                },
            ]
        );
    }
}
