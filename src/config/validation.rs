//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - At least one transport must be configured
//! - Diagnostics intervals and the metrics address must be usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before any transport is bound

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("must listen on tcp and/or unix socket")]
    NoTransport,

    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("metrics address {0:?} is not a socket address")]
    MetricsAddress(String),
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.transports().is_empty() {
        errors.push(ValidationError::NoTransport);
    }

    let diagnostics = &config.diagnostics;
    for (name, value) in [
        ("diagnostics.memory_interval_ms", diagnostics.memory_interval_ms),
        ("diagnostics.compaction_interval_ms", diagnostics.compaction_interval_ms),
        ("diagnostics.sessions_interval_ms", diagnostics.sessions_interval_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroInterval(name));
        }
    }

    if let Some(addr) = &config.observability.metrics_address {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::MetricsAddress(addr.clone()));
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
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ServerConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = ServerConfig::default();
        config.listener.address.clear();
        config.diagnostics.sessions_interval_ms = 0;
        config.observability.metrics_address = Some("localhost".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::NoTransport,
                ValidationError::ZeroInterval("diagnostics.sessions_interval_ms"),
                ValidationError::MetricsAddress("localhost".into()),
            ]
        );
    }

    #[test]
    fn socket_alone_is_enough() {
        let mut config = ServerConfig::default();
        config.listener.address.clear();
        config.listener.socket = Some("/tmp/grs.sock".into());
        assert_eq!(validate_config(&config), Ok(()));
    }
}
