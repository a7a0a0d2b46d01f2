//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once at startup
//! - Map the command line log levels onto tracing levels
//!
//! # Design Decisions
//! - `RUST_LOG` wins when set, otherwise the configured level applies
//! - `verbose` and `silly` are accepted for compatibility and map to debug/trace

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Silly,
}

impl LogLevel {
    /// The tracing level this maps to.
    pub fn as_tracing(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Verbose | LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Silly => tracing::Level::TRACE,
        }
    }

    /// Filter directive used when `RUST_LOG` is absent.
    pub fn directive(&self) -> String {
        let level = self.as_tracing().as_str().to_ascii_lowercase();
        format!("warn,grs_server={level},tower_http={level}")
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Verbose => "verbose",
            LogLevel::Debug => "debug",
            LogLevel::Silly => "silly",
        };
        f.write_str(name)
    }
}

/// Install the global subscriber.
pub fn init(level: LogLevel) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| level.directive().into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatibility_levels_map_down() {
        assert_eq!(LogLevel::Verbose.as_tracing(), tracing::Level::DEBUG);
        assert_eq!(LogLevel::Silly.as_tracing(), tracing::Level::TRACE);
        assert_eq!(
            LogLevel::Silly.directive(),
            "warn,grs_server=trace,tower_http=trace"
        );
    }

    #[test]
    fn display_round_trips_through_clap_names() {
        for level in LogLevel::value_variants() {
            let parsed = LogLevel::from_str(&level.to_string(), false).unwrap();
            assert_eq!(parsed, *level);
        }
    }
}
