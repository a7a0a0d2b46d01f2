//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from a TOML file.
//! Every section has defaults, so an empty file is a valid configuration
//! that listens on `127.0.0.1:50051`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::listener::UnbindPolicy;
use crate::net::transport::{socket_path_from_uri, SocketMode, TransportSpec};
use crate::observability::logging::LogLevel;

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Log verbosity when `RUST_LOG` is not set.
    pub log_level: LogLevel,

    /// Transports to listen on.
    pub listener: ListenerConfig,

    /// Descriptor set registered before any transport is bound.
    pub descriptor_set: PathBuf,

    /// Drain behaviour.
    pub shutdown: ShutdownConfig,

    /// Periodic diagnostics reporters.
    pub diagnostics: DiagnosticsConfig,

    /// Metrics exposition.
    pub observability: ObservabilityConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            listener: ListenerConfig::default(),
            descriptor_set: PathBuf::from("descriptor_set.bin"),
            shutdown: ShutdownConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// TCP host. An empty string disables TCP.
    pub address: String,

    /// TCP port. TCP is only enabled when both address and port are set.
    pub port: Option<u16>,

    /// Unix socket path, optionally prefixed with `unix://`.
    pub socket: Option<String>,

    /// Permission bits forced onto the socket file after bind.
    pub socket_mode: SocketMode,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: Some(50051),
            socket: None,
            socket_mode: SocketMode::default(),
        }
    }
}

impl ListenerConfig {
    /// The configured transports, TCP first.
    pub fn transports(&self) -> Vec<TransportSpec> {
        let mut specs = Vec::with_capacity(2);

        let host = self.address.trim();
        if let (false, Some(port)) = (host.is_empty(), self.port) {
            specs.push(TransportSpec::tcp(host, port));
        }

        if let Some(socket) = &self.socket {
            if !socket_path_from_uri(socket).as_os_str().is_empty() {
                specs.push(TransportSpec::unix(socket, self.socket_mode));
            }
        }

        specs
    }
}

/// Drain configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Maximum time to wait for in-flight requests. 0 waits forever.
    pub drain_timeout_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_ms: 30_000,
        }
    }
}

impl ShutdownConfig {
    pub fn unbind_policy(&self) -> UnbindPolicy {
        match self.drain_timeout_ms {
            0 => UnbindPolicy::unbounded(),
            ms => UnbindPolicy::with_timeout(Duration::from_millis(ms)),
        }
    }
}

/// Diagnostics toggles. Environment variables override file values.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub log_memory_usage: bool,
    pub memory_interval_ms: u64,
    pub manual_compaction: bool,
    pub compaction_interval_ms: u64,
    pub log_sessions: bool,
    pub sessions_interval_ms: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            log_memory_usage: false,
            memory_interval_ms: 5_000,
            manual_compaction: false,
            compaction_interval_ms: 60_000,
            log_sessions: false,
            sessions_interval_ms: 5_000,
        }
    }
}

impl DiagnosticsConfig {
    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_lookup(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`.
    ///
    /// A toggle is enabled only by the exact value `1`. Intervals that are not
    /// a positive integer are ignored.
    pub fn apply_lookup<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let enabled = |key: &str| lookup(key).map(|v| v.trim() == "1");
        let interval = |key: &str| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|ms| *ms > 0)
        };

        if let Some(on) = enabled("LOG_MEMORY_USAGE") {
            self.log_memory_usage = on;
        }
        if let Some(ms) = interval("LOG_MEMORY_USAGE_INTERVAL") {
            self.memory_interval_ms = ms;
        }
        if let Some(on) = enabled("MANUAL_GC") {
            self.manual_compaction = on;
        }
        if let Some(ms) = interval("MANUAL_GC_INTERVAL") {
            self.compaction_interval_ms = ms;
        }
        if let Some(on) = enabled("LOG_GRPC_SESSIONS") {
            self.log_sessions = on;
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Prometheus scrape address, e.g. `127.0.0.1:9090`. Disabled when unset.
    pub metrics_address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_listen_on_tcp_only() {
        let config = ServerConfig::default();
        assert_eq!(
            config.listener.transports(),
            vec![TransportSpec::tcp("127.0.0.1", 50051)]
        );
        assert_eq!(config.descriptor_set, PathBuf::from("descriptor_set.bin"));
    }

    #[test]
    fn empty_address_disables_tcp() {
        let listener = ListenerConfig {
            address: String::new(),
            socket: Some("unix:///tmp/grs.sock".into()),
            ..Default::default()
        };
        assert_eq!(
            listener.transports(),
            vec![TransportSpec::unix("/tmp/grs.sock", SocketMode::default())]
        );
    }

    #[test]
    fn empty_socket_is_ignored() {
        let listener = ListenerConfig {
            address: String::new(),
            socket: Some("unix://".into()),
            ..Default::default()
        };
        assert!(listener.transports().is_empty());
    }

    #[test]
    fn zero_drain_timeout_is_unbounded() {
        let shutdown = ShutdownConfig { drain_timeout_ms: 0 };
        assert_eq!(shutdown.unbind_policy(), UnbindPolicy::unbounded());
        assert_eq!(
            ShutdownConfig::default().unbind_policy().timeout,
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn diagnostics_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("LOG_MEMORY_USAGE", "1"),
            ("LOG_MEMORY_USAGE_INTERVAL", "250"),
            ("MANUAL_GC", "true"),
            ("MANUAL_GC_INTERVAL", "0"),
            ("LOG_GRPC_SESSIONS", "1"),
        ]
        .into_iter()
        .collect();

        let mut diagnostics = DiagnosticsConfig::default();
        diagnostics.apply_lookup(|key| env.get(key).map(|v| v.to_string()));

        assert!(diagnostics.log_memory_usage);
        assert_eq!(diagnostics.memory_interval_ms, 250);
        assert!(!diagnostics.manual_compaction);
        assert_eq!(diagnostics.compaction_interval_ms, 60_000);
        assert!(diagnostics.log_sessions);
    }

    #[test]
    fn parses_toml() {
        let config: ServerConfig = toml::from_str(
            r#"
            log_level = "verbose"
            descriptor_set = "/etc/grs/descriptor_set.bin"

            [listener]
            address = ""
            socket = "/run/grs.sock"
            socket_mode = "0660"

            [shutdown]
            drain_timeout_ms = 1500
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, LogLevel::Verbose);
        assert_eq!(config.listener.socket_mode.bits(), 0o660);
        assert_eq!(config.listener.transports().len(), 1);
        assert_eq!(config.shutdown.drain_timeout_ms, 1500);
        assert!(!config.diagnostics.log_sessions);
    }
}
