//! Command line interface.
//!
//! Every flag can also be supplied through a `GRS_`-prefixed environment
//! variable. Flags override values from `--config`, which override defaults.

use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::Parser;

use crate::config::loader::{read_config, ConfigError};
use crate::config::schema::ServerConfig;
use crate::config::validation::validate_config;
use crate::lifecycle::startup::STARTUP_FAILURE_EXIT_CODE;
use crate::net::transport::SocketMode;
use crate::observability::logging::LogLevel;

#[derive(Debug, Parser)]
#[command(name = "grs-server", version)]
#[command(about = "Hosts a protocol server on TCP and/or a Unix socket", long_about = None)]
pub struct Cli {
    /// Optional TOML configuration file
    #[arg(long, env = "GRS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "GRS_LOG_LEVEL", value_enum)]
    pub log_level: Option<LogLevel>,

    /// Listen address for the server [default: 127.0.0.1]
    #[arg(long, env = "GRS_SERVER_ADDRESS")]
    pub server_address: Option<String>,

    /// Listen port for the server [default: 50051]
    #[arg(long, env = "GRS_SERVER_PORT")]
    pub server_port: Option<u16>,

    /// Listen socket for the server, with or without unix://
    #[arg(long, env = "GRS_SERVER_SOCKET")]
    pub server_socket: Option<String>,

    /// Permissions on the socket file for the server [default: 0600]
    #[arg(long, env = "GRS_SERVER_SOCKET_PERMISSIONS_MODE")]
    pub server_socket_permissions_mode: Option<SocketMode>,

    /// Path to descriptor set bin file [default: descriptor_set.bin]
    #[arg(long, env = "GRS_DESCRIPTOR_SET")]
    pub descriptor_set: Option<PathBuf>,

    /// Maximum drain duration in milliseconds, 0 waits forever [default: 30000]
    #[arg(long, env = "GRS_DRAIN_TIMEOUT_MS")]
    pub drain_timeout_ms: Option<u64>,

    /// Prometheus scrape address
    #[arg(long, env = "GRS_METRICS_ADDRESS")]
    pub metrics_address: Option<String>,
}

impl Cli {
    /// Apply explicitly given flags on top of `config`.
    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(address) = &self.server_address {
            config.listener.address = address.clone();
        }
        if let Some(port) = self.server_port {
            config.listener.port = Some(port);
        }
        if let Some(socket) = &self.server_socket {
            config.listener.socket = Some(socket.clone());
        }
        if let Some(mode) = self.server_socket_permissions_mode {
            config.listener.socket_mode = mode;
        }
        if let Some(path) = &self.descriptor_set {
            config.descriptor_set = path.clone();
        }
        if let Some(ms) = self.drain_timeout_ms {
            config.shutdown.drain_timeout_ms = ms;
        }
        if let Some(addr) = &self.metrics_address {
            config.observability.metrics_address = Some(addr.clone());
        }
    }

    /// Build the final, validated configuration.
    ///
    /// Diagnostics toggles are taken from the process environment last.
    pub fn resolve(&self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => ServerConfig::default(),
        };
        self.apply(&mut config);
        config.diagnostics.apply_env();
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

/// Exit code for a command line clap rejected.
///
/// `None` for help and version output, which clap prints and exits on its
/// own. Everything else is a configuration error and a startup failure.
pub fn parse_failure_exit_code(err: &clap::Error) -> Option<i32> {
    match err.kind() {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayVersion
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => None,
        _ => Some(STARTUP_FAILURE_EXIT_CODE),
    }
}
