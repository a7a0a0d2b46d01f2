//! Error taxonomy for the server lifecycle.
//!
//! Only [`StartupError`] (config, registration, bind) may halt the process
//! before serving begins. Once serving has started, [`DrainError`] and
//! [`CleanupError`] are logged by the shutdown sequence and never escalated.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::net::socket_file::SocketFileState;
use crate::net::transport::{SocketMode, TransportSpec};

/// Fatal conditions detected before any transport starts serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error("Failed to install signal handlers: {0}")]
    Signals(#[source] io::Error),
}

/// Failures while preparing or inspecting a Unix socket path.
#[derive(Debug, Error)]
pub enum SocketFileError {
    /// The path is occupied by something that is not a socket.
    #[error("Socket path {} is occupied by a {state}, refusing to remove it", path.display())]
    PathConflict { path: PathBuf, state: SocketFileState },

    #[error("Failed to inspect socket path {}: {source}", path.display())]
    Inspect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to remove stale socket {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to set mode {mode} on {}: {source}", path.display())]
    Permissions {
        path: PathBuf,
        mode: SocketMode,
        #[source]
        source: io::Error,
    },
}

/// A transport could not be bound.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("No transports configured, must listen on tcp and/or unix socket")]
    NothingToBind,

    #[error("Failed to bind {transport}: {source}")]
    Listen {
        transport: TransportSpec,
        #[source]
        source: io::Error,
    },

    #[error("Failed to prepare {transport}: {source}")]
    SocketFile {
        transport: TransportSpec,
        #[source]
        source: SocketFileError,
    },
}

impl BindError {
    /// The transport this failure belongs to, if any.
    pub fn transport(&self) -> Option<&TransportSpec> {
        match self {
            BindError::NothingToBind => None,
            BindError::Listen { transport, .. } | BindError::SocketFile { transport, .. } => {
                Some(transport)
            }
        }
    }

    pub fn is_path_conflict(&self) -> bool {
        matches!(
            self,
            BindError::SocketFile {
                source: SocketFileError::PathConflict { .. },
                ..
            }
        )
    }
}

/// The graceful stop of the hosted server did not complete cleanly.
#[derive(Debug, Error)]
pub enum DrainError {
    #[error("Server task for {transport} panicked")]
    Panicked { transport: TransportSpec },

    #[error("Drain did not complete within {0:?}, remaining connections were force-closed")]
    TimedOut(Duration),
}

/// A socket file could not be removed at shutdown.
#[derive(Debug, Error)]
#[error("Failed to remove socket file {}: {source}", path.display())]
pub struct CleanupError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Service registration failed before any transport was bound.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("Failed to load descriptor set {}: {source}", path.display())]
    DescriptorSet {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
