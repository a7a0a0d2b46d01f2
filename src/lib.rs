//! Multi-transport listener lifecycle manager.
//!
//! Binds a protocol server to TCP and/or a Unix domain socket, drains and
//! unbinds on termination signals or faults, and keeps the socket file on
//! disk honest.

#[cfg(not(unix))]
compile_error!("grs-server requires a Unix platform");

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::ServerConfig;
pub use lifecycle::{ProcessContext, RunningServer, ShutdownCoordinator};
pub use net::ListenerSet;
