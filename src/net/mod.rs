//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! TransportSpec (tcp host:port | unix path+mode)
//!     → socket_file.rs (unix only: clear stale socket, chmod after bind)
//!     → listener.rs (bind all or none, serve, drain + unbind)
//!     → connection.rs (session tracking per accepted connection)
//!     → Hand off to the hosted router
//! ```
//!
//! # Design Decisions
//! - Never serve on a subset of the configured transports
//! - A socket path is only ever deleted if it still holds a socket
//! - TLS is out of scope, TCP is plaintext

pub mod connection;
pub mod listener;
pub mod socket_file;
pub mod transport;

pub use listener::{BindResult, ListenerSet, LocalAddr, UnbindPolicy, UnbindReport};
pub use socket_file::{SocketFileGuard, SocketFileState};
pub use transport::{SocketMode, TransportKind, TransportSpec};
