//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Resolve config → Register services → Bind all transports → Serve
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM/SIGUSR1/SIGUSR2/panic → SignalEvent channel
//!
//! Shutdown (shutdown.rs):
//!     First event → Drain → Unbind → Socket cleanup → Exit code
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then services, then listeners
//! - Ordered shutdown: normalize, drain, clean up, exit; no step is skipped
//! - Drain has an optional deadline: remaining connections are force-closed after it

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{ShutdownCoordinator, ShutdownOutcome, ShutdownState, ShutdownStateCell};
pub use signals::{SignalEvent, SignalPublisher};
pub use startup::{start, ProcessContext, RunningServer, STARTUP_FAILURE_EXIT_CODE};
