//! OS signal and fault intake.
//!
//! # Responsibilities
//! - Register handlers for SIGINT, SIGTERM, SIGUSR1 and SIGUSR2
//! - Turn panics anywhere in the process into fault events
//! - Normalize every event to a canonical (code, name) pair
//!
//! # Design Decisions
//! - Every source publishes into one channel; only the shutdown coordinator consumes
//! - Handlers keep running after the first signal so duplicates are still observed
//! - Exit codes come from a fixed 31-entry table, independent of the host OS numbering

use std::fmt;
use std::io;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Canonical signal table used to derive exit codes.
pub const SIGNAL_TABLE: [(i32, &str); 31] = [
    (1, "SIGHUP"),
    (2, "SIGINT"),
    (3, "SIGQUIT"),
    (4, "SIGILL"),
    (5, "SIGTRAP"),
    (6, "SIGABRT"),
    (7, "SIGEMT"),
    (8, "SIGFPE"),
    (9, "SIGKILL"),
    (10, "SIGBUS"),
    (11, "SIGSEGV"),
    (12, "SIGSYS"),
    (13, "SIGPIPE"),
    (14, "SIGALRM"),
    (15, "SIGTERM"),
    (16, "SIGURG"),
    (17, "SIGSTOP"),
    (18, "SIGTSTP"),
    (19, "SIGCONT"),
    (20, "SIGCHLD"),
    (21, "SIGTTIN"),
    (22, "SIGTTOU"),
    (23, "SIGIO"),
    (24, "SIGXCPU"),
    (25, "SIGXFSZ"),
    (26, "SIGVTALRM"),
    (27, "SIGPROF"),
    (28, "SIGWINCH"),
    (29, "SIGINFO"),
    (30, "SIGUSR1"),
    (31, "SIGUSR2"),
];

/// Exit code for a shutdown caused by an uncaught fault (EX_SOFTWARE).
pub const FAULT_EXIT_CODE: i32 = 70;

/// Exit code when an event cannot be mapped through the table.
pub const UNKNOWN_SIGNAL_EXIT_CODE: i32 = 1;

pub const FAULT_NAME: &str = "FAULT";
pub const UNKNOWN_NAME: &str = "UNKNOWN";

pub fn signal_name(code: i32) -> Option<&'static str> {
    SIGNAL_TABLE
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

pub fn signal_code(name: &str) -> Option<i32> {
    SIGNAL_TABLE
        .iter()
        .find(|(_, n)| *n == name)
        .map(|(code, _)| *code)
}

/// A termination trigger, as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalEvent {
    /// Delivered by name, e.g. `"SIGTERM"`.
    Named(String),
    /// Delivered by number.
    Code(i32),
    /// Synthesized from an uncaught fault; carries a description.
    Fault(String),
}

impl SignalEvent {
    pub fn named(name: impl Into<String>) -> Self {
        SignalEvent::Named(name.into())
    }

    /// Map to the canonical (code, name) pair. The code is never 0.
    pub fn normalize(&self) -> NormalizedSignal {
        match self {
            SignalEvent::Code(code) if *code > 0 => NormalizedSignal {
                code: *code,
                name: signal_name(*code).unwrap_or(UNKNOWN_NAME).to_string(),
            },
            SignalEvent::Code(_) => NormalizedSignal {
                code: UNKNOWN_SIGNAL_EXIT_CODE,
                name: UNKNOWN_NAME.to_string(),
            },
            SignalEvent::Named(name) => match signal_code(name) {
                Some(code) => NormalizedSignal {
                    code,
                    name: name.clone(),
                },
                None => NormalizedSignal {
                    code: UNKNOWN_SIGNAL_EXIT_CODE,
                    name: name.clone(),
                },
            },
            SignalEvent::Fault(_) => NormalizedSignal {
                code: FAULT_EXIT_CODE,
                name: FAULT_NAME.to_string(),
            },
        }
    }
}

/// Canonical form of a [`SignalEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSignal {
    pub code: i32,
    pub name: String,
}

impl fmt::Display for NormalizedSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code, self.name)
    }
}

/// Receiving end of the signal channel. Owned by the shutdown coordinator.
pub type SignalReceiver = mpsc::UnboundedReceiver<SignalEvent>;

/// Publishing end of the signal channel. Usable from any thread.
#[derive(Debug, Clone)]
pub struct SignalPublisher {
    tx: mpsc::UnboundedSender<SignalEvent>,
}

impl SignalPublisher {
    /// Publish an event. Returns `false` once the coordinator is gone.
    pub fn publish(&self, event: SignalEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Create the signal channel.
pub fn channel() -> (SignalPublisher, SignalReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SignalPublisher { tx }, rx)
}

/// Register OS signal handlers that publish into `publisher`.
///
/// Registration happens before this returns so a failure is a startup
/// error; delivery then runs on a background task.
pub fn install_os_handlers(publisher: SignalPublisher) -> io::Result<JoinHandle<()>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;
    let mut sigusr2 = signal(SignalKind::user_defined2())?;

    Ok(tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                Some(()) = sigint.recv() => "SIGINT",
                Some(()) = sigterm.recv() => "SIGTERM",
                Some(()) = sigusr1.recv() => "SIGUSR1",
                Some(()) = sigusr2.recv() => "SIGUSR2",
                else => break,
            };
            tracing::debug!(signal = name, "Signal received");
            if !publisher.publish(SignalEvent::named(name)) {
                break;
            }
        }
    }))
}

/// Route panics into the signal channel as faults.
///
/// The previous hook still runs first, so the panic message is printed as usual.
pub fn install_fault_hook(publisher: SignalPublisher) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        previous(info);
        publisher.publish(SignalEvent::Fault(info.to_string()));
    }));
}
