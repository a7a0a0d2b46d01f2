//! Shutdown coordination.
//!
//! One coordinator task owns the receiving end of the signal channel and runs
//! the teardown sequence exactly once:
//!
//! ```text
//! Running ──first event──▶ Draining    stop accepting, finish in-flight requests
//!                          Unbinding   release listeners, remove their sockets
//!                          Cleaned     remove any socket file still left
//!                          Exited      exit code handed back to the caller
//! ```
//!
//! Events that arrive once the sequence has started are logged and dropped.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::lifecycle::signals::{NormalizedSignal, SignalEvent, SignalReceiver};
use crate::net::listener::{ListenerSet, UnbindPolicy, UnbindReport};
use crate::net::socket_file::SocketFileGuard;
use crate::observability::metrics;

/// Lifecycle state of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Unbinding,
    Cleaned,
    Exited,
}

/// Shared handle to the shutdown state.
///
/// The mutex guards the transition only, never the teardown itself.
#[derive(Debug, Clone)]
pub struct ShutdownStateCell {
    inner: Arc<Mutex<ShutdownState>>,
}

impl ShutdownStateCell {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ShutdownState::Running)),
        }
    }

    pub fn current(&self) -> ShutdownState {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move `Running → Draining`. Only one caller ever gets `true`.
    pub fn try_begin(&self) -> bool {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != ShutdownState::Running {
            return false;
        }
        *state = ShutdownState::Draining;
        true
    }

    fn advance(&self, next: ShutdownState) {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(from = ?*state, to = ?next, "Shutdown state transition");
        *state = next;
    }
}

impl Default for ShutdownStateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a completed shutdown sequence.
#[derive(Debug, Clone)]
pub struct ShutdownOutcome {
    /// The event that started the sequence.
    pub signal: NormalizedSignal,
    /// Code the process should exit with.
    pub exit_code: i32,
    /// Present when the drain completed without error.
    pub report: Option<UnbindReport>,
    /// Description of the drain failure, if any.
    pub drain_error: Option<String>,
    /// Socket paths that could not be removed.
    pub cleanup_failures: Vec<PathBuf>,
    /// Events acknowledged and dropped because shutdown was already running.
    pub duplicates_ignored: usize,
}

/// Runs the teardown sequence once, on the first event.
pub struct ShutdownCoordinator {
    state: ShutdownStateCell,
    events: SignalReceiver,
    listeners: ListenerSet,
    socket_paths: Vec<PathBuf>,
    policy: UnbindPolicy,
    background: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new(listeners: ListenerSet, events: SignalReceiver, policy: UnbindPolicy) -> Self {
        Self {
            state: ShutdownStateCell::new(),
            socket_paths: listeners.unix_paths(),
            events,
            listeners,
            policy,
            background: CancellationToken::new(),
        }
    }

    /// Share an existing state cell instead of a fresh one.
    pub fn with_state(mut self, state: ShutdownStateCell) -> Self {
        self.state = state;
        self
    }

    /// Background work cancelled (not awaited) when shutdown starts.
    pub fn with_background(mut self, background: CancellationToken) -> Self {
        self.background = background;
        self
    }

    pub fn state(&self) -> ShutdownStateCell {
        self.state.clone()
    }

    /// Wait for the first event and run the shutdown sequence.
    ///
    /// Returns `None` if another owner of the state cell already started
    /// shutdown; this coordinator then does nothing.
    pub async fn run(self) -> Option<ShutdownOutcome> {
        let ShutdownCoordinator {
            state,
            mut events,
            mut listeners,
            socket_paths,
            policy,
            background,
        } = self;

        let first = match events.recv().await {
            Some(event) => event,
            None => {
                tracing::warn!("Signal channel closed, shutting down");
                SignalEvent::named("SIGTERM")
            }
        };

        if !state.try_begin() {
            tracing::info!(event = ?first, "Shutdown already in progress");
            return None;
        }

        let mut duplicates_ignored = 0;
        let mut outcome = {
            let teardown = teardown(&state, &first, &mut listeners, &socket_paths, policy, &background);
            tokio::pin!(teardown);
            loop {
                tokio::select! {
                    outcome = &mut teardown => break outcome,
                    Some(event) = events.recv() => {
                        acknowledge_duplicate(&state, &event);
                        duplicates_ignored += 1;
                    }
                }
            }
        };

        while let Ok(event) = events.try_recv() {
            acknowledge_duplicate(&state, &event);
            duplicates_ignored += 1;
        }
        outcome.duplicates_ignored = duplicates_ignored;

        state.advance(ShutdownState::Exited);
        tracing::info!(exit_code = outcome.exit_code, "Server fully shutdown, exiting");
        Some(outcome)
    }
}

fn acknowledge_duplicate(state: &ShutdownStateCell, event: &SignalEvent) {
    let signal = event.normalize();
    tracing::info!(
        signal = %signal,
        state = ?state.current(),
        "Shutdown already in progress, ignoring signal"
    );
}

async fn teardown(
    state: &ShutdownStateCell,
    event: &SignalEvent,
    listeners: &mut ListenerSet,
    socket_paths: &[PathBuf],
    policy: UnbindPolicy,
    background: &CancellationToken,
) -> ShutdownOutcome {
    let signal = event.normalize();
    match event {
        SignalEvent::Fault(reason) => {
            tracing::error!(signal = %signal, reason = %reason, "Running server shutdown after fault")
        }
        _ => tracing::info!(
            exit_code = signal.code,
            signal = %signal.name,
            "Running server shutdown"
        ),
    }
    metrics::record_shutdown(&signal.name);

    background.cancel();

    let drained = listeners.drain(policy).await;
    state.advance(ShutdownState::Unbinding);

    let (report, drain_error) = match drained {
        Ok(stopped) => {
            let report = listeners.unbind(&stopped);
            tracing::info!(
                transports = report.torn_down.len(),
                "Server gracefully closed all connections"
            );
            (Some(report), None)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to cleanly shutdown server");
            listeners.unbind(&[]);
            (None, Some(e.to_string()))
        }
    };

    // Safety net: the drain may have failed or left a socket behind.
    let mut cleanup_failures = Vec::new();
    for path in socket_paths {
        match SocketFileGuard::new(path).cleanup() {
            Ok(true) => tracing::info!(path = %path.display(), "Removed socket"),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Socket cleanup failed");
                cleanup_failures.push(path.clone());
            }
        }
    }
    state.advance(ShutdownState::Cleaned);

    ShutdownOutcome {
        exit_code: signal.code,
        signal,
        report,
        drain_error,
        cleanup_failures,
        duplicates_ignored: 0,
    }
}
