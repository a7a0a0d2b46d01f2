//! Periodic diagnostics reporters.
//!
//! # Responsibilities
//! - Report process memory usage (`LOG_MEMORY_USAGE`)
//! - Compact the session registry (`MANUAL_GC`)
//! - Dump live sessions (`LOG_GRPC_SESSIONS`)
//!
//! # Design Decisions
//! - Each reporter is its own task with its own child cancellation token
//! - A failing tick is logged and the reporter keeps going
//! - Shutdown cancels the reporters but never waits for them

use std::io;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::DiagnosticsConfig;
use crate::net::connection::SessionRegistry;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum DiagnosticsError {
    #[error("memory usage unavailable: {0}")]
    Memory(#[source] io::Error),

    #[error("failed to serialize sessions: {0}")]
    Sessions(#[from] serde_json::Error),
}

/// Process memory, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryUsage {
    pub rss: u64,
    pub virtual_size: u64,
    pub data: u64,
}

impl MemoryUsage {
    /// Sample the current process.
    pub fn sample() -> io::Result<Self> {
        let status = std::fs::read_to_string("/proc/self/status")?;
        Self::parse_status(&status).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "no memory fields in /proc/self/status")
        })
    }

    /// Parse the `Vm*` lines of a `/proc/<pid>/status` file.
    pub fn parse_status(status: &str) -> Option<Self> {
        let mut usage = MemoryUsage::default();
        let mut found = false;
        for line in status.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let slot = match key {
                "VmRSS" => &mut usage.rss,
                "VmSize" => &mut usage.virtual_size,
                "VmData" => &mut usage.data,
                _ => continue,
            };
            let kib = value
                .split_whitespace()
                .next()
                .and_then(|n| n.parse::<u64>().ok())?;
            *slot = kib * 1024;
            found = true;
        }
        found.then_some(usage)
    }
}

/// Megabytes rounded to two decimals.
fn megabytes(bytes: u64) -> f64 {
    (bytes as f64 / 1024.0 / 1024.0 * 100.0).round() / 100.0
}

/// Owner of the diagnostics reporters.
pub struct DiagnosticsTicker {
    config: DiagnosticsConfig,
    sessions: SessionRegistry,
    cancel: CancellationToken,
}

impl DiagnosticsTicker {
    pub fn new(config: DiagnosticsConfig, sessions: SessionRegistry, cancel: CancellationToken) -> Self {
        Self {
            config,
            sessions,
            cancel,
        }
    }

    /// Spawn every enabled reporter.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        if self.config.log_memory_usage {
            handles.push(spawn_reporter(
                "memory",
                Duration::from_millis(self.config.memory_interval_ms),
                self.cancel.child_token(),
                report_memory,
            ));
        }

        if self.config.manual_compaction {
            let sessions = self.sessions.clone();
            handles.push(spawn_reporter(
                "compaction",
                Duration::from_millis(self.config.compaction_interval_ms),
                self.cancel.child_token(),
                move || compact_sessions(&sessions),
            ));
        }

        if self.config.log_sessions {
            let sessions = self.sessions.clone();
            handles.push(spawn_reporter(
                "sessions",
                Duration::from_millis(self.config.sessions_interval_ms),
                self.cancel.child_token(),
                move || dump_sessions(&sessions),
            ));
        }

        if !handles.is_empty() {
            tracing::info!(reporters = handles.len(), "Diagnostics reporters started");
        }
        handles
    }
}

fn spawn_reporter<F>(
    name: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut report: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Result<(), DiagnosticsError> + Send + 'static,
{
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        // First report after one full period.
        let mut ticker = time::interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = report() {
                        tracing::warn!(reporter = name, error = %e, "Diagnostics report failed");
                    }
                }
            }
        }
        tracing::debug!(reporter = name, "Diagnostics reporter stopped");
    })
}

fn report_memory() -> Result<(), DiagnosticsError> {
    let usage = match MemoryUsage::sample() {
        Ok(usage) => usage,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("Memory usage unavailable on this platform");
            return Ok(());
        }
        Err(e) => return Err(DiagnosticsError::Memory(e)),
    };

    for (kind, bytes) in [
        ("rss", usage.rss),
        ("virtual", usage.virtual_size),
        ("data", usage.data),
    ] {
        metrics::record_memory(kind, bytes);
        tracing::info!(kind, mb = megabytes(bytes), "Memory usage");
    }
    Ok(())
}

fn compact_sessions(sessions: &SessionRegistry) -> Result<(), DiagnosticsError> {
    let (before, after) = sessions.compact();
    tracing::info!(
        capacity_before = before,
        capacity_after = after,
        active = sessions.active_count(),
        "Session registry compacted"
    );
    Ok(())
}

fn dump_sessions(sessions: &SessionRegistry) -> Result<(), DiagnosticsError> {
    let snapshot = sessions.snapshot();
    let json = serde_json::to_string(&snapshot)?;
    tracing::info!(active = snapshot.len(), sessions = %json, "Dumping sessions");
    Ok(())
}
