//! Session tracking for accepted connections.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Record every live session (transport, peer, open time)
//! - Wrap any axum listener so tracking is transparent to the server
//!
//! A session is removed from the registry when its connection is dropped,
//! which is also how draining connections are observed.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::serve::Listener;
use dashmap::DashMap;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is enough, only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A live session as reported by the session dump.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: ConnectionId,
    pub transport: String,
    pub peer: String,
    pub opened_at_ms: u64,
}

/// Registry of live sessions across all transports.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<ConnectionId, SessionInfo>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new session. The returned guard removes it on drop.
    pub fn track(&self, transport: &str, peer: String) -> SessionGuard {
        let id = ConnectionId::new();
        let opened_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        self.sessions.insert(
            id,
            SessionInfo {
                id,
                transport: transport.to_string(),
                peer,
                opened_at_ms,
            },
        );
        metrics::record_session_opened(transport);
        metrics::set_active_sessions(self.sessions.len());
        tracing::trace!(connection_id = %id, transport, "Session opened");

        SessionGuard {
            sessions: Arc::clone(&self.sessions),
            id,
        }
    }

    /// Current number of live sessions.
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Point-in-time copy of all live sessions, ordered by ID.
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> =
            self.sessions.iter().map(|entry| entry.value().clone()).collect();
        sessions.sort_by_key(|s| s.id);
        sessions
    }

    /// Release spare capacity held by the registry.
    ///
    /// Returns the capacity before and after compaction.
    pub fn compact(&self) -> (usize, usize) {
        let before = self.sessions.capacity();
        self.sessions.shrink_to_fit();
        (before, self.sessions.capacity())
    }
}

/// Guard that tracks a session's lifetime.
#[derive(Debug)]
pub struct SessionGuard {
    sessions: Arc<DashMap<ConnectionId, SessionInfo>>,
    id: ConnectionId,
}

impl SessionGuard {
    /// Get this session's connection ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.remove(&self.id);
        metrics::set_active_sessions(self.sessions.len());
        tracing::trace!(connection_id = %self.id, "Session closed");
    }
}

/// Listener adapter that registers every accepted connection.
pub struct TrackedListener<L> {
    inner: L,
    transport: String,
    sessions: SessionRegistry,
}

impl<L> TrackedListener<L> {
    pub fn new(inner: L, transport: impl Into<String>, sessions: SessionRegistry) -> Self {
        Self {
            inner,
            transport: transport.into(),
            sessions,
        }
    }
}

impl<L> Listener for TrackedListener<L>
where
    L: Listener,
    L::Addr: fmt::Debug,
{
    type Io = TrackedIo<L::Io>;
    type Addr = L::Addr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        let (io, addr) = self.inner.accept().await;
        let guard = self.sessions.track(&self.transport, format!("{:?}", addr));
        tracing::debug!(
            connection_id = %guard.id(),
            transport = %self.transport,
            peer = ?addr,
            "Connection accepted"
        );
        (TrackedIo { inner: io, _guard: guard }, addr)
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

/// Connection IO that keeps its session registered while alive.
pub struct TrackedIo<I> {
    inner: I,
    _guard: SessionGuard,
}

impl<I: AsyncRead + Unpin> AsyncRead for TrackedIo<I> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<I: AsyncWrite + Unpin> AsyncWrite for TrackedIo<I> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn registry_counts_sessions() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.active_count(), 0);

        let guard1 = registry.track("tcp://127.0.0.1:50051", "127.0.0.1:40000".into());
        assert_eq!(registry.active_count(), 1);

        let guard2 = registry.track("unix:///tmp/grs.sock", "(unnamed)".into());
        assert_eq!(registry.active_count(), 2);

        drop(guard1);
        assert_eq!(registry.active_count(), 1);

        drop(guard2);
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn snapshot_is_ordered_and_serializable() {
        let registry = SessionRegistry::new();
        let first = registry.track("tcp://127.0.0.1:50051", "a".into());
        let second = registry.track("tcp://127.0.0.1:50051", "b".into());

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, first.id());
        assert_eq!(snapshot[1].id, second.id());

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json[0]["peer"], "a");
        assert_eq!(json[1]["transport"], "tcp://127.0.0.1:50051");
    }

    #[test]
    fn compaction_keeps_live_sessions() {
        let registry = SessionRegistry::new();
        let guards: Vec<_> = (0..64)
            .map(|i| registry.track("tcp://127.0.0.1:50051", i.to_string()))
            .collect();
        let keep = registry.track("unix:///tmp/grs.sock", "keep".into());
        drop(guards);

        let (before, after) = registry.compact();
        assert!(after <= before);
        assert_eq!(registry.active_count(), 1);
        assert_eq!(registry.snapshot()[0].id, keep.id());
    }
}
