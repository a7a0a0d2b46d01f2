//! Multi-transport listener set.
//!
//! # Responsibilities
//! - Bind every configured transport (TCP and/or Unix socket)
//! - Refuse to start half-bound: any failure releases everything bound so far
//! - Serve the hosted router on every transport
//! - Drain and unbind all transports exactly once at shutdown
//!
//! # Design Decisions
//! - Unix binds go through [`SocketFileGuard`]: clear stale socket, bind, chmod
//! - One serve task per transport, all stopped by a shared drain token
//! - Each serve task owns its connection tasks, so aborting it force-closes them

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::body::Body;
use axum::serve::Listener;
use axum::Router;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::{TcpListener, UnixListener};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tower::Service;

use crate::error::{BindError, DrainError};
use crate::net::connection::{SessionRegistry, TrackedListener};
use crate::net::socket_file::SocketFileGuard;
use crate::net::transport::TransportSpec;
use crate::observability::metrics;

/// An OS listener handle.
#[derive(Debug)]
pub enum BoundListener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

/// Where a bound transport actually listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalAddr {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl fmt::Display for LocalAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalAddr::Tcp(addr) => write!(f, "{}", addr),
            LocalAddr::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A transport that has been bound but not yet handed to the server.
#[derive(Debug)]
pub struct BoundTransport {
    spec: TransportSpec,
    local: LocalAddr,
    listener: BoundListener,
}

impl BoundTransport {
    pub fn spec(&self) -> &TransportSpec {
        &self.spec
    }

    pub fn local_addr(&self) -> &LocalAddr {
        &self.local
    }
}

/// Outcome of binding one transport.
pub type BindResult = Result<BoundTransport, BindError>;

/// Bind a single transport.
pub async fn bind_transport(spec: &TransportSpec) -> BindResult {
    match spec {
        TransportSpec::Tcp { host, port } => {
            let listener = TcpListener::bind((host.as_str(), *port))
                .await
                .map_err(|source| BindError::Listen {
                    transport: spec.clone(),
                    source,
                })?;
            let local = listener.local_addr().map_err(|source| BindError::Listen {
                transport: spec.clone(),
                source,
            })?;

            tracing::info!(transport = %spec, address = %local, "Listener bound");
            Ok(BoundTransport {
                spec: spec.clone(),
                local: LocalAddr::Tcp(local),
                listener: BoundListener::Tcp(listener),
            })
        }
        TransportSpec::Unix { path, mode } => {
            let guard = SocketFileGuard::new(path);
            guard.ensure_clear().map_err(|source| BindError::SocketFile {
                transport: spec.clone(),
                source,
            })?;

            let listener = UnixListener::bind(path).map_err(|source| BindError::Listen {
                transport: spec.clone(),
                source,
            })?;

            // The file only exists once bound, so permissions come last.
            if let Err(source) = guard.apply_permissions(*mode) {
                drop(listener);
                if let Err(e) = guard.cleanup() {
                    tracing::warn!(error = %e, "Failed to remove socket after permission error");
                }
                return Err(BindError::SocketFile {
                    transport: spec.clone(),
                    source,
                });
            }

            tracing::info!(transport = %spec, mode = %mode, "Listener bound");
            Ok(BoundTransport {
                spec: spec.clone(),
                local: LocalAddr::Unix(path.clone()),
                listener: BoundListener::Unix(listener),
            })
        }
    }
}

/// How long the drain may take before remaining connections are cut off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnbindPolicy {
    /// `None` waits for in-flight work indefinitely.
    pub timeout: Option<Duration>,
}

impl UnbindPolicy {
    pub fn unbounded() -> Self {
        Self { timeout: None }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// What `unbind_all` tore down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnbindReport {
    pub torn_down: Vec<TransportSpec>,
    pub removed_sockets: Vec<PathBuf>,
}

struct ServingTransport {
    spec: TransportSpec,
    handle: JoinHandle<()>,
}

/// All transports of one hosted server.
pub struct ListenerSet {
    bound: Vec<BoundTransport>,
    serving: Vec<ServingTransport>,
    specs: Vec<TransportSpec>,
    local_addrs: Vec<LocalAddr>,
    drain: CancellationToken,
}

impl ListenerSet {
    /// Bind every spec, or none of them.
    ///
    /// Each spec is attempted independently so every failure gets logged,
    /// but a single failure releases all successful binds and returns the
    /// first error.
    pub async fn bind(specs: &[TransportSpec]) -> Result<Self, BindError> {
        if specs.is_empty() {
            return Err(BindError::NothingToBind);
        }

        let mut results: Vec<BindResult> = Vec::with_capacity(specs.len());
        for spec in specs {
            let result = bind_transport(spec).await;
            if let Err(e) = &result {
                tracing::error!(transport = %spec, error = %e, "Bind failed");
            }
            results.push(result);
        }

        if results.iter().any(Result::is_err) {
            let mut first_error = None;
            let mut bound = Vec::new();
            for result in results {
                match result {
                    Ok(transport) => bound.push(transport),
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
            }
            release(bound);
            return Err(first_error.unwrap_or(BindError::NothingToBind));
        }

        let bound: Vec<BoundTransport> = results.into_iter().flatten().collect();
        for transport in &bound {
            metrics::record_bind(transport.spec.kind());
        }

        Ok(Self {
            specs: bound.iter().map(|t| t.spec.clone()).collect(),
            local_addrs: bound.iter().map(|t| t.local.clone()).collect(),
            bound,
            serving: Vec::new(),
            drain: CancellationToken::new(),
        })
    }

    /// Every transport in this set, in configuration order.
    pub fn transports(&self) -> &[TransportSpec] {
        &self.specs
    }

    pub fn local_addrs(&self) -> &[LocalAddr] {
        &self.local_addrs
    }

    /// The first bound TCP address, useful when binding port 0.
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.local_addrs.iter().find_map(|addr| match addr {
            LocalAddr::Tcp(addr) => Some(*addr),
            LocalAddr::Unix(_) => None,
        })
    }

    pub fn unix_paths(&self) -> Vec<PathBuf> {
        self.specs
            .iter()
            .filter_map(|spec| spec.unix_path().map(|p| p.to_path_buf()))
            .collect()
    }

    pub fn is_draining(&self) -> bool {
        self.drain.is_cancelled()
    }

    /// Start serving `app` on every bound transport.
    pub fn serve(&mut self, app: Router, sessions: &SessionRegistry) {
        for transport in self.bound.drain(..) {
            let label = transport.spec.to_string();
            let handle = match transport.listener {
                BoundListener::Tcp(listener) => tokio::spawn(serve_transport(
                    TrackedListener::new(listener, label, sessions.clone()),
                    app.clone(),
                    transport.spec.clone(),
                    self.drain.clone(),
                )),
                BoundListener::Unix(listener) => tokio::spawn(serve_transport(
                    TrackedListener::new(listener, label, sessions.clone()),
                    app.clone(),
                    transport.spec.clone(),
                    self.drain.clone(),
                )),
            };
            self.serving.push(ServingTransport {
                spec: transport.spec,
                handle,
            });
        }
    }

    /// Gracefully stop the server and tear down every transport.
    ///
    /// Runs [`drain`](Self::drain) then [`unbind`](Self::unbind).
    pub async fn unbind_all(&mut self, policy: UnbindPolicy) -> Result<UnbindReport, DrainError> {
        let drained = self.drain(policy).await;
        let report = self.unbind(drained.as_deref().unwrap_or_default());
        drained.map(|_| report)
    }

    /// Stop accepting and wait for in-flight requests.
    ///
    /// New connections are refused as soon as this is called. With a timeout
    /// in `policy`, any serve task still running at the deadline is aborted,
    /// which force-closes its connections. Returns the transports that
    /// stopped cleanly.
    pub async fn drain(&mut self, policy: UnbindPolicy) -> Result<Vec<TransportSpec>, DrainError> {
        self.drain.cancel();

        let serving = std::mem::take(&mut self.serving);
        let aborts: Vec<_> = serving.iter().map(|s| s.handle.abort_handle()).collect();

        let wait_all = async {
            let mut outcomes = Vec::with_capacity(serving.len());
            for ServingTransport { spec, handle } in serving {
                outcomes.push((spec, handle.await));
            }
            outcomes
        };

        let outcomes = match policy.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, wait_all).await {
                Ok(outcomes) => outcomes,
                Err(_) => {
                    for abort in aborts {
                        abort.abort();
                    }
                    tracing::warn!(timeout = ?timeout, "Drain deadline reached, force-closing");
                    return Err(DrainError::TimedOut(timeout));
                }
            },
            None => wait_all.await,
        };

        let mut first_error = None;
        let mut stopped = Vec::with_capacity(outcomes.len());
        for (spec, outcome) in outcomes {
            if outcome.is_err() {
                let e = DrainError::Panicked {
                    transport: spec.clone(),
                };
                tracing::error!(transport = %spec, error = %e, "Transport did not stop cleanly");
                first_error.get_or_insert(e);
                continue;
            }
            tracing::info!(transport = %spec, "Transport drained");
            stopped.push(spec);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(stopped),
        }
    }

    /// Release every transport that is no longer serving.
    ///
    /// Listeners that were bound but never served are dropped, and the socket
    /// files of `stopped` transports are removed.
    pub fn unbind(&mut self, stopped: &[TransportSpec]) -> UnbindReport {
        let mut report = UnbindReport::default();

        for transport in std::mem::take(&mut self.bound) {
            report.torn_down.push(transport.spec.clone());
            if let Some(path) = release_one(transport) {
                report.removed_sockets.push(path);
            }
        }

        for spec in stopped {
            if let Some(path) = spec.unix_path() {
                match SocketFileGuard::new(path).cleanup() {
                    Ok(true) => report.removed_sockets.push(path.to_path_buf()),
                    Ok(false) => {}
                    Err(e) => tracing::warn!(error = %e, "Socket removal after stop failed"),
                }
            }
            tracing::info!(transport = %spec, "Transport unbound");
            report.torn_down.push(spec.clone());
        }

        report
    }
}

async fn serve_transport<L>(
    mut listener: L,
    app: Router,
    spec: TransportSpec,
    drain: CancellationToken,
) where
    L: Listener,
{
    tracing::debug!(transport = %spec, "Serving");

    let builder = AutoBuilder::new(TokioExecutor::new());
    let graceful = GracefulShutdown::new();
    // Dropped with this task, which aborts every connection still open.
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = drain.cancelled() => break,
            (io, _peer) = listener.accept() => {
                let app = app.clone();
                let service = hyper::service::service_fn(move |req: hyper::Request<Incoming>| {
                    let mut app = app.clone();
                    async move { app.call(req.map(Body::new)).await }
                });

                let conn = builder
                    .serve_connection_with_upgrades(TokioIo::new(io), service)
                    .into_owned();
                let conn = graceful.watch(conn);

                connections.spawn(async move {
                    if let Err(e) = conn.await {
                        tracing::debug!(error = %e, "Connection closed with error");
                    }
                });
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    tracing::info!(
        transport = %spec,
        in_flight = connections.len(),
        "Stopped accepting, draining connections"
    );
    graceful.shutdown().await;
    while connections.join_next().await.is_some() {}
}

fn release(bound: Vec<BoundTransport>) {
    for transport in bound {
        tracing::info!(transport = %transport.spec, "Releasing listener after failed startup");
        release_one(transport);
    }
}

/// Drop the listener and remove the socket file it created.
fn release_one(transport: BoundTransport) -> Option<PathBuf> {
    let BoundTransport { spec, listener, .. } = transport;
    drop(listener);
    let path = spec.unix_path()?;
    match SocketFileGuard::new(path).cleanup() {
        Ok(true) => Some(path.to_path_buf()),
        Ok(false) => None,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to remove socket file");
            None
        }
    }
}
