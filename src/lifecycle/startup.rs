//! Startup orchestration.
//!
//! # Responsibilities
//! - Register services before any transport is bound
//! - Bind every configured transport, or fail as a whole
//! - Start serving and the diagnostics reporters
//! - Hand the bound set to the shutdown coordinator
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and nothing stays bound
//! - All lifecycle state lives in a [`ProcessContext`], there are no globals
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::error::{BindError, StartupError};
use crate::http::registry::ServiceRegistry;
use crate::http::server::ProtocolServer;
use crate::lifecycle::shutdown::{ShutdownCoordinator, ShutdownOutcome, ShutdownStateCell};
use crate::lifecycle::signals::{self, SignalPublisher, SignalReceiver};
use crate::net::connection::SessionRegistry;
use crate::net::listener::{ListenerSet, LocalAddr};
use crate::observability::diagnostics::DiagnosticsTicker;

/// Exit code for any failure before serving starts.
pub const STARTUP_FAILURE_EXIT_CODE: i32 = 1;

/// Everything the lifecycle components share, passed explicitly.
pub struct ProcessContext {
    config: ServerConfig,
    sessions: SessionRegistry,
    state: ShutdownStateCell,
    publisher: SignalPublisher,
    events: SignalReceiver,
    background: CancellationToken,
}

impl ProcessContext {
    pub fn new(config: ServerConfig) -> Self {
        let (publisher, events) = signals::channel();
        Self {
            config,
            sessions: SessionRegistry::new(),
            state: ShutdownStateCell::new(),
            publisher,
            events,
            background: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Publisher for OS signal handlers and the fault hook.
    pub fn signals(&self) -> SignalPublisher {
        self.publisher.clone()
    }

    pub fn state(&self) -> ShutdownStateCell {
        self.state.clone()
    }
}

/// A server that is bound and serving.
pub struct RunningServer {
    coordinator: ShutdownCoordinator,
    local_addrs: Vec<LocalAddr>,
    tcp_addr: Option<SocketAddr>,
    publisher: SignalPublisher,
    sessions: SessionRegistry,
    state: ShutdownStateCell,
}

impl RunningServer {
    pub fn local_addrs(&self) -> &[LocalAddr] {
        &self.local_addrs
    }

    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.tcp_addr
    }

    pub fn signals(&self) -> SignalPublisher {
        self.publisher.clone()
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn state(&self) -> ShutdownStateCell {
        self.state.clone()
    }

    /// Serve until the first signal or fault, then run the shutdown sequence.
    pub async fn run_until_shutdown(self) -> Option<ShutdownOutcome> {
        self.coordinator.run().await
    }
}

/// Register, bind, and start serving.
pub async fn start<R>(ctx: ProcessContext, registry: &R) -> Result<RunningServer, StartupError>
where
    R: ServiceRegistry + ?Sized,
{
    let ProcessContext {
        config,
        sessions,
        state,
        publisher,
        events,
        background,
    } = ctx;

    let specs = config.listener.transports();
    if specs.is_empty() {
        return Err(BindError::NothingToBind.into());
    }

    let server = ProtocolServer::new(registry)?;

    let mut listeners = ListenerSet::bind(&specs).await?;
    let local_addrs = listeners.local_addrs().to_vec();
    let tcp_addr = listeners.tcp_addr();

    listeners.serve(server.into_router(), &sessions);
    for addr in &local_addrs {
        tracing::info!(address = %addr, "Listening for connections");
    }

    DiagnosticsTicker::new(config.diagnostics.clone(), sessions.clone(), background.child_token())
        .spawn();

    let coordinator = ShutdownCoordinator::new(listeners, events, config.shutdown.unbind_policy())
        .with_state(state.clone())
        .with_background(background);

    Ok(RunningServer {
        coordinator,
        local_addrs,
        tcp_addr,
        publisher,
        sessions,
        state,
    })
}
