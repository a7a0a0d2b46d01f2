//! grs-server
//!
//! Hosts a protocol server on a TCP address and/or a Unix domain socket and
//! manages its lifecycle.
//!
//! # Architecture Overview
//!
//! ```text
//!   CLI / GRS_* env / TOML
//!            │
//!            ▼
//!   ┌─────────────────┐     ┌──────────────────┐
//!   │     config      │────▶│  http::registry  │  services registered before bind
//!   └─────────────────┘     └────────┬─────────┘
//!                                    ▼
//!   ┌──────────────────────────────────────────────────────┐
//!   │ net::listener  ListenerSet                           │
//!   │   tcp host:port          unix path (+ SocketFileGuard)│
//!   └──────────────────────────┬───────────────────────────┘
//!                              │ serving
//!   SIGINT/SIGTERM/SIGUSR1/2   ▼
//!   panic hook ───────▶ lifecycle::shutdown  (drain → unbind → cleanup → exit code)
//! ```

use std::process;

use clap::Parser;

use grs_server::config::cli::{parse_failure_exit_code, Cli};
use grs_server::error::StartupError;
use grs_server::http::DescriptorSetRegistry;
use grs_server::lifecycle::{self, signals, ProcessContext, STARTUP_FAILURE_EXIT_CODE};
use grs_server::observability::{logging, metrics};

fn main() {
    process::exit(run());
}

#[tokio::main]
async fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => match parse_failure_exit_code(&e) {
            Some(code) => {
                let _ = e.print();
                return code;
            }
            None => e.exit(),
        },
    };

    let config = match cli.resolve() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return STARTUP_FAILURE_EXIT_CODE;
        }
    };

    if let Err(e) = logging::init(config.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    tracing::info!("grs-server v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        transports = ?config.listener.transports().iter().map(ToString::to_string).collect::<Vec<_>>(),
        socket_mode = %config.listener.socket_mode,
        drain_timeout_ms = config.shutdown.drain_timeout_ms,
        "Configuration loaded"
    );

    // Validation already checked the address.
    if let Some(addr) = config
        .observability
        .metrics_address
        .as_deref()
        .and_then(|a| a.parse().ok())
    {
        if let Err(e) = metrics::init_metrics(addr) {
            tracing::error!(error = %e, "Failed to start metrics exporter");
        }
    }

    let ctx = ProcessContext::new(config);

    if let Err(e) = signals::install_os_handlers(ctx.signals()) {
        let e = StartupError::Signals(e);
        tracing::error!(error = %e, "Startup failed");
        return STARTUP_FAILURE_EXIT_CODE;
    }
    signals::install_fault_hook(ctx.signals());

    let registry = DescriptorSetRegistry::new(ctx.config().descriptor_set.clone());
    let server = match lifecycle::start(ctx, &registry).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return STARTUP_FAILURE_EXIT_CODE;
        }
    };

    match server.run_until_shutdown().await {
        Some(outcome) => outcome.exit_code,
        None => {
            tracing::error!("Shutdown was started elsewhere, exiting");
            STARTUP_FAILURE_EXIT_CODE
        }
    }
}
