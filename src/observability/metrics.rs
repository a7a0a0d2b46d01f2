//! Metrics collection and exposition.
//!
//! # Metrics
//! - `grs_transports_bound_total` (counter): transports bound, by kind
//! - `grs_sessions_total` (counter): accepted connections, by transport
//! - `grs_active_sessions` (gauge): live connections
//! - `grs_shutdowns_total` (counter): shutdown sequences, by signal
//! - `grs_memory_bytes` (gauge): process memory, by kind
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::net::transport::TransportKind;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_bind(kind: TransportKind) {
    metrics::counter!("grs_transports_bound_total", "kind" => kind.as_str()).increment(1);
}

pub fn record_session_opened(transport: &str) {
    metrics::counter!("grs_sessions_total", "transport" => transport.to_string()).increment(1);
}

pub fn set_active_sessions(count: usize) {
    metrics::gauge!("grs_active_sessions").set(count as f64);
}

pub fn record_shutdown(signal: &str) {
    metrics::counter!("grs_shutdowns_total", "signal" => signal.to_string()).increment(1);
}

pub fn record_memory(kind: &'static str, bytes: u64) {
    metrics::gauge!("grs_memory_bytes", "kind" => kind).set(bytes as f64);
}
