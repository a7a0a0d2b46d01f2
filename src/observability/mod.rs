//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges)
//!
//! Optional reporters (diagnostics.rs):
//!     → memory usage, session registry compaction, session dump
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Metrics endpoint (Prometheus scrape, when configured)
//! ```
//!
//! # Design Decisions
//! - Structured fields on every lifecycle event
//! - Metrics are cheap and recorded even without an exporter
//! - Diagnostics never influence serving or shutdown

pub mod diagnostics;
pub mod logging;
pub mod metrics;
