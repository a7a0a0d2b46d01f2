//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults (schema.rs)
//!     → optional TOML file (loader.rs)
//!     → command line / GRS_* env overrides (cli.rs)
//!     → diagnostics env toggles (LOG_MEMORY_USAGE, MANUAL_GC, LOG_GRPC_SESSIONS)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once resolved
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde/clap) from semantic checks

pub mod cli;
pub mod loader;
pub mod schema;
pub mod validation;

pub use cli::Cli;
pub use loader::ConfigError;
pub use schema::{DiagnosticsConfig, ListenerConfig, ServerConfig, ShutdownConfig};
