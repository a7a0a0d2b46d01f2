//! Hosted protocol server subsystem.
//!
//! # Data Flow
//! ```text
//! registry.rs (services registered before bind)
//!     → server.rs (Axum router + middleware)
//!     → served on every transport by net::listener
//! ```

pub mod registry;
pub mod server;

pub use registry::{DescriptorSetRegistry, NoServices, ServiceRegistry};
pub use server::ProtocolServer;
