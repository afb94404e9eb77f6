//! service-core: Shared infrastructure for the finance services.
pub mod config;
pub mod error;
pub mod grpc;
pub mod observability;

pub use tonic;
pub use tracing;
