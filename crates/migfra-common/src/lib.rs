//! # Migfra Common
//!
//! Common types and errors shared across the migfra benchmark crates.
//!
//! Every other crate in the workspace builds on the error taxonomy defined
//! here (configuration, transport, remote execution) and on the two domain
//! types that travel between workers: correlation identifiers and migration
//! directions.

pub mod errors;
pub mod types;

// Re-export commonly used items
pub use errors::{
    Error, RemoteError, RemoteResult, Result, ResultExt, TransportError, TransportResult,
};
pub use types::{CorrelationId, Direction};
