//! Domain types for the RPC client.
//!
//! Pure types and state machines only. Anything that spawns tasks or owns
//! shared state lives next to the client (`registry`, `timeout`, `session`).

pub mod config;
pub mod correlation;
pub mod envelope;
pub mod error;
pub mod operations;
pub mod retry;

// Re-exports for convenience
pub use config::{ClientConfig, ConfigError, TransportKind};
pub use correlation::CorrelationId;
pub use envelope::{Envelope, Params};
pub use error::{ErrorKind, RpcError};
pub use operations::{validate_operation, AccessPolicy, OperationAccess};
pub use retry::{Outcome, RetryPolicy, RetryState};
