//! SmartStore RPC - correlated back-office calls over a cross-origin-safe channel.
//!
//! The back office (inventory, point-of-sale, reporting, user administration)
//! lives behind an endpoint that is reached either through a JSONP-style
//! callback channel or a plain HTTP exchange. This crate owns the transport
//! layer: every call gets exactly one correlated response, a deadline, a
//! bounded retry loop and session-token handling.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              RpcClient                               │
//! │  call(operation, params, options) -> Result<Envelope, RpcError>      │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  ┌────────────────┐   ┌─────────────────┐   ┌──────────────────┐     │
//! │  │ SessionContext │──▶│  RetryState     │──▶│  attempt()       │     │
//! │  │ prepare/observe│   │  machine        │   │                  │     │
//! │  └────────────────┘   └─────────────────┘   └────────┬─────────┘     │
//! │                                                      │               │
//! │       ┌───────────────────────┬──────────────────────┤               │
//! │       ▼                       ▼                      ▼               │
//! │  ┌──────────────────┐  ┌──────────────┐  ┌─────────────────────┐     │
//! │  │CorrelationRegistry│◀─│ TimeoutGuard │  │ Transport (port)    │     │
//! │  │ id -> oneshot     │  │ id -> timer  │  │ http | callback     │     │
//! │  └────────▲─────────┘  └──────────────┘  └──────────┬──────────┘     │
//! │           │                 Inbound                  │               │
//! │           └──────────────────────────────────────────┘               │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Error kinds
//!
//! | Kind | Retried | Meaning |
//! |------|---------|---------|
//! | `VALIDATION_ERROR` | no | empty operation name |
//! | `AUTH_REQUIRED` | no | private operation without a token, nothing dispatched |
//! | `TRANSPORT_ERROR` | yes | the channel could not deliver |
//! | `TIMEOUT` | yes | no response before the deadline |
//! | `PROTOCOL_ERROR` | no | body is not JSON or has no boolean `success` |
//! | `APPLICATION_ERROR` | no | `success: false`, envelope returned verbatim |
//!
//! `SESSION_EXPIRED` is not returned from `call`; it is emitted to the hooks
//! registered with [`RpcClient::on_session_expired`].
//!
//! # Usage
//!
//! ```ignore
//! use smartstore_rpc::{CallOptions, ClientConfig, RpcClient};
//!
//! let client = RpcClient::from_config(ClientConfig::from_env()?)?;
//! client.login("admin", "admin").await?;
//! let inventory = client.get_inventory_data().await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod api;
pub mod client;
pub mod domain;
pub mod ports;
pub mod registry;
pub mod session;
pub mod timeout;

// Re-exports for public API
pub use adapters::{CallbackTransport, HttpTransport, MemoryTokenStore};
pub use client::{CallOptions, RpcClient, RpcClientBuilder};
pub use domain::config::{ClientConfig, ConfigError, TransportKind};
pub use domain::correlation::CorrelationId;
pub use domain::envelope::{Envelope, Params};
pub use domain::error::{ErrorKind, RpcError};
pub use domain::retry::{RetryPolicy, RetryState};
pub use ports::{BackOfficeApi, OutboundRequest, TokenStore, Transport};
pub use registry::{CorrelationRegistry, Inbound, RegistryStats};
pub use session::{SessionContext, SessionExpired, SessionState};
pub use timeout::TimeoutGuard;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User agent sent by the HTTP-based transports.
pub fn user_agent() -> String {
    format!("smartstore-rpc/{}", VERSION)
}
