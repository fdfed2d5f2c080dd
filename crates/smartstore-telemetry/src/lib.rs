//! # SmartStore Telemetry
//!
//! Logging bootstrap shared by SmartStore binaries.
//!
//! The RPC library only emits `tracing` events; whoever embeds it decides
//! where they go. This crate is that decision for our own tools.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use smartstore_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&TelemetryConfig::from_env())?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SMARTSTORE_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `SMARTSTORE_JSON_LOGS` | `false` (`true` in containers) | JSON log lines |
//! | `SMARTSTORE_SERVICE_NAME` | `smartstore` | Service name on every event |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{build_filter, init_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter {filter:?}: {reason}")]
    Filter { filter: String, reason: String },

    #[error("Failed to install subscriber: {0}")]
    Subscriber(String),
}
