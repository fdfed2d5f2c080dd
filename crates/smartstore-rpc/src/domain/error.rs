//! RPC error taxonomy.
//!
//! Only `TRANSPORT_ERROR` and `TIMEOUT` are retried. Everything else reaches
//! the caller on first occurrence, with its detail intact.

use crate::domain::envelope::Envelope;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Stable error codes shared with the embedding application
pub mod codes {
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const AUTH_REQUIRED: &str = "AUTH_REQUIRED";
    pub const TRANSPORT_ERROR: &str = "TRANSPORT_ERROR";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const PROTOCOL_ERROR: &str = "PROTOCOL_ERROR";
    pub const APPLICATION_ERROR: &str = "APPLICATION_ERROR";
    pub const SESSION_EXPIRED: &str = "SESSION_EXPIRED";
}

/// Error kind, one per code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Bad call-site usage
    #[serde(rename = "VALIDATION_ERROR")]
    Validation,
    /// No token for a private operation
    AuthRequired,
    /// Channel could not deliver
    #[serde(rename = "TRANSPORT_ERROR")]
    Transport,
    /// No response within the deadline
    Timeout,
    /// Response received but not a well-formed envelope
    #[serde(rename = "PROTOCOL_ERROR")]
    Protocol,
    /// Well-formed envelope with `success: false`
    #[serde(rename = "APPLICATION_ERROR")]
    Application,
    /// Backend signalled an invalid session (hook event only)
    SessionExpired,
}

impl ErrorKind {
    /// Stable string code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => codes::VALIDATION_ERROR,
            ErrorKind::AuthRequired => codes::AUTH_REQUIRED,
            ErrorKind::Transport => codes::TRANSPORT_ERROR,
            ErrorKind::Timeout => codes::TIMEOUT,
            ErrorKind::Protocol => codes::PROTOCOL_ERROR,
            ErrorKind::Application => codes::APPLICATION_ERROR,
            ErrorKind::SessionExpired => codes::SESSION_EXPIRED,
        }
    }

    /// Whether a failed attempt of this kind may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transport | ErrorKind::Timeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error returned by [`crate::RpcClient::call`].
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// Bad call-site usage
    #[error("validation error: {0}")]
    Validation(String),

    /// Private operation called without a session token
    #[error("operation `{operation}` requires a session token")]
    AuthRequired { operation: String },

    /// Channel could not be established or broke mid-flight
    #[error("transport error: {cause}")]
    Transport { cause: String },

    /// Deadline elapsed before any response
    #[error("no response within {}ms", .after.as_millis())]
    Timeout { after: Duration },

    /// Response did not honour the envelope contract
    #[error("protocol error: {detail}")]
    Protocol { detail: String },

    /// Backend answered `success: false`
    #[error("{}", .envelope.message.as_deref().unwrap_or("operation failed"))]
    Application { envelope: Envelope },
}

impl RpcError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn auth_required(operation: impl Into<String>) -> Self {
        Self::AuthRequired {
            operation: operation.into(),
        }
    }

    pub fn transport(cause: impl fmt::Display) -> Self {
        Self::Transport {
            cause: cause.to_string(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::Timeout { after }
    }

    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::Protocol {
            detail: detail.into(),
        }
    }

    pub fn application(envelope: Envelope) -> Self {
        Self::Application { envelope }
    }

    /// Kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            RpcError::Validation(_) => ErrorKind::Validation,
            RpcError::AuthRequired { .. } => ErrorKind::AuthRequired,
            RpcError::Transport { .. } => ErrorKind::Transport,
            RpcError::Timeout { .. } => ErrorKind::Timeout,
            RpcError::Protocol { .. } => ErrorKind::Protocol,
            RpcError::Application { .. } => ErrorKind::Application,
        }
    }

    /// Stable string code
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// The verbatim envelope of an application failure
    pub fn envelope(&self) -> Option<&Envelope> {
        match self {
            RpcError::Application { envelope } => Some(envelope),
            _ => None,
        }
    }
}
