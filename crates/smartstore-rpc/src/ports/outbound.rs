//! # Outbound Ports
//!
//! The one-shot channel to the backend and the storage of the session token.

use crate::domain::{CorrelationId, Params};
use crate::registry::Inbound;
use async_trait::async_trait;

/// One attempt, as handed to a transport.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// Id the response must be settled under
    pub correlation_id: CorrelationId,
    /// Remote operation name
    pub operation: String,
    /// Parameters, session token already merged in for private operations
    pub params: Params,
    /// Session token, for transports that also send it out of band
    pub token: Option<String>,
    /// 1-based attempt number within the logical call
    pub attempt: u32,
}

impl OutboundRequest {
    /// Parameters serialized as a JSON object
    pub fn params_json(&self) -> String {
        serde_json::Value::Object(self.params.clone()).to_string()
    }
}

/// One-shot channel to the backend - outbound port.
///
/// `dispatch` performs a single attempt and settles `request.correlation_id`
/// through `inbound` exactly once: with the decoded envelope, a protocol
/// error, or a transport error. Resources allocated for the attempt must be
/// released when `dispatch` returns or when its future is dropped.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn dispatch(&self, request: OutboundRequest, inbound: Inbound);

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Storage of the single session token - outbound port.
///
/// The medium belongs to the embedding application.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Option<String>;
    fn set(&self, token: &str);
    fn clear(&self);
}
