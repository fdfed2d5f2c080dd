//! # Inbound Ports
//!
//! What the embedding application sees of the client.

use crate::client::CallOptions;
use crate::domain::{Envelope, Params, RpcError};
use crate::session::SessionState;
use async_trait::async_trait;

/// Back-office RPC API - inbound port.
///
/// Implemented by [`crate::RpcClient`]; UI code depends on this trait so it
/// can be driven by a fake in its own tests.
#[async_trait]
pub trait BackOfficeApi: Send + Sync {
    /// Issue `operation` and wait for its single correlated response.
    async fn call(
        &self,
        operation: &str,
        params: &Params,
        options: CallOptions,
    ) -> Result<Envelope, RpcError>;

    /// Current session snapshot.
    fn session_state(&self) -> SessionState;

    /// Forget the session locally.
    fn logout(&self);
}
