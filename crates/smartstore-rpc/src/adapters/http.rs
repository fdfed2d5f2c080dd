//! Direct request/response transport.
//!
//! POSTs `{"function", "correlationId", "data"}` as JSON and decodes the body
//! as an envelope. The session token also goes out as a bearer header.

use crate::domain::config::{ClientConfig, ConfigError};
use crate::domain::correlation::CorrelationId;
use crate::domain::envelope::{Envelope, Params};
use crate::domain::error::RpcError;
use crate::ports::{OutboundRequest, Transport};
use crate::registry::Inbound;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest<'a> {
    function: &'a str,
    correlation_id: CorrelationId,
    data: &'a Params,
}

/// HTTP POST transport
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
}

impl HttpTransport {
    pub fn new(endpoint: &str, connect_timeout: Duration) -> Result<Self, ConfigError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ConfigError::Invalid(format!("endpoint {:?}: {}", endpoint, e)))?;
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(crate::user_agent())
            .build()
            .map_err(|e| ConfigError::Invalid(format!("http client: {}", e)))?;

        Ok(Self { client, endpoint })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        Self::new(&config.endpoint, config.timeouts.connect)
    }

    async fn exchange(&self, request: &OutboundRequest) -> Result<Envelope, RpcError> {
        let wire = WireRequest {
            function: &request.operation,
            correlation_id: request.correlation_id,
            data: &request.params,
        };

        let mut builder = self.client.post(self.endpoint.clone()).json(&wire);
        if let Some(token) = &request.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() {
                RpcError::transport(format!("cannot connect to {}", self.endpoint))
            } else {
                RpcError::transport(e)
            }
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(RpcError::transport)?;
        debug!(
            correlation_id = %request.correlation_id,
            status = status.as_u16(),
            bytes = body.len(),
            "HTTP response received"
        );

        match Envelope::decode(&body) {
            Ok(envelope) => Ok(envelope),
            // An error page is a delivery failure, same as a failed script load.
            Err(_) if !status.is_success() => {
                Err(RpcError::transport(format!("server returned {}", status)))
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn dispatch(&self, request: OutboundRequest, inbound: Inbound) {
        let result = self.exchange(&request).await;
        inbound.settle(request.correlation_id, result);
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
