//! JSONP-style callback transport.
//!
//! Each attempt installs a uniquely named handler in a shared namespace,
//! loads `endpoint?function=<op>&callback=<handler>&data=<json>`, and runs
//! the returned script, which is expected to be a single invocation
//! `handler({...});`. The invocation is routed by handler name through the
//! namespace, so a script addressing a handler that is no longer installed
//! is dropped.
//!
//! The handler is removed when the attempt ends, whether it succeeded,
//! failed, or its task was aborted.

use crate::domain::config::{ClientConfig, ConfigError};
use crate::domain::correlation::CorrelationId;
use crate::domain::error::RpcError;
use crate::ports::{OutboundRequest, Transport};
use crate::registry::Inbound;
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, Url};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Shared namespace of live handler names.
#[derive(Debug, Default)]
pub struct CallbackNamespace {
    handlers: DashMap<String, CorrelationId>,
    stray: AtomicU64,
}

impl CallbackNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the handler for `id`. It stays installed until the slot drops.
    pub fn install(self: &Arc<Self>, id: CorrelationId, prefix: &str) -> HandlerSlot {
        let name = id.callback_name(prefix);
        self.handlers.insert(name.clone(), id);
        HandlerSlot {
            namespace: Arc::clone(self),
            name,
        }
    }

    /// Run an invocation of `handler` with a raw JSON payload.
    ///
    /// Returns true if it settled a pending attempt.
    pub fn invoke(&self, handler: &str, payload: &[u8], inbound: &Inbound) -> bool {
        let Some(id) = self.handlers.get(handler).map(|entry| *entry.value()) else {
            self.stray.fetch_add(1, Ordering::Relaxed);
            warn!(handler = handler, "Invocation of a handler that is not installed");
            return false;
        };
        inbound.deliver(id, payload)
    }

    pub fn is_installed(&self, handler: &str) -> bool {
        self.handlers.contains_key(handler)
    }

    /// Handlers currently installed
    pub fn live_handlers(&self) -> usize {
        self.handlers.len()
    }

    /// Invocations that found no handler
    pub fn stray_count(&self) -> u64 {
        self.stray.load(Ordering::Relaxed)
    }
}

/// Installed handler; uninstalls on drop.
pub struct HandlerSlot {
    namespace: Arc<CallbackNamespace>,
    name: String,
}

impl HandlerSlot {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for HandlerSlot {
    fn drop(&mut self) {
        self.namespace.handlers.remove(&self.name);
    }
}

/// Split a script of the form `handler(payload);` into its parts.
///
/// Accepts the `/**/` guard and `window.` qualifier some servers emit.
pub fn parse_invocation(script: &str) -> Option<(&str, &str)> {
    let body = script.trim().trim_end_matches(';').trim_end();
    let open = body.find('(')?;

    let callee = body[..open].trim();
    let callee = callee.strip_prefix("/**/").unwrap_or(callee).trim();
    let callee = callee.strip_prefix("window.").unwrap_or(callee);
    let is_identifier = !callee.is_empty()
        && callee
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if !is_identifier {
        return None;
    }

    let payload = body[open + 1..].strip_suffix(')')?;
    Some((callee, payload.trim()))
}

/// Callback-channel transport
pub struct CallbackTransport {
    client: Client,
    endpoint: Url,
    prefix: String,
    namespace: Arc<CallbackNamespace>,
}

impl CallbackTransport {
    pub fn new(endpoint: &str, prefix: &str, connect_timeout: Duration) -> Result<Self, ConfigError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ConfigError::Invalid(format!("endpoint {:?}: {}", endpoint, e)))?;
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(crate::user_agent())
            .build()
            .map_err(|e| ConfigError::Invalid(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            prefix: prefix.to_string(),
            namespace: Arc::new(CallbackNamespace::new()),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        Self::new(&config.endpoint, &config.callback.prefix, config.timeouts.connect)
    }

    /// The namespace scripts are routed through
    pub fn namespace(&self) -> &Arc<CallbackNamespace> {
        &self.namespace
    }

    /// Script URL for one attempt. `data` is omitted when there are no params.
    pub fn script_url(&self, request: &OutboundRequest, handler: &str) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("function", &request.operation);
            query.append_pair("callback", handler);
            if !request.params.is_empty() {
                query.append_pair("data", &request.params_json());
            }
        }
        url
    }

    async fn load(&self, url: Url) -> Result<String, RpcError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_connect() {
                RpcError::transport(format!("cannot connect to {}", self.endpoint))
            } else {
                RpcError::transport(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::transport(format!("script load failed: {}", status)));
        }

        response.text().await.map_err(RpcError::transport)
    }
}

#[async_trait]
impl Transport for CallbackTransport {
    async fn dispatch(&self, request: OutboundRequest, inbound: Inbound) {
        let id = request.correlation_id;
        let slot = self.namespace.install(id, &self.prefix);
        let url = self.script_url(&request, slot.name());

        debug!(correlation_id = %id, handler = slot.name(), "Loading callback script");

        match self.load(url).await {
            Err(e) => {
                inbound.settle(id, Err(e));
            }
            Ok(script) => match parse_invocation(&script) {
                Some((handler, payload)) => {
                    self.namespace.invoke(handler, payload.as_bytes(), &inbound);
                }
                None => {
                    inbound.settle(
                        id,
                        Err(RpcError::protocol("script is not a handler invocation")),
                    );
                }
            },
        }

        if inbound.is_pending(id) {
            inbound.settle(
                id,
                Err(RpcError::protocol(format!(
                    "script did not invoke handler {}",
                    slot.name()
                ))),
            );
        }
    }

    fn name(&self) -> &'static str {
        "callback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http::testing::{serve_once, serve_silence, serve_with};
    use crate::domain::envelope::Params;
    use crate::domain::error::ErrorKind;
    use crate::registry::CorrelationRegistry;
    use crate::timeout::TimeoutGuard;
    use serde_json::json;

    const PREFIX: &str = "smartstore_cb_";

    fn registry() -> Arc<CorrelationRegistry> {
        Arc::new(CorrelationRegistry::new(Arc::new(TimeoutGuard::new())))
    }

    fn request(id: CorrelationId, params: Params) -> OutboundRequest {
        OutboundRequest {
            correlation_id: id,
            operation: "getRecentSales".into(),
            params,
            token: None,
            attempt: 1,
        }
    }

    fn query_param(raw_request: &str, key: &str) -> Option<String> {
        let path = raw_request.split_whitespace().nth(1)?;
        let url = Url::parse(&format!("http://local{}", path)).ok()?;
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_parse_invocation() {
        assert_eq!(
            parse_invocation("cb_1({\"success\":true});"),
            Some(("cb_1", "{\"success\":true}"))
        );
        assert_eq!(
            parse_invocation("/**/ window.cb_1( {\"a\":\"(x)\"} )\n"),
            Some(("cb_1", "{\"a\":\"(x)\"}"))
        );
        assert_eq!(parse_invocation("{\"success\":true}"), None);
        assert_eq!(parse_invocation("var handled = true;"), None);
        assert_eq!(parse_invocation("new Foo()({})"), None);
        assert_eq!(parse_invocation("cb_1({}"), None);
    }

    #[test]
    fn test_script_url_shape() {
        let transport = CallbackTransport::new("https://backend.example/exec", PREFIX, Duration::from_secs(1)).unwrap();
        let id = CorrelationId::new();
        let mut params = Params::new();
        params.insert("limit".into(), json!(5));

        let url = transport.script_url(&request(id, params), "smartstore_cb_x");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("function".to_string(), "getRecentSales".to_string()),
                ("callback".to_string(), "smartstore_cb_x".to_string()),
                ("data".to_string(), "{\"limit\":5}".to_string()),
            ]
        );

        let url = transport.script_url(&request(id, Params::new()), "smartstore_cb_x");
        assert!(!url.query_pairs().any(|(k, _)| k == "data"));
    }

    #[tokio::test]
    async fn test_script_invokes_handler() {
        let (url, server) = serve_with(|raw| {
            let handler = query_param(raw, "callback").unwrap_or_default();
            (200, format!("{}({{\"success\":true,\"data\":[]}});", handler))
        })
        .await;
        let transport = CallbackTransport::new(&url, PREFIX, Duration::from_secs(2)).unwrap();
        let registry = registry();
        let (id, rx) = registry.register("getRecentSales", 1);

        transport.dispatch(request(id, Params::new()), registry.inbound()).await;

        let envelope = rx.await.unwrap().unwrap();
        assert!(envelope.success);
        assert_eq!(envelope.get("data"), Some(&json!([])));
        assert_eq!(transport.namespace().live_handlers(), 0);

        let raw = server.await.unwrap();
        assert_eq!(query_param(&raw, "function").as_deref(), Some("getRecentSales"));
        assert_eq!(query_param(&raw, "callback"), Some(id.callback_name(PREFIX)));
    }

    #[tokio::test]
    async fn test_load_failure_is_transport_error() {
        let (url, _server) = serve_once(404, "Not Found").await;
        let transport = CallbackTransport::new(&url, PREFIX, Duration::from_secs(2)).unwrap();
        let registry = registry();
        let (id, rx) = registry.register("getRecentSales", 1);

        transport.dispatch(request(id, Params::new()), registry.inbound()).await;

        assert_eq!(rx.await.unwrap().unwrap_err().kind(), ErrorKind::Transport);
        assert_eq!(transport.namespace().live_handlers(), 0);
    }

    #[tokio::test]
    async fn test_script_for_other_handler_is_protocol_error() {
        let (url, _server) = serve_once(200, "smartstore_cb_someoneelse({\"success\":true})").await;
        let transport = CallbackTransport::new(&url, PREFIX, Duration::from_secs(2)).unwrap();
        let registry = registry();
        let (id, rx) = registry.register("getRecentSales", 1);

        transport.dispatch(request(id, Params::new()), registry.inbound()).await;

        assert_eq!(rx.await.unwrap().unwrap_err().kind(), ErrorKind::Protocol);
        assert_eq!(transport.namespace().stray_count(), 1);
    }

    #[tokio::test]
    async fn test_handler_without_success_is_protocol_error() {
        let (url, _server) = serve_with(|raw| {
            let handler = query_param(raw, "callback").unwrap_or_default();
            (200, format!("{}({{\"items\":[]}})", handler))
        })
        .await;
        let transport = CallbackTransport::new(&url, PREFIX, Duration::from_secs(2)).unwrap();
        let registry = registry();
        let (id, rx) = registry.register("getRecentSales", 1);

        transport.dispatch(request(id, Params::new()), registry.inbound()).await;
        assert_eq!(rx.await.unwrap().unwrap_err().kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_late_invocation_after_settle_is_dropped() {
        let registry = registry();
        let namespace = Arc::new(CallbackNamespace::new());
        let (id, rx) = registry.register("getRecentSales", 1);
        let slot = namespace.install(id, PREFIX);
        let name = slot.name().to_string();

        assert!(namespace.invoke(&name, br#"{"success":true}"#, &registry.inbound()));
        assert!(!namespace.invoke(&name, br#"{"success":false}"#, &registry.inbound()));
        drop(slot);
        assert!(!namespace.invoke(&name, br#"{"success":false}"#, &registry.inbound()));

        assert!(rx.await.unwrap().unwrap().success);
        assert_eq!(namespace.stray_count(), 1);
    }

    #[tokio::test]
    async fn test_aborted_attempt_releases_handler() {
        let url = serve_silence().await;
        let transport = Arc::new(CallbackTransport::new(&url, PREFIX, Duration::from_secs(2)).unwrap());
        let registry = registry();
        let (id, _rx) = registry.register("getRecentSales", 1);

        let task = {
            let transport = Arc::clone(&transport);
            let inbound = registry.inbound();
            tokio::spawn(async move { transport.dispatch(request(id, Params::new()), inbound).await })
        };

        while transport.namespace().live_handlers() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(transport.namespace().is_installed(&id.callback_name(PREFIX)));

        task.abort();
        let _ = task.await;
        assert_eq!(transport.namespace().live_handlers(), 0);
    }
}
