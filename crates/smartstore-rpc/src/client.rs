//! RPC client facade.
//!
//! `call` validates the operation, lets the session prepare the parameters,
//! then runs the retry state machine. Each attempt registers a fresh
//! correlation id, arms its deadline, and runs the transport in its own task
//! until the registry settles the id.

use crate::adapters::{CallbackTransport, HttpTransport, MemoryTokenStore};
use crate::domain::config::{ClientConfig, ConfigError, TransportKind};
use crate::domain::correlation::CorrelationId;
use crate::domain::envelope::{Envelope, Params};
use crate::domain::error::RpcError;
use crate::domain::operations::validate_operation;
use crate::domain::retry::{Outcome, RetryPolicy, RetryState};
use crate::ports::{BackOfficeApi, OutboundRequest, TokenStore, Transport};
use crate::registry::{CorrelationRegistry, RegistryStats};
use crate::session::{PreparedCall, SessionContext, SessionExpired, SessionState};
use crate::timeout::TimeoutGuard;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info_span, warn, Instrument};

/// Per-call overrides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Per-attempt deadline
    pub timeout: Option<Duration>,
    /// Attempts for this call, first one included
    pub max_attempts: Option<u32>,
}

impl CallOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// One attempt, no retry.
    pub fn once() -> Self {
        Self::default().with_max_attempts(1)
    }
}

/// Removes the attempt from the registry if the caller stops waiting.
struct InFlight<'a> {
    registry: &'a CorrelationRegistry,
    id: CorrelationId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.registry.abandon(self.id);
    }
}

/// Back-office RPC client
pub struct RpcClient {
    transport: Arc<dyn Transport>,
    registry: Arc<CorrelationRegistry>,
    deadlines: Arc<TimeoutGuard>,
    session: Arc<SessionContext>,
    retry: RetryPolicy,
    default_timeout: Duration,
}

impl RpcClient {
    pub fn builder(transport: Arc<dyn Transport>) -> RpcClientBuilder {
        RpcClientBuilder {
            transport,
            config: ClientConfig::default(),
            token_store: None,
            retry: None,
        }
    }

    /// Client using the transport named in `config`.
    pub fn from_config(config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let transport: Arc<dyn Transport> = match config.transport {
            TransportKind::Http => Arc::new(HttpTransport::from_config(&config)?),
            TransportKind::Callback => Arc::new(CallbackTransport::from_config(&config)?),
        };
        Self::builder(transport).config(config).build()
    }

    /// Issue `operation` and wait for its correlated response.
    ///
    /// `params` is copied; the caller's map is never modified. A
    /// `success: false` envelope comes back as `RpcError::Application`.
    pub async fn call(
        &self,
        operation: &str,
        params: &Params,
        options: CallOptions,
    ) -> Result<Envelope, RpcError> {
        validate_operation(operation)?;
        let prepared = self.session.prepare(operation, params)?;

        let policy = match options.max_attempts {
            Some(attempts) => self.retry.clone().with_max_attempts(attempts),
            None => self.retry.clone(),
        };
        let timeout = options.timeout.unwrap_or(self.default_timeout);

        let mut state = RetryState::start();
        let mut attempt = 1;
        loop {
            let span = info_span!(
                "rpc_attempt",
                operation = operation,
                attempt = attempt,
                transport = self.transport.name()
            );
            let result = self
                .attempt(operation, &prepared, attempt, timeout)
                .instrument(span)
                .await;

            state = state.record(&policy, Outcome::of(&result));
            match state {
                RetryState::Waiting {
                    next_attempt,
                    delay,
                } => {
                    if let Err(e) = &result {
                        warn!(
                            operation = operation,
                            attempt = attempt,
                            error = %e,
                            delay_ms = delay.as_millis() as u64,
                            "Attempt failed, retrying"
                        );
                    }
                    tokio::time::sleep(delay).await;
                    state = state.resume();
                    attempt = next_attempt;
                }
                _ => return result,
            }
        }
    }

    /// One dispatch: register, arm, run the transport, await settlement.
    async fn attempt(
        &self,
        operation: &str,
        prepared: &PreparedCall,
        attempt: u32,
        timeout: Duration,
    ) -> Result<Envelope, RpcError> {
        let (id, settled) = self.registry.register(operation, attempt);
        let _in_flight = InFlight {
            registry: &self.registry,
            id,
        };

        {
            let registry = Arc::clone(&self.registry);
            self.deadlines.arm(id, timeout, move || {
                registry.cancel(id, RpcError::timeout(timeout));
            });
        }

        let request = OutboundRequest {
            correlation_id: id,
            operation: operation.to_string(),
            params: prepared.params.clone(),
            token: prepared.token.clone(),
            attempt,
        };
        let transport = Arc::clone(&self.transport);
        let inbound = self.registry.inbound();
        let task = tokio::spawn(async move {
            transport.dispatch(request, inbound.clone()).await;
            if inbound.is_pending(id) {
                inbound.fail(id, "transport finished without settling");
            }
        });
        self.registry.attach_transport(id, task.abort_handle());
        debug!(correlation_id = %id, "Attempt dispatched");

        let settlement = settled
            .await
            .unwrap_or_else(|_| Err(RpcError::transport("attempt dropped before settlement")));
        task.abort();

        let envelope = settlement?;
        self.session
            .observe(operation, &envelope, prepared.token.as_deref());

        if envelope.success {
            Ok(envelope)
        } else {
            Err(RpcError::application(envelope))
        }
    }

    /// Snapshot of the session
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Register a hook fired when the backend invalidates the session.
    pub fn on_session_expired<F>(&self, hook: F)
    where
        F: Fn(&SessionExpired) + Send + Sync + 'static,
    {
        self.session.on_expired(hook);
    }

    /// Forget the session locally. No request is sent.
    pub fn logout(&self) {
        self.session.logout();
    }

    /// Attempts dispatched but not yet settled
    pub fn pending_count(&self) -> usize {
        self.registry.pending_count()
    }

    /// Deadlines currently running
    pub fn armed_deadlines(&self) -> usize {
        self.deadlines.armed_count()
    }

    pub fn stats(&self) -> &RegistryStats {
        self.registry.stats()
    }
}

#[async_trait]
impl BackOfficeApi for RpcClient {
    async fn call(
        &self,
        operation: &str,
        params: &Params,
        options: CallOptions,
    ) -> Result<Envelope, RpcError> {
        RpcClient::call(self, operation, params, options).await
    }

    fn session_state(&self) -> SessionState {
        RpcClient::session_state(self)
    }

    fn logout(&self) {
        RpcClient::logout(self)
    }
}

/// Builder for [`RpcClient`]
pub struct RpcClientBuilder {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    token_store: Option<Arc<dyn TokenStore>>,
    retry: Option<RetryPolicy>,
}

impl RpcClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Where the session token lives. Defaults to [`MemoryTokenStore`].
    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    /// Override the retry settings of the configuration.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Override the default per-attempt deadline.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeouts.default = timeout;
        self
    }

    /// Override the public allow-list.
    pub fn public_operations<I, S>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.session.public_operations = operations.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> Result<RpcClient, ConfigError> {
        self.config.validate()?;

        let store = self
            .token_store
            .unwrap_or_else(|| Arc::new(MemoryTokenStore::new()));
        let deadlines = Arc::new(TimeoutGuard::new());
        let registry = Arc::new(CorrelationRegistry::new(Arc::clone(&deadlines)));

        Ok(RpcClient {
            transport: self.transport,
            registry,
            deadlines,
            session: Arc::new(SessionContext::new(self.config.session.clone(), store)),
            retry: self
                .retry
                .unwrap_or_else(|| RetryPolicy::from_config(&self.config.retry)),
            default_timeout: self.config.timeouts.default,
        })
    }
}
