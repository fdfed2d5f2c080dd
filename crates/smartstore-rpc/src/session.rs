//! Session token handling.
//!
//! The context is the only writer of the token: a successful login installs
//! it, and an envelope carrying the expiry marker clears it. Expiry is
//! compared against the token the call was sent with, so concurrent calls
//! that all observe the marker clear the token and fire the hooks once.

use crate::domain::config::SessionConfig;
use crate::domain::envelope::{Envelope, Params};
use crate::domain::error::RpcError;
use crate::domain::operations::AccessPolicy;
use crate::ports::TokenStore;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Hook fired when the backend reports an invalid session
pub type ExpiryHook = Arc<dyn Fn(&SessionExpired) + Send + Sync>;

/// Snapshot returned by `session_state()`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    pub has_token: bool,
    /// User record returned by the last successful login
    pub user: Option<Value>,
}

/// Emitted once per invalidated token
#[derive(Debug, Clone, PartialEq)]
pub struct SessionExpired {
    /// Operation whose response carried the marker
    pub operation: String,
    /// The marker message
    pub message: String,
}

/// Parameters ready for dispatch
#[derive(Debug, Clone)]
pub struct PreparedCall {
    pub params: Params,
    /// Token merged into `params`, if any
    pub token: Option<String>,
}

/// Token, user and expiry hooks of one client.
pub struct SessionContext {
    store: Arc<dyn TokenStore>,
    policy: AccessPolicy,
    config: SessionConfig,
    user: RwLock<Option<Value>>,
    /// Serializes token install/clear so the compare-and-clear is atomic
    transition: Mutex<()>,
    hooks: RwLock<Vec<ExpiryHook>>,
    expirations: AtomicU64,
}

impl SessionContext {
    pub fn new(config: SessionConfig, store: Arc<dyn TokenStore>) -> Self {
        Self {
            store,
            policy: AccessPolicy::new(config.public_operations.iter().cloned()),
            config,
            user: RwLock::new(None),
            transition: Mutex::new(()),
            hooks: RwLock::new(Vec::new()),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn requires_token(&self, operation: &str) -> bool {
        self.policy.requires_token(operation)
    }

    /// Copy `params` for dispatch, merging the token for private operations.
    ///
    /// Fails with `AUTH_REQUIRED` when a private operation has no token.
    pub fn prepare(&self, operation: &str, params: &Params) -> Result<PreparedCall, RpcError> {
        let mut params = params.clone();

        if !self.requires_token(operation) {
            return Ok(PreparedCall {
                params,
                token: None,
            });
        }

        let Some(token) = self.store.get() else {
            warn!(operation = operation, "Private operation called without a session");
            return Err(RpcError::auth_required(operation));
        };

        params.insert(self.config.token_param.clone(), Value::String(token.clone()));
        Ok(PreparedCall {
            params,
            token: Some(token),
        })
    }

    /// React to a well-formed envelope returned for `operation`.
    ///
    /// `sent_with` is the token the call carried.
    pub fn observe(&self, operation: &str, envelope: &Envelope, sent_with: Option<&str>) {
        if envelope.success {
            if operation == self.config.login_operation {
                self.install(envelope);
            }
            return;
        }

        if !envelope.has_message(&self.config.expiry_marker) {
            return;
        }

        let cleared = {
            let _transition = self.transition.lock();
            match (self.store.get(), sent_with) {
                (Some(current), Some(sent)) if current == sent => {
                    self.store.clear();
                    *self.user.write() = None;
                    true
                }
                _ => false,
            }
        };

        if !cleared {
            return;
        }

        self.expirations.fetch_add(1, Ordering::Relaxed);
        warn!(operation = operation, "Session expired, token cleared");

        let event = SessionExpired {
            operation: operation.to_string(),
            message: self.config.expiry_marker.clone(),
        };
        let hooks = self.hooks.read().clone();
        for hook in hooks {
            hook(&event);
        }
    }

    fn install(&self, envelope: &Envelope) {
        let Some(token) = envelope.get_str(&self.config.token_field) else {
            warn!(
                field = %self.config.token_field,
                "Login succeeded without a token, session unchanged"
            );
            return;
        };

        let _transition = self.transition.lock();
        self.store.set(token);
        *self.user.write() = envelope.get(&self.config.user_field).cloned();
        info!("Session token installed");
    }

    /// Forget the token and user locally.
    pub fn logout(&self) {
        let _transition = self.transition.lock();
        self.store.clear();
        *self.user.write() = None;
        info!("Session cleared");
    }

    pub fn state(&self) -> SessionState {
        SessionState {
            has_token: self.store.get().is_some(),
            user: self.user.read().clone(),
        }
    }

    /// Register a hook fired on every session expiry.
    pub fn on_expired<F>(&self, hook: F)
    where
        F: Fn(&SessionExpired) + Send + Sync + 'static,
    {
        self.hooks.write().push(Arc::new(hook));
    }

    /// Number of expiries observed
    pub fn expiration_count(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryTokenStore;
    use crate::domain::error::ErrorKind;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn context() -> (SessionContext, Arc<MemoryTokenStore>) {
        let store = Arc::new(MemoryTokenStore::new());
        (
            SessionContext::new(SessionConfig::default(), store.clone()),
            store,
        )
    }

    fn envelope(value: Value) -> Envelope {
        Envelope::from_value(value).unwrap()
    }

    #[test]
    fn test_private_without_token_is_auth_required() {
        let (session, _) = context();
        let err = session.prepare("getInventoryData", &Params::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthRequired);
    }

    #[test]
    fn test_public_passes_without_token() {
        let (session, _) = context();
        let mut params = Params::new();
        params.insert("username".into(), json!("admin"));

        let prepared = session.prepare("login", &params).unwrap();
        assert_eq!(prepared.params, params);
        assert!(prepared.token.is_none());
    }

    #[test]
    fn test_token_merged_without_mutating_caller() {
        let (session, store) = context();
        store.set("abc");
        let params = Params::new();

        let prepared = session.prepare("getAllUsers", &params).unwrap();
        assert_eq!(prepared.params.get("token"), Some(&json!("abc")));
        assert_eq!(prepared.token.as_deref(), Some("abc"));
        assert!(params.is_empty());
    }

    #[test]
    fn test_login_installs_token_and_user() {
        let (session, store) = context();
        session.observe(
            "login",
            &envelope(json!({"success": true, "token": "abc", "user": {"username": "admin", "role": "Manager"}})),
            None,
        );

        assert_eq!(store.get().as_deref(), Some("abc"));
        let state = session.state();
        assert!(state.has_token);
        assert_eq!(state.user, Some(json!({"username": "admin", "role": "Manager"})));
    }

    #[test]
    fn test_failed_login_leaves_session() {
        let (session, store) = context();
        session.observe("login", &envelope(json!({"success": false, "message": "Invalid password"})), None);
        assert!(store.get().is_none());
    }

    #[test]
    fn test_other_success_does_not_install() {
        let (session, store) = context();
        session.observe("getAllUsers", &envelope(json!({"success": true, "token": "zzz"})), None);
        assert!(store.get().is_none());
    }

    #[test]
    fn test_expiry_clears_once_and_fires_once() {
        let (session, store) = context();
        store.set("abc");
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = Arc::clone(&fired);
            session.on_expired(move |event| {
                assert_eq!(event.message, "Invalid token");
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }

        let expired = envelope(json!({"success": false, "message": "Invalid token"}));
        session.observe("getAllUsers", &expired, Some("abc"));
        session.observe("getInventoryData", &expired, Some("abc"));

        assert!(store.get().is_none());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(session.expiration_count(), 1);
    }

    #[test]
    fn test_stale_expiry_keeps_new_token() {
        let (session, store) = context();
        store.set("fresh");

        session.observe(
            "getAllUsers",
            &envelope(json!({"success": false, "message": "Invalid token"})),
            Some("old"),
        );
        assert_eq!(store.get().as_deref(), Some("fresh"));
    }

    #[test]
    fn test_other_failures_keep_token() {
        let (session, store) = context();
        store.set("abc");
        session.observe(
            "deleteUser",
            &envelope(json!({"success": false, "message": "Cannot delete yourself"})),
            Some("abc"),
        );
        assert!(store.get().is_some());
    }

    #[test]
    fn test_logout() {
        let (session, store) = context();
        store.set("abc");
        session.logout();
        assert_eq!(
            session.state(),
            SessionState {
                has_token: false,
                user: None
            }
        );
    }
}
