//! Client configuration with validation.
//!
//! Loaded from TOML, then overlaid with `SMARTSTORE_*` environment variables.
//! Durations use humantime notation (`"30s"`, `"250ms"`).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend endpoint URL
    pub endpoint: String,
    /// Which channel realization to use
    pub transport: TransportKind,
    /// Deadlines
    pub timeouts: TimeoutConfig,
    /// Retry loop
    pub retry: RetryConfig,
    /// Session token handling
    pub session: SessionConfig,
    /// Callback channel settings
    pub callback: CallbackConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/exec".to_string(),
            transport: TransportKind::default(),
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
            session: SessionConfig::default(),
            callback: CallbackConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Parse from a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    /// Defaults overlaid with the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `SMARTSTORE_ENDPOINT`: backend URL
    /// - `SMARTSTORE_TRANSPORT`: `http` or `callback`
    /// - `SMARTSTORE_TIMEOUT_MS`: default per-attempt deadline
    /// - `SMARTSTORE_MAX_ATTEMPTS`: attempts per call
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `SMARTSTORE_*` overrides taken from `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup("SMARTSTORE_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Some(kind) = lookup("SMARTSTORE_TRANSPORT") {
            self.transport = kind.parse()?;
        }
        if let Some(ms) = lookup("SMARTSTORE_TIMEOUT_MS") {
            let ms: u64 = ms.parse().map_err(|_| {
                ConfigError::InvalidTimeout(format!("SMARTSTORE_TIMEOUT_MS is not a number: {}", ms))
            })?;
            self.timeouts.default = Duration::from_millis(ms);
        }
        if let Some(attempts) = lookup("SMARTSTORE_MAX_ATTEMPTS") {
            self.retry.max_attempts = attempts.parse().map_err(|_| {
                ConfigError::InvalidRetry(format!(
                    "SMARTSTORE_MAX_ATTEMPTS is not a number: {}",
                    attempts
                ))
            })?;
        }
        Ok(self)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint cannot be empty".into()));
        }

        if self.timeouts.default.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "default timeout cannot be 0".into(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidRetry("max_attempts cannot be 0".into()));
        }

        if self.retry.multiplier == 0 {
            return Err(ConfigError::InvalidRetry("multiplier cannot be 0".into()));
        }

        if self.retry.max_delay < self.retry.base_delay {
            return Err(ConfigError::InvalidRetry(
                "max_delay must be at least base_delay".into(),
            ));
        }

        if self.session.token_param.is_empty() {
            return Err(ConfigError::Invalid("session.token_param cannot be empty".into()));
        }

        if self.session.login_operation.is_empty() {
            return Err(ConfigError::Invalid(
                "session.login_operation cannot be empty".into(),
            ));
        }

        let prefix = &self.callback.prefix;
        let is_identifier = prefix
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !is_identifier {
            return Err(ConfigError::Invalid(format!(
                "callback.prefix must be an identifier: {:?}",
                prefix
            )));
        }

        Ok(())
    }
}

/// Channel realization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// JSON body over POST
    #[default]
    Http,
    /// JSONP-style GET whose body invokes a named handler
    Callback,
}

impl std::str::FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(TransportKind::Http),
            "callback" | "jsonp" => Ok(TransportKind::Callback),
            other => Err(ConfigError::Invalid(format!("unknown transport: {}", other))),
        }
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-attempt deadline unless the call overrides it
    #[serde(with = "humantime_serde")]
    pub default: Duration,
    /// TCP/TLS connect timeout for the HTTP client
    #[serde(with = "humantime_serde")]
    pub connect: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(30),
            connect: Duration::from_secs(10),
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per logical call, first one included
    pub max_attempts: u32,
    /// Delay before the second attempt
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Growth factor per further attempt (1 = constant delay)
    pub multiplier: u32,
    /// Upper bound on any single delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2,
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Operations callable without a token
    pub public_operations: Vec<String>,
    /// Operation whose success installs the token
    pub login_operation: String,
    /// Parameter name the token is sent under
    pub token_param: String,
    /// Envelope field carrying the token after login
    pub token_field: String,
    /// Envelope field carrying the user after login
    pub user_field: String,
    /// Exact `message` the backend sends for an invalid session
    pub expiry_marker: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            public_operations: vec!["login".to_string(), "testConnection".to_string()],
            login_operation: "login".to_string(),
            token_param: "token".to_string(),
            token_field: "token".to_string(),
            user_field: "user".to_string(),
            expiry_marker: "Invalid token".to_string(),
        }
    }
}

/// Callback channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackConfig {
    /// Prefix of generated handler names
    pub prefix: String,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            prefix: "smartstore_cb_".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Invalid retry settings
    #[error("invalid retry settings: {0}")]
    InvalidRetry(String),
    /// Malformed configuration document
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    /// Configuration file could not be read
    #[error("failed to read configuration: {0}")]
    Io(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
