//! The response envelope: `{ "success": bool, "message"?: string, ...data }`.
//!
//! A body is well-formed only when it is a JSON object carrying a boolean
//! `success`. Anything else decodes to `PROTOCOL_ERROR`.

use crate::domain::error::RpcError;
use serde::Serialize;
use serde_json::{Map, Value};

/// Parameter set for one operation. Copied into the request at call time.
pub type Params = Map<String, Value>;

/// Decoded backend response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    /// Whether the backend considers the operation successful
    pub success: bool,
    /// Human-readable reason, present on application failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Operation-specific fields
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Envelope {
    /// Successful envelope with the given data fields.
    pub fn ok(data: Map<String, Value>) -> Self {
        Self {
            success: true,
            message: None,
            data,
        }
    }

    /// Application failure with a message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: Map::new(),
        }
    }

    /// Decode a raw response body.
    pub fn decode(body: &[u8]) -> Result<Self, RpcError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| RpcError::protocol(format!("response is not valid JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Build an envelope from an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, RpcError> {
        let Value::Object(mut fields) = value else {
            return Err(RpcError::protocol("response is not a JSON object"));
        };

        let success = match fields.remove("success") {
            Some(Value::Bool(flag)) => flag,
            Some(other) => {
                return Err(RpcError::protocol(format!(
                    "`success` must be a boolean, got {}",
                    other
                )))
            }
            None => return Err(RpcError::protocol("response has no `success` field")),
        };

        let message = match fields.remove("message") {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text),
            Some(other) => Some(other.to_string()),
        };

        Ok(Self {
            success,
            message,
            data: fields,
        })
    }

    /// Look up an operation-specific field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Look up a string field.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// True when `message` equals `marker` exactly.
    pub fn has_message(&self, marker: &str) -> bool {
        self.message.as_deref() == Some(marker)
    }

    /// Re-encode as a JSON value, `success` and `message` included.
    pub fn to_value(&self) -> Value {
        let mut fields = self.data.clone();
        fields.insert("success".into(), Value::Bool(self.success));
        if let Some(message) = &self.message {
            fields.insert("message".into(), Value::String(message.clone()));
        }
        Value::Object(fields)
    }
}
