//! Correlation ID for matching inbound responses to in-flight attempts.
//!
//! Uses UUID v7: a millisecond timestamp followed by random bits.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies one dispatched attempt. A retry always gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a new correlation ID (UUID v7)
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Name of the inbound handler for this attempt on a callback channel.
    ///
    /// The name is a valid script identifier as long as `prefix` is one.
    pub fn callback_name(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.0.simple())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    proptest! {
        #[test]
        fn prop_ids_never_collide(count in 1usize..4_000) {
            let ids: HashSet<_> = (0..count).map(|_| CorrelationId::new()).collect();
            prop_assert_eq!(ids.len(), count);
        }

        #[test]
        fn prop_callback_name_is_identifier(prefix in "[a-zA-Z_][a-zA-Z0-9_]{0,16}") {
            let name = CorrelationId::new().callback_name(&prefix);
            prop_assert!(name.starts_with(&prefix));
            prop_assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        }
    }

    #[test]
    fn test_names_differ_per_attempt() {
        let first = CorrelationId::new().callback_name("smartstore_cb_");
        let second = CorrelationId::new().callback_name("smartstore_cb_");
        assert_ne!(first, second);
    }

    #[test]
    fn test_serde_transparent() {
        let id = CorrelationId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }
}
