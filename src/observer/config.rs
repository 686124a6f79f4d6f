//! Observer configuration.
//!
//! Every field has a default, so a partial JSON document yields a usable
//! `ObserverConfig`.

use serde::{Deserialize, Serialize};

use crate::error::{PeerError, PeerResult};

/// When the state manager republishes a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishPolicy {
    /// Publish on every accepted event, even if nothing changed.
    #[default]
    EveryEvent,
    /// Publish only when the snapshot actually changed.
    OnChange,
}

/// Observer configuration.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    /// Name of the worker thread that owns all observer state.
    pub thread_name: String,
    pub publish_policy: PublishPolicy,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            thread_name: "peerlink-observer".to_string(),
            publish_policy: PublishPolicy::default(),
        }
    }
}

impl ObserverConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> PeerResult<Self> {
        serde_json::from_str(json).map_err(|e| PeerError::internal(format!("invalid observer config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(ObserverConfig::from_json_str("{}").unwrap(), ObserverConfig::default());
    }

    #[test]
    fn partial_document_overrides_named_fields() {
        let config = ObserverConfig::from_json_str(r#"{"publish_policy":"on_change"}"#).unwrap();
        assert_eq!(config.publish_policy, PublishPolicy::OnChange);
        assert_eq!(config.thread_name, "peerlink-observer");
    }

    #[test]
    fn malformed_document_is_an_error() {
        let err = ObserverConfig::from_json_str(r#"{"publish_policy":"sometimes"}"#).unwrap_err();
        assert!(matches!(err, PeerError::Internal { .. }));
    }
}
