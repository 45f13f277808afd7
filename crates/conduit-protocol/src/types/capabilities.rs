//! Capability negotiation types.
//!
//! A `None` member of [`ServerCapabilities`] means the server did not
//! advertise that feature group; client operations gate on presence before
//! issuing any traffic.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Flags attached to a capability group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    /// Whether the server emits `list_changed` notifications for this group.
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
    /// Whether the server accepts subscriptions (resources only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,
}

/// Capabilities announced by the server during the handshake.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Prompt listing/retrieval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<Capability>,
    /// Resource listing/reading/subscription.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Capability>,
    /// Tool listing/invocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Capability>,
    /// Log-level control; presence alone gates `logging/setLevel`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<Value>,
    /// Experimental, non-standard capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, Value>>,
}

/// Capabilities this client announces.
///
/// Sampling and filesystem roots are deliberately absent: server-initiated
/// `sampling/createMessage` is refused and roots are not implemented.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCapabilities {
    /// Experimental, non-standard capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_groups_deserialize_to_none() {
        let caps: ServerCapabilities = serde_json::from_str("{}").unwrap();
        assert!(caps.tools.is_none());
        assert!(caps.resources.is_none());
        assert!(caps.logging.is_none());
    }

    #[test]
    fn subscribe_flag_roundtrips() {
        let raw = r#"{"resources":{"subscribe":true,"listChanged":false}}"#;
        let caps: ServerCapabilities = serde_json::from_str(raw).unwrap();
        let resources = caps.resources.unwrap();
        assert_eq!(resources.subscribe, Some(true));
        assert_eq!(resources.list_changed, Some(false));
    }

    #[test]
    fn empty_client_capabilities_serialize_to_empty_object() {
        let caps = ClientCapabilities::default();
        assert_eq!(serde_json::to_string(&caps).unwrap(), "{}");
    }
}
