//! JSON-RPC 2.0 message model.
//!
//! One message per wire frame. Batch requests and responses are not
//! represented here; a top-level array is rejected by the codec before it
//! reaches these types.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// JSON-RPC version constant.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC version tag; serializes to the constant `"2.0"` and refuses
/// anything else on the way in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let version = String::deserialize(deserializer)?;
        if version == JSONRPC_VERSION {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!(
                "invalid JSON-RPC version: expected '{JSONRPC_VERSION}', got '{version}'"
            )))
        }
    }
}

/// Request identifier.
///
/// This client only ever generates the `String` form (see
/// [`crate::id::generate_request_id`]), but servers are free to use numbers
/// for their own requests and we must echo them back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// String identifier.
    String(String),
    /// Integer identifier.
    Number(i64),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

/// JSON-RPC request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version tag.
    pub jsonrpc: JsonRpcVersion,
    /// Request method name.
    pub method: String,
    /// Request parameters; `None` is encoded as absence of the field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Request identifier.
    pub id: RequestId,
}

impl JsonRpcRequest {
    /// Create a new request.
    pub fn new(method: impl Into<String>, params: Option<Value>, id: RequestId) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
            id,
        }
    }
}

/// Response payload; the untagged enum enforces that exactly one of
/// `result` / `error` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcResponsePayload {
    /// Successful response.
    Success {
        /// Response result.
        result: Value,
    },
    /// Error response.
    Error {
        /// Response error envelope.
        error: JsonRpcError,
    },
}

/// Response identifier; `null` only appears on server-side parse errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId(pub Option<RequestId>);

impl ResponseId {
    /// The request id this response answers, if any.
    pub fn as_request_id(&self) -> Option<&RequestId> {
        self.0.as_ref()
    }
}

/// JSON-RPC response message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version tag.
    pub jsonrpc: JsonRpcVersion,
    /// Result or error, never both.
    #[serde(flatten)]
    pub payload: JsonRpcResponsePayload,
    /// Identifier of the request being answered.
    pub id: ResponseId,
}

impl JsonRpcResponse {
    /// Build a success response.
    pub fn success(result: Value, id: RequestId) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Success { result },
            id: ResponseId(Some(id)),
        }
    }

    /// Build an error response.
    pub fn error(error: JsonRpcError, id: RequestId) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Error { error },
            id: ResponseId(Some(id)),
        }
    }

    /// The result value, when this is a success response.
    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            JsonRpcResponsePayload::Success { result } => Some(result),
            JsonRpcResponsePayload::Error { .. } => None,
        }
    }

    /// The error envelope, when this is an error response.
    pub fn error_payload(&self) -> Option<&JsonRpcError> {
        match &self.payload {
            JsonRpcResponsePayload::Success { .. } => None,
            JsonRpcResponsePayload::Error { error } => Some(error),
        }
    }
}

/// JSON-RPC notification message; no response is expected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version tag.
    pub jsonrpc: JsonRpcVersion,
    /// Notification method name.
    pub method: String,
    /// Notification parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a new notification.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i32,
    /// Error message.
    pub message: String,
    /// Additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Standard JSON-RPC error code for an unknown method.
pub const METHOD_NOT_FOUND: i32 = -32601;

/// A single JSON-RPC message: request, response, or notification.
///
/// Variant order matters for the untagged deserializer: a request carries
/// both `id` and `method`, a response carries `id` plus `result`/`error`,
/// and a notification carries `method` alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// Request (has `id` and `method`).
    Request(JsonRpcRequest),
    /// Response (has `id` and one of `result`/`error`).
    Response(JsonRpcResponse),
    /// Notification (has `method`, no `id`).
    Notification(JsonRpcNotification),
}

impl JsonRpcMessage {
    /// The method name, for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(r) => Some(&r.method),
            Self::Notification(n) => Some(&n.method),
            Self::Response(_) => None,
        }
    }

    /// Whether this frame is a request for the given method.
    pub fn is_request_for(&self, method: &str) -> bool {
        matches!(self, Self::Request(r) if r.method == method)
    }
}
