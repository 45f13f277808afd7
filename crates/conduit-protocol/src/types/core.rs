//! Shared protocol primitives: pagination cursors, empty results, and the
//! progress / cancellation notification payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::jsonrpc::RequestId;

/// Opaque pagination token.
pub type Cursor = String;

/// Empty result object for acknowledgement-style responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyResult {}

/// Parameters of a `notifications/progress` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressParams {
    /// Token correlating the progress stream to a request; string or number.
    #[serde(rename = "progressToken")]
    pub progress_token: Value,
    /// Progress so far.
    pub progress: f64,
    /// Total work, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

/// Parameters of a `notifications/cancelled` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelledParams {
    /// Identifier of the request being cancelled.
    #[serde(rename = "requestId")]
    pub request_id: RequestId,
    /// Optional human-readable reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
