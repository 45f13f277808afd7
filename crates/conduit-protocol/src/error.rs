//! Unified error taxonomy.
//!
//! Every crate in the workspace surfaces this one error type. Transport
//! implementations classify their failures into the typed variants here
//! rather than defining their own hierarchies.

use serde_json::Value;
use thiserror::Error;

/// A specialized `Result` type used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to callers of the client, transports, and auth helpers.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// A network or process failure inside a transport.
    #[error("{transport} transport: {operation} failed: {message}")]
    Transport {
        /// Which transport produced the failure (`"stdio"`, `"http+sse"`, ...).
        transport: &'static str,
        /// The operation that failed (`"connect"`, `"send"`, ...).
        operation: &'static str,
        /// Human-readable cause.
        message: String,
    },

    /// A JSON-RPC error envelope returned by the remote server.
    #[error("server returned JSON-RPC error {code}: {message}")]
    Protocol {
        /// JSON-RPC error code.
        code: i32,
        /// JSON-RPC error message.
        message: String,
        /// Optional structured error data.
        data: Option<Value>,
    },

    /// HTTP 401 or an equivalent authentication failure.
    #[error("authentication required: {0}")]
    Authentication(String),

    /// HTTP 429.
    #[error("rate limited: {message}")]
    RateLimited {
        /// Server-suggested retry delay in seconds, when provided.
        retry_after: Option<u64>,
        /// Human-readable cause.
        message: String,
    },

    /// Invalid local input, caught before any traffic is issued.
    #[error("invalid {field}: {message}")]
    Validation {
        /// The offending field or parameter.
        field: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// The server did not advertise the capability required by an operation.
    #[error("server does not support {feature}: {reason}")]
    Unsupported {
        /// The feature group that is missing (`"tools"`, `"logging"`, ...).
        feature: &'static str,
        /// Why the operation was refused.
        reason: String,
    },

    /// The server announced a protocol version newer than this client speaks.
    #[error("server protocol version {server} is newer than client version {client}")]
    VersionMismatch {
        /// The client's protocol date.
        client: String,
        /// The server's protocol date.
        server: String,
    },

    /// Internal sentinel: the server only speaks the legacy HTTP+SSE flavour.
    ///
    /// Returned by the Streamable HTTP transport when `initialize` is met
    /// with HTTP 404/405; the auto-detecting transport reacts by swapping in
    /// a legacy transport and never surfaces this to callers.
    #[error("server requires the legacy HTTP+SSE transport")]
    LegacyEndpointRequired,

    /// Serialization or deserialization failed.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The transport has not been connected yet.
    #[error("transport is not connected")]
    NotConnected,

    /// `connect` was called on an already-connected transport.
    #[error("transport is already connected")]
    AlreadyConnected,

    /// An operation that requires the handshake was called before it ran.
    #[error("session is not initialized")]
    NotInitialized,

    /// The handshake was attempted twice.
    #[error("session is already initialized")]
    AlreadyInitialized,

    /// The request was cancelled, or the session shut down underneath it.
    #[error("request was cancelled")]
    Cancelled,

    /// The request did not complete within its deadline.
    #[error("request timed out")]
    Timeout,
}

impl Error {
    /// Classify a transport-level failure.
    pub fn transport(
        transport: &'static str,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::Transport {
            transport,
            operation,
            message: message.into(),
        }
    }

    /// Invalid local input.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// A missing server capability.
    pub fn unsupported(feature: &'static str, reason: impl Into<String>) -> Self {
        Self::Unsupported {
            feature,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_classification() {
        let err = Error::transport("stdio", "send", "broken pipe");
        assert_eq!(err.to_string(), "stdio transport: send failed: broken pipe");

        let err = Error::unsupported("tools", "server advertised no tools capability");
        assert!(err.to_string().contains("tools"));
    }

    #[test]
    fn serde_errors_convert() {
        let bad: std::result::Result<serde_json::Value, _> = serde_json::from_str("{nope");
        let err: Error = bad.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
