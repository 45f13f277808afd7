//! # Conduit Protocol
//!
//! JSON-RPC 2.0 message model and MCP domain types shared by every Conduit
//! crate, plus the unified error taxonomy and protocol-version handling.
//!
//! The wire format is JSON-RPC 2.0 with exactly one message per frame; batch
//! frames are not part of this protocol surface and are rejected at the codec
//! layer.

pub mod error;
pub mod id;
pub mod jsonrpc;
pub mod types;
pub mod version;

pub use error::{Error, Result};
pub use id::generate_request_id;
pub use jsonrpc::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};
pub use version::{LEGACY_PROTOCOL_VERSION, PROTOCOL_VERSION, ProtocolVersion};

/// Hard cap on a single wire frame, request or response (10 MiB).
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;
