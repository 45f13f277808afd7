//! # Conduit Transport
//!
//! The [`Transport`] contract and its three concrete carriers for MCP
//! traffic:
//!
//! - [`StdioTransport`] — a spawned subprocess speaking newline-delimited
//!   JSON over its stdin/stdout;
//! - [`HttpSseTransport`] — the legacy HTTP flavour (protocol date
//!   2024-11-05): a long-lived GET SSE stream plus a POST side channel
//!   advertised in an `endpoint` event;
//! - [`StreamableHttpTransport`] — the modern flavour (2025-03-26): a single
//!   endpoint, per-request SSE upgrade, and an `Mcp-Session-Id` header;
//!
//! plus [`AutoHttpTransport`], which starts on the modern flavour and falls
//! back to the legacy one when `initialize` is met with HTTP 404/405.

pub mod auto;
pub mod http_sse;
pub mod sse;
pub mod stdio;
pub mod streamable_http;
pub mod wire;

use async_trait::async_trait;
use conduit_protocol::{JsonRpcMessage, Result};

pub use auto::AutoHttpTransport;
pub use http_sse::{HttpSseConfig, HttpSseTransport};
pub use stdio::{StderrHandler, StdioTransport, StdioTransportConfig};
pub use streamable_http::{StreamableHttpConfig, StreamableHttpTransport};

/// A frame-level carrier for JSON-RPC messages.
///
/// Implementations run their own background readers and surface inbound
/// frames through [`receive`](Transport::receive). All methods take `&self`;
/// interior state is synchronized by each implementation.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Short transport name used in error classification and tracing.
    fn name(&self) -> &'static str;

    /// Establish the connection.
    ///
    /// Blocks until `send`/`receive` are usable. A second call fails with
    /// [`conduit_protocol::Error::AlreadyConnected`].
    async fn connect(&self) -> Result<()>;

    /// Write one frame.
    async fn send(&self, message: JsonRpcMessage) -> Result<()>;

    /// Await the next inbound frame.
    ///
    /// Returns `Ok(None)` once the transport has torn down. A decode failure
    /// on a single frame is returned as `Err` without ending the stream;
    /// callers may keep receiving.
    async fn receive(&self) -> Result<Option<JsonRpcMessage>>;

    /// Tear down the transport and release OS resources. Idempotent.
    async fn close(&self) -> Result<()>;
}
