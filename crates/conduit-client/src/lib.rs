//! # Conduit Client
//!
//! The MCP client session: request/response correlation over a
//! [`Transport`], notification fan-out, server-initiated request handling,
//! the protocol handshake, and typed operations for tools, resources,
//! prompts, and logging.
//!
//! On top of the session sit the tool bridge — MCP tool schemas projected
//! into a generic [`Property`] tree and tool-call results into a generic
//! [`Message`] — and the [`ToolGenerator`] adapter that exposes each server
//! tool as an invokable callback.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use conduit_client::{Session, SessionConfig};
//! use conduit_transport::{StdioTransport, StdioTransportConfig};
//!
//! # async fn example() -> conduit_protocol::Result<()> {
//! let transport = Arc::new(StdioTransport::new(
//!     StdioTransportConfig::new("my-mcp-server").args(["--quiet"]),
//! ));
//! let session = Session::connect(transport, SessionConfig::default()).await?;
//!
//! for tool in session.list_tools().await? {
//!     println!("{}: {}", tool.name, tool.description.as_deref().unwrap_or(""));
//! }
//! session.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`Transport`]: conduit_transport::Transport

pub mod bridge;
pub mod generator;
pub mod message;
pub mod session;

pub use bridge::{
    Property, PropertyType, ToolDefinition, ToolSchema, convert_call_result, convert_property,
    convert_tool, property_to_json, schema_to_json,
};
pub use generator::{SessionToolCallback, ToolCallback, ToolGenerator, register_session_tools};
pub use message::{Block, BlockType, Message, Modality, Role};
pub use session::{Session, SessionConfig};
