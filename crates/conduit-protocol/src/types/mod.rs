//! MCP domain types.
//!
//! Serde structs mirroring the wire shapes of the MCP methods this client
//! consumes. Field names follow the protocol's camelCase spelling via serde
//! renames; optional fields are encoded as absence.

pub mod capabilities;
pub mod content;
pub mod core;
pub mod initialization;
pub mod logging;
pub mod prompts;
pub mod resources;
pub mod tools;

pub use self::capabilities::{Capability, ClientCapabilities, ServerCapabilities};
pub use self::content::{
    AudioContent, ContentBlock, EmbeddedResource, ImageContent, ResourceContents, TextContent,
};
pub use self::core::{CancelledParams, Cursor, EmptyResult, ProgressParams};
pub use self::initialization::{Implementation, InitializeRequest, InitializeResult};
pub use self::logging::{LoggingLevel, SetLevelRequest};
pub use self::prompts::{
    GetPromptRequest, GetPromptResult, ListPromptsResult, Prompt, PromptArgument, PromptMessage,
};
pub use self::resources::{
    ListResourcesResult, ReadResourceRequest, ReadResourceResult, Resource, SubscribeRequest,
    UnsubscribeRequest,
};
pub use self::tools::{
    CallToolRequest, CallToolResult, ListToolsRequest, ListToolsResult, Tool, ToolInputSchema,
};
