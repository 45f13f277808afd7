//! Generic message model.
//!
//! The provider-neutral form that tool-call results are bridged into. A
//! [`Message`] is a role plus a sequence of typed [`Block`]s; generator
//! layers translate these into whatever their LLM provider expects.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Who a message is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// End-user input.
    User,
    /// Model output.
    Assistant,
    /// The outcome of a tool invocation.
    ToolResult,
}

/// What kind of content a block carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockType {
    /// Ordinary content.
    Content,
    /// A tool invocation emitted by the model.
    ToolCall,
    /// A tool outcome.
    ToolResult,
    /// Model reasoning.
    Thinking,
}

/// The medium of a block's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modality {
    /// Plain or structured text.
    Text,
    /// Image data.
    Image,
    /// Audio data.
    Audio,
    /// Video data.
    Video,
}

/// One unit of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Correlation id; tool-result blocks carry the originating call id.
    pub id: String,
    /// Block kind.
    pub block_type: BlockType,
    /// Content medium.
    pub modality: Modality,
    /// MIME type of `content`.
    pub mime_type: String,
    /// The payload: text, or base64 data for binary modalities.
    pub content: String,
    /// Side-channel fields such as `resource_uri`.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra_fields: HashMap<String, String>,
}

impl Block {
    /// A plain-text content block.
    pub fn text(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            block_type: BlockType::Content,
            modality: Modality::Text,
            mime_type: "text/plain".to_string(),
            content: content.into(),
            extra_fields: HashMap::new(),
        }
    }
}

/// A role-attributed sequence of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message role.
    pub role: Role,
    /// Message content.
    pub blocks: Vec<Block>,
    /// For `ToolResult` messages, whether the tool reported failure.
    #[serde(default)]
    pub tool_result_error: bool,
}

impl Message {
    /// A tool-result message.
    pub fn tool_result(blocks: Vec<Block>, tool_result_error: bool) -> Self {
        Self {
            role: Role::ToolResult,
            blocks,
            tool_result_error,
        }
    }

    /// A failed tool result carrying a single explanatory text block.
    pub fn error_tool_result(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::tool_result(vec![Block::text(id, text)], true)
    }
}
