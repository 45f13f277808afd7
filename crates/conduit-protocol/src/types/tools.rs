//! Tool listing and invocation types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::content::ContentBlock;
use super::core::Cursor;

/// A tool as advertised by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Programmatic tool name.
    pub name: String,
    /// Human-readable description for the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema describing the tool parameters.
    #[serde(rename = "inputSchema")]
    pub input_schema: ToolInputSchema,
}

/// Tool input schema; `type` must be `"object"`.
///
/// Property values are kept as raw JSON: the shapes servers emit here
/// (`anyOf`, nested objects, enums) are bridged into a typed model by the
/// client crate, not at the deserialization boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInputSchema {
    /// Schema type; `"object"` for every valid tool.
    #[serde(rename = "type")]
    pub schema_type: String,
    /// Parameter definitions keyed by name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, Value>>,
    /// Names of required parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl Default for ToolInputSchema {
    fn default() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: None,
            required: None,
        }
    }
}

/// Parameters of `tools/list`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListToolsRequest {
    /// Pagination cursor from a previous page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

/// Result of `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// Tools available on this page.
    pub tools: Vec<Tool>,
    /// Continuation token when more pages exist.
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

/// Parameters of `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolRequest {
    /// Tool name.
    pub name: String,
    /// Tool arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<HashMap<String, Value>>,
}

/// Result of `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolResult {
    /// Result content blocks.
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    /// Whether the tool execution failed.
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}
