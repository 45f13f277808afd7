//! Tool-callback adapter.
//!
//! Bridges discovered MCP tools into an external generator layer: each tool
//! becomes an invokable callback that takes raw JSON parameters and returns
//! a [`Message`]. Provider-specific adapters (OpenAI, Anthropic, ...) live
//! outside this workspace; they only need to implement [`ToolGenerator`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use conduit_protocol::Result;

use crate::bridge::ToolDefinition;
use crate::message::Message;
use crate::session::Session;

/// A callable exposed to the generator layer.
///
/// Callbacks never fail: every error is folded into a tool-result message
/// with `tool_result_error` set, so the generator can always hand the model
/// something to read.
#[async_trait]
pub trait ToolCallback: Send + Sync {
    /// Invoke the tool with the raw JSON parameter payload produced by the
    /// model.
    async fn call(&self, tool_call_id: &str, params_json: &str) -> Message;
}

/// The external generator contract tools are registered into.
pub trait ToolGenerator: Send {
    /// Register one tool and its callback.
    fn register_tool(&mut self, tool: ToolDefinition, callback: Arc<dyn ToolCallback>)
    -> Result<()>;
}

/// A [`ToolCallback`] that forwards invocations to one tool of a session.
pub struct SessionToolCallback {
    session: Arc<Session>,
    tool_name: String,
}

impl SessionToolCallback {
    /// Create a callback for the named tool.
    pub fn new(session: Arc<Session>, tool_name: impl Into<String>) -> Self {
        Self {
            session,
            tool_name: tool_name.into(),
        }
    }
}

#[async_trait]
impl ToolCallback for SessionToolCallback {
    async fn call(&self, tool_call_id: &str, params_json: &str) -> Message {
        let arguments: HashMap<String, Value> = if params_json.trim().is_empty() {
            HashMap::new()
        } else {
            match serde_json::from_str(params_json) {
                Ok(map) => map,
                Err(e) => {
                    return Message::error_tool_result(
                        tool_call_id,
                        format!("invalid tool parameters: {e}"),
                    );
                }
            }
        };

        match self.session.call_tool(&self.tool_name, arguments).await {
            Ok(mut message) => {
                // Blocks come back with a fresh id; the tool-call id is the
                // one the generator correlates on.
                for block in &mut message.blocks {
                    block.id = tool_call_id.to_string();
                }
                message
            }
            Err(e) => Message::error_tool_result(tool_call_id, e.to_string()),
        }
    }
}

/// Discover the session's tools and register each one into the generator.
/// Returns the number of tools registered.
pub async fn register_session_tools(
    session: &Arc<Session>,
    generator: &mut dyn ToolGenerator,
) -> Result<usize> {
    let tools = session.list_tools().await?;
    let count = tools.len();
    for tool in tools {
        debug!(tool = %tool.name, "registering MCP tool");
        let callback = Arc::new(SessionToolCallback::new(
            Arc::clone(session),
            tool.name.clone(),
        ));
        generator.register_tool(tool, callback)?;
    }
    Ok(count)
}
