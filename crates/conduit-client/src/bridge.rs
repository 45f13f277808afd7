//! Tool-schema bridge.
//!
//! MCP describes tool parameters in a JSON-Schema dialect that mixes typed
//! nodes, `anyOf` unions, enums, and untyped members. This module projects
//! those descriptions into the [`Property`] sum-tree that generator layers
//! consume, and converts `tools/call` results into the generic
//! [`Message`] form.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use conduit_protocol::types::{CallToolResult, ContentBlock, ResourceContents, Tool};
use conduit_protocol::{Error, Result};

use crate::message::{Block, BlockType, Message, Modality};

/// Side-channel field naming the URI a resource block came from.
pub const RESOURCE_URI_FIELD: &str = "resource_uri";

/// The type of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropertyType {
    /// JSON string.
    String,
    /// JSON number.
    Number,
    /// JSON integer.
    Integer,
    /// JSON boolean.
    Boolean,
    /// JSON object.
    Object,
    /// JSON array.
    Array,
    /// JSON null.
    Null,
    /// Untyped: the schema did not constrain this node.
    #[default]
    Any,
}

impl PropertyType {
    fn from_schema_name(name: &str) -> Self {
        match name {
            "string" => Self::String,
            "number" => Self::Number,
            "integer" => Self::Integer,
            "boolean" => Self::Boolean,
            "object" => Self::Object,
            "array" => Self::Array,
            "null" => Self::Null,
            // Unknown type names degrade to Any rather than failing the tool.
            _ => Self::Any,
        }
    }

    fn schema_name(self) -> Option<&'static str> {
        match self {
            Self::String => Some("string"),
            Self::Number => Some("number"),
            Self::Integer => Some("integer"),
            Self::Boolean => Some("boolean"),
            Self::Object => Some("object"),
            Self::Array => Some("array"),
            Self::Null => Some("null"),
            Self::Any => None,
        }
    }
}

/// One node of a tool parameter schema.
///
/// A populated `any_of` takes priority over `kind`: the node is then a union
/// of its options and `kind` is left at [`PropertyType::Any`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Property {
    /// Node type.
    pub kind: PropertyType,
    /// Human-readable description.
    pub description: Option<String>,
    /// Legal values for string nodes.
    pub enum_values: Option<Vec<String>>,
    /// Child nodes of an object.
    pub properties: Option<BTreeMap<String, Property>>,
    /// Required child names of an object.
    pub required: Option<Vec<String>>,
    /// Element schema of an array; always present for array nodes.
    pub items: Option<Box<Property>>,
    /// Union options; non-empty when this node is an `anyOf`.
    pub any_of: Option<Vec<Property>>,
}

impl Property {
    /// A bare node of the given type.
    pub fn new(kind: PropertyType) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }
}

/// The parameter schema of a tool; always an object at the top level.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolSchema {
    /// Parameters by name.
    pub properties: BTreeMap<String, Property>,
    /// Required parameter names.
    pub required: Vec<String>,
}

/// A server tool in the generic model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    /// Tool name; never empty.
    pub name: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// Parameter schema.
    pub schema: ToolSchema,
}

/// Convert a wire tool definition into the generic model.
pub fn convert_tool(tool: &Tool) -> Result<ToolDefinition> {
    if tool.name.trim().is_empty() {
        return Err(Error::validation("name", "tool name cannot be empty"));
    }
    if tool.input_schema.schema_type != "object" {
        return Err(Error::validation(
            "inputSchema",
            format!(
                "tool {:?} input schema type must be \"object\", got {:?}",
                tool.name, tool.input_schema.schema_type
            ),
        ));
    }

    let mut properties = BTreeMap::new();
    if let Some(raw) = &tool.input_schema.properties {
        for (name, value) in raw {
            properties.insert(name.clone(), convert_property(value)?);
        }
    }

    Ok(ToolDefinition {
        name: tool.name.clone(),
        description: tool.description.clone(),
        schema: ToolSchema {
            properties,
            required: tool.input_schema.required.clone().unwrap_or_default(),
        },
    })
}

/// Convert one schema node.
pub fn convert_property(value: &Value) -> Result<Property> {
    let Some(node) = value.as_object() else {
        return Err(Error::validation(
            "properties",
            format!("schema node is not an object: {value}"),
        ));
    };

    let description = node
        .get("description")
        .and_then(Value::as_str)
        .map(String::from);

    // anyOf wins over everything else on the node; the description (if any)
    // decorates the union itself.
    if let Some(any_of) = node.get("anyOf") {
        let options = any_of.as_array().ok_or_else(|| {
            Error::validation("anyOf", format!("anyOf is not an array: {any_of}"))
        })?;
        if !options.is_empty() {
            let mut converted = Vec::with_capacity(options.len());
            for option in options {
                match option {
                    // A full node, or a bare `{"type": ...}` pair.
                    Value::Object(_) => converted.push(convert_property(option)?),
                    // Some servers emit bare type-name strings.
                    Value::String(name) => {
                        converted.push(Property::new(PropertyType::from_schema_name(name)));
                    }
                    other => {
                        return Err(Error::validation(
                            "anyOf",
                            format!("unsupported anyOf option: {other}"),
                        ));
                    }
                }
            }
            return Ok(Property {
                description,
                any_of: Some(converted),
                ..Property::default()
            });
        }
    }

    let kind = match node.get("type") {
        Some(Value::String(name)) => PropertyType::from_schema_name(name),
        // Absent or non-string `type` means the node is unconstrained.
        _ => PropertyType::Any,
    };

    let mut property = Property::new(kind);
    property.description = description;

    match kind {
        PropertyType::String => {
            if let Some(raw) = node.get("enum") {
                let members = raw.as_array().ok_or_else(|| {
                    Error::validation("enum", format!("enum is not an array: {raw}"))
                })?;
                let mut values = Vec::with_capacity(members.len());
                for member in members {
                    let value = member.as_str().ok_or_else(|| {
                        Error::validation("enum", format!("non-string enum member: {member}"))
                    })?;
                    values.push(value.to_string());
                }
                property.enum_values = Some(values);
            }
        }
        PropertyType::Object => {
            if let Some(raw) = node.get("properties").and_then(Value::as_object) {
                let mut children = BTreeMap::new();
                for (name, child) in raw {
                    children.insert(name.clone(), convert_property(child)?);
                }
                property.properties = Some(children);
            }
            if let Some(raw) = node.get("required") {
                let members = raw.as_array().ok_or_else(|| {
                    Error::validation("required", format!("required is not an array: {raw}"))
                })?;
                let mut names = Vec::with_capacity(members.len());
                for member in members {
                    let name = member.as_str().ok_or_else(|| {
                        Error::validation(
                            "required",
                            format!("non-string required member: {member}"),
                        )
                    })?;
                    names.push(name.to_string());
                }
                property.required = Some(names);
            }
        }
        PropertyType::Array => {
            let items = node.get("items").ok_or_else(|| {
                Error::validation("items", "array property is missing its items schema")
            })?;
            property.items = Some(Box::new(convert_property(items)?));
        }
        _ => {}
    }

    Ok(property)
}

/// Re-encode one schema node to JSON Schema.
///
/// Inverse of [`convert_property`] over everything the generic model keeps:
/// type, description, enum membership, array item types, nested required
/// lists, and `anyOf` option order.
pub fn property_to_json(property: &Property) -> Value {
    let mut node = Map::new();
    if let Some(options) = &property.any_of {
        node.insert(
            "anyOf".to_string(),
            Value::Array(options.iter().map(property_to_json).collect()),
        );
    } else {
        if let Some(name) = property.kind.schema_name() {
            node.insert("type".to_string(), name.into());
        }
        if let Some(values) = &property.enum_values {
            node.insert(
                "enum".to_string(),
                Value::Array(values.iter().map(|v| v.as_str().into()).collect()),
            );
        }
        if let Some(children) = &property.properties {
            let mut raw = Map::new();
            for (name, child) in children {
                raw.insert(name.clone(), property_to_json(child));
            }
            node.insert("properties".to_string(), Value::Object(raw));
        }
        if let Some(names) = &property.required {
            node.insert(
                "required".to_string(),
                Value::Array(names.iter().map(|n| n.as_str().into()).collect()),
            );
        }
        if let Some(items) = &property.items {
            node.insert("items".to_string(), property_to_json(items));
        }
    }
    if let Some(description) = &property.description {
        node.insert("description".to_string(), description.as_str().into());
    }
    Value::Object(node)
}

/// Re-encode a tool schema to its JSON Schema object form.
pub fn schema_to_json(schema: &ToolSchema) -> Value {
    let mut properties = Map::new();
    for (name, property) in &schema.properties {
        properties.insert(name.clone(), property_to_json(property));
    }
    let mut node = Map::new();
    node.insert("type".to_string(), "object".into());
    node.insert("properties".to_string(), Value::Object(properties));
    if !schema.required.is_empty() {
        node.insert(
            "required".to_string(),
            Value::Array(schema.required.iter().map(|n| n.as_str().into()).collect()),
        );
    }
    Value::Object(node)
}

/// Convert a `tools/call` result into a generic tool-result message.
///
/// Every produced block carries `block_id`; adapters overwrite it with the
/// originating tool-call id. An empty result yields exactly one empty text
/// block so downstream consumers always see content.
pub fn convert_call_result(block_id: &str, result: &CallToolResult) -> Result<Message> {
    let mut blocks = Vec::with_capacity(result.content.len().max(1));

    for content in &result.content {
        blocks.push(convert_content_block(block_id, content)?);
    }
    if blocks.is_empty() {
        blocks.push(Block::text(block_id, ""));
    }

    Ok(Message::tool_result(blocks, result.is_error.unwrap_or(false)))
}

fn convert_content_block(block_id: &str, content: &ContentBlock) -> Result<Block> {
    match content {
        ContentBlock::Text(text) => Ok(Block::text(block_id, &text.text)),
        ContentBlock::Image(image) => {
            let mime_type = image.mime_type.clone().ok_or_else(|| {
                Error::validation("mimeType", "image content block is missing its mimeType")
            })?;
            Ok(Block {
                id: block_id.to_string(),
                block_type: BlockType::Content,
                modality: Modality::Image,
                mime_type,
                content: image.data.clone(),
                extra_fields: Default::default(),
            })
        }
        ContentBlock::Audio(audio) => {
            let mime_type = audio.mime_type.clone().ok_or_else(|| {
                Error::validation("mimeType", "audio content block is missing its mimeType")
            })?;
            Ok(Block {
                id: block_id.to_string(),
                block_type: BlockType::Content,
                modality: Modality::Audio,
                mime_type,
                content: audio.data.clone(),
                extra_fields: Default::default(),
            })
        }
        ContentBlock::Resource(resource) => {
            let mut block = match &resource.resource {
                ResourceContents::Text { mime_type, text, uri } => {
                    let mut block = Block::text(block_id, text);
                    if let Some(mime_type) = mime_type {
                        block.mime_type = mime_type.clone();
                    }
                    attach_uri(&mut block, uri.as_deref());
                    block
                }
                ResourceContents::Blob { mime_type, blob, uri } => {
                    let mut block = Block::text(block_id, blob);
                    block.mime_type = mime_type
                        .clone()
                        .unwrap_or_else(|| "application/octet-stream".to_string());
                    attach_uri(&mut block, uri.as_deref());
                    block
                }
                ResourceContents::Reference { uri } => {
                    let mut block = Block::text(block_id, format!("Resource: {uri}"));
                    attach_uri(&mut block, Some(uri));
                    block
                }
            };
            block.block_type = BlockType::Content;
            Ok(block)
        }
    }
}

fn attach_uri(block: &mut Block, uri: Option<&str>) {
    if let Some(uri) = uri {
        block
            .extra_fields
            .insert(RESOURCE_URI_FIELD.to_string(), uri.to_string());
    }
}
