//! Tool-schema bridge tests: MCP schemas into the generic Property tree and
//! tool-call results into generic messages.

use pretty_assertions::assert_eq;
use serde_json::json;

use conduit_client::{
    Modality, Property, PropertyType, convert_call_result, convert_property, convert_tool,
    property_to_json, schema_to_json,
};
use conduit_client::bridge::RESOURCE_URI_FIELD;
use conduit_protocol::Error;
use conduit_protocol::types::{CallToolResult, Tool};

fn tool_from_json(raw: serde_json::Value) -> Tool {
    serde_json::from_value(raw).unwrap()
}

fn call_result(raw: serde_json::Value) -> CallToolResult {
    serde_json::from_value(raw).unwrap()
}

#[test]
fn nested_any_of_survives_conversion() {
    // The `comments.items.position` shape: a number-or-null union inside an
    // object inside an array.
    let tool = tool_from_json(json!({
        "name": "add_comments",
        "description": "Attach review comments",
        "inputSchema": {
            "type": "object",
            "properties": {
                "comments": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "position": {
                                "anyOf": [{"type": "number"}, {"type": "null"}],
                                "description": "Line position, or null for file-level"
                            }
                        },
                        "required": ["position"]
                    }
                }
            },
            "required": ["comments"]
        }
    }));

    let definition = convert_tool(&tool).unwrap();
    assert_eq!(definition.name, "add_comments");
    assert_eq!(definition.schema.required, vec!["comments".to_string()]);

    let comments = &definition.schema.properties["comments"];
    assert_eq!(comments.kind, PropertyType::Array);

    let item = comments.items.as_deref().unwrap();
    assert_eq!(item.kind, PropertyType::Object);
    assert_eq!(item.required.as_deref(), Some(&["position".to_string()][..]));

    let position = &item.properties.as_ref().unwrap()["position"];
    let options = position.any_of.as_deref().unwrap();
    assert_eq!(options.len(), 2);
    assert_eq!(options[0].kind, PropertyType::Number);
    assert_eq!(options[1].kind, PropertyType::Null);
    assert_eq!(
        position.description.as_deref(),
        Some("Line position, or null for file-level")
    );
}

#[test]
fn any_of_accepts_bare_string_options() {
    let property = convert_property(&json!({
        "anyOf": ["string", {"type": "integer"}]
    }))
    .unwrap();
    let options = property.any_of.as_deref().unwrap();
    assert_eq!(options[0].kind, PropertyType::String);
    assert_eq!(options[1].kind, PropertyType::Integer);
}

#[test]
fn any_of_rejects_numeric_options() {
    let err = convert_property(&json!({"anyOf": [42]})).unwrap_err();
    assert!(matches!(err, Error::Validation { field: "anyOf", .. }));
}

#[test]
fn missing_and_unknown_types_degrade_to_any() {
    assert_eq!(
        convert_property(&json!({"description": "untyped"})).unwrap().kind,
        PropertyType::Any
    );
    assert_eq!(
        convert_property(&json!({"type": "tuple"})).unwrap().kind,
        PropertyType::Any
    );
}

#[test]
fn string_enum_members_must_be_strings() {
    let ok = convert_property(&json!({"type": "string", "enum": ["a", "b"]})).unwrap();
    assert_eq!(
        ok.enum_values.as_deref(),
        Some(&["a".to_string(), "b".to_string()][..])
    );

    let err = convert_property(&json!({"type": "string", "enum": ["a", 1]})).unwrap_err();
    assert!(matches!(err, Error::Validation { field: "enum", .. }));
}

#[test]
fn arrays_require_an_items_schema() {
    let err = convert_property(&json!({"type": "array"})).unwrap_err();
    assert!(matches!(err, Error::Validation { field: "items", .. }));
}

#[test]
fn non_object_input_schema_is_rejected() {
    let tool = tool_from_json(json!({
        "name": "broken",
        "inputSchema": {"type": "string"}
    }));
    let err = convert_tool(&tool).unwrap_err();
    assert!(matches!(err, Error::Validation { field: "inputSchema", .. }));
}

#[test]
fn empty_tool_name_is_rejected() {
    let tool = tool_from_json(json!({
        "name": "  ",
        "inputSchema": {"type": "object"}
    }));
    assert!(convert_tool(&tool).is_err());
}

#[test]
fn schema_roundtrip_preserves_structure() {
    let original = json!({
        "type": "object",
        "properties": {
            "mode": {
                "type": "string",
                "enum": ["fast", "thorough"],
                "description": "Search mode"
            },
            "filters": {
                "type": "object",
                "properties": {
                    "tags": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["tags"]
            },
            "position": {
                "anyOf": [{"type": "number"}, {"type": "null"}]
            }
        },
        "required": ["mode"]
    });

    let tool = tool_from_json(json!({"name": "search", "inputSchema": original}));
    let definition = convert_tool(&tool).unwrap();
    let reencoded = schema_to_json(&definition.schema);

    assert_eq!(reencoded["type"], json!("object"));
    assert_eq!(reencoded["required"], json!(["mode"]));
    assert_eq!(
        reencoded["properties"]["mode"],
        json!({"type": "string", "enum": ["fast", "thorough"], "description": "Search mode"})
    );
    assert_eq!(
        reencoded["properties"]["filters"]["properties"]["tags"],
        json!({"type": "array", "items": {"type": "string"}})
    );
    assert_eq!(
        reencoded["properties"]["filters"]["required"],
        json!(["tags"])
    );
    // Option order is preserved.
    assert_eq!(
        reencoded["properties"]["position"]["anyOf"],
        json!([{"type": "number"}, {"type": "null"}])
    );
}

#[test]
fn any_nodes_reencode_without_a_type() {
    let reencoded = property_to_json(&Property::new(PropertyType::Any));
    assert_eq!(reencoded, json!({}));
}

#[test]
fn image_blocks_require_a_mime_type() {
    let missing = call_result(json!({
        "content": [{"type": "image", "data": "aGVsbG8="}],
        "isError": false
    }));
    let err = convert_call_result("call-1", &missing).unwrap_err();
    assert!(err.to_string().contains("mimeType"));

    let with_mime = call_result(json!({
        "content": [{"type": "image", "data": "aGVsbG8=", "mimeType": "image/png"}],
        "isError": false
    }));
    let message = convert_call_result("call-1", &with_mime).unwrap();
    assert_eq!(message.blocks.len(), 1);
    assert_eq!(message.blocks[0].modality, Modality::Image);
    assert_eq!(message.blocks[0].mime_type, "image/png");
    assert_eq!(message.blocks[0].content, "aGVsbG8=");
    assert!(!message.tool_result_error);
}

#[test]
fn audio_blocks_follow_the_same_mime_rule() {
    let missing = call_result(json!({
        "content": [{"type": "audio", "data": "c291bmQ="}]
    }));
    assert!(convert_call_result("call-1", &missing).is_err());
}

#[test]
fn block_count_is_preserved_and_empty_content_yields_one_text_block() {
    let three = call_result(json!({
        "content": [
            {"type": "text", "text": "a"},
            {"type": "text", "text": "b"},
            {"type": "image", "data": "xyz", "mimeType": "image/jpeg"}
        ],
        "isError": true
    }));
    let message = convert_call_result("call-9", &three).unwrap();
    assert_eq!(message.blocks.len(), 3);
    assert!(message.tool_result_error);
    assert!(message.blocks.iter().all(|b| b.id == "call-9"));

    let empty = call_result(json!({"content": []}));
    let message = convert_call_result("call-9", &empty).unwrap();
    assert_eq!(message.blocks.len(), 1);
    assert_eq!(message.blocks[0].content, "");
    assert_eq!(message.blocks[0].modality, Modality::Text);
    assert!(!message.tool_result_error);
}

#[test]
fn resource_blocks_carry_their_uri_as_a_side_channel() {
    let result = call_result(json!({
        "content": [
            {"type": "resource", "resource": {"uri": "file:///a.txt", "mimeType": "text/markdown", "text": "# hi"}},
            {"type": "resource", "resource": {"uri": "file:///b.bin", "blob": "AAAA"}},
            {"type": "resource", "resource": {"uri": "file:///c"}}
        ]
    }));
    let message = convert_call_result("call-2", &result).unwrap();

    assert_eq!(message.blocks[0].content, "# hi");
    assert_eq!(message.blocks[0].mime_type, "text/markdown");
    assert_eq!(
        message.blocks[0].extra_fields[RESOURCE_URI_FIELD],
        "file:///a.txt"
    );

    assert_eq!(message.blocks[1].content, "AAAA");
    assert_eq!(message.blocks[1].mime_type, "application/octet-stream");

    assert_eq!(message.blocks[2].content, "Resource: file:///c");
    assert_eq!(
        message.blocks[2].extra_fields[RESOURCE_URI_FIELD],
        "file:///c"
    );
}
