//! Content blocks carried by tool-call and prompt results.
//!
//! Image and audio blocks keep `mimeType` optional at this layer; the bridge
//! in the client crate enforces its presence so the failure is reported as a
//! conversion error rather than a frame-level decode failure.

use serde::{Deserialize, Serialize};

/// One block of a tool-call or prompt result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    /// Plain text.
    #[serde(rename = "text")]
    Text(TextContent),
    /// Base64-encoded image data.
    #[serde(rename = "image")]
    Image(ImageContent),
    /// Base64-encoded audio data.
    #[serde(rename = "audio")]
    Audio(AudioContent),
    /// An embedded resource.
    #[serde(rename = "resource")]
    Resource(EmbeddedResource),
}

/// Text content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    /// The text itself.
    pub text: String,
}

/// Image content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageContent {
    /// Base64-encoded image bytes, preserved verbatim.
    pub data: String,
    /// Image MIME type; mandatory per the protocol, validated by the bridge.
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Audio content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioContent {
    /// Base64-encoded audio bytes, preserved verbatim.
    pub data: String,
    /// Audio MIME type; mandatory per the protocol, validated by the bridge.
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// An embedded resource block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedResource {
    /// The resource contents.
    pub resource: ResourceContents,
}

/// Resource contents: text, binary, or a bare reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceContents {
    /// Text resource.
    Text {
        /// Resource URI.
        #[serde(skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
        /// MIME type, when known.
        #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        /// The text content.
        text: String,
    },
    /// Binary resource.
    Blob {
        /// Resource URI.
        #[serde(skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
        /// MIME type, when known.
        #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        /// Base64-encoded bytes.
        blob: String,
    },
    /// Only a URI was provided.
    Reference {
        /// Resource URI.
        uri: String,
    },
}
