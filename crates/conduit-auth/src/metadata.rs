//! Authorization-server metadata discovery (RFC 8414).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use conduit_protocol::{Error, Result};

/// Well-known discovery path on the server origin.
const WELL_KNOWN_PATH: &str = "/.well-known/oauth-authorization-server";

/// Authorization-server metadata, as served from the well-known endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthServerMetadata {
    /// Authorization endpoint URL.
    pub authorization_endpoint: String,
    /// Token endpoint URL.
    pub token_endpoint: String,
    /// Dynamic registration endpoint, when the server offers one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    /// Everything else the server advertised.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn origin_of(server_url: &str) -> Result<Url> {
    let mut url = Url::parse(server_url)
        .map_err(|e| Error::validation("server_url", format!("{server_url}: {e}")))?;
    url.set_path("");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Fetch authorization-server metadata from the server's well-known URL.
///
/// Requires HTTP 200; anything else fails. The `MCP-Protocol-Version`
/// header is attached so servers can vary their answer by protocol date.
pub async fn discover_metadata(
    server_url: &str,
    protocol_version: &str,
    http: &reqwest::Client,
) -> Result<AuthServerMetadata> {
    let discovery_url = origin_of(server_url)?
        .join(WELL_KNOWN_PATH)
        .map_err(|e| Error::validation("server_url", e.to_string()))?;
    debug!(url = %discovery_url, "discovering authorization server metadata");

    let response = http
        .get(discovery_url.clone())
        .header("MCP-Protocol-Version", protocol_version)
        .send()
        .await
        .map_err(|e| Error::transport("http", "discover", e.to_string()))?;

    let status = response.status();
    if status.as_u16() != 200 {
        return Err(Error::Authentication(format!(
            "metadata discovery at {discovery_url} returned HTTP {status}"
        )));
    }
    response
        .json::<AuthServerMetadata>()
        .await
        .map_err(|e| Error::Serialization(format!("invalid server metadata: {e}")))
}

/// Synthesize metadata for servers without a discovery document, placing the
/// standard endpoints at the server origin.
pub fn fallback_metadata(server_url: &str) -> Result<AuthServerMetadata> {
    let origin = origin_of(server_url)?;
    let endpoint = |path: &str| -> Result<String> {
        origin
            .join(path)
            .map(String::from)
            .map_err(|e| Error::validation("server_url", e.to_string()))
    };
    Ok(AuthServerMetadata {
        authorization_endpoint: endpoint("/authorize")?,
        token_endpoint: endpoint("/token")?,
        registration_endpoint: Some(endpoint("/register")?),
        extra: HashMap::new(),
    })
}
