//! OAuth 2.0 Dynamic Client Registration (RFC 7591).

use serde::{Deserialize, Serialize};
use tracing::debug;

use conduit_protocol::{Error, Result};

#[derive(Debug, Serialize)]
struct RegistrationRequest<'a> {
    client_name: &'a str,
    redirect_uris: &'a [String],
}

/// A registered client as returned by the authorization server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRegistration {
    /// Issued client identifier.
    pub client_id: String,
    /// Issued client secret; absent for public clients.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Redirect URIs the registration covers.
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    /// Echoed client name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
}

/// Register a client with the authorization server.
///
/// Accepts HTTP 200 or 201 (servers disagree on which fits RFC 7591
/// better).
pub async fn register_client(
    registration_endpoint: &str,
    redirect_uris: &[String],
    client_name: &str,
    http: &reqwest::Client,
) -> Result<ClientRegistration> {
    if redirect_uris.is_empty() {
        return Err(Error::validation(
            "redirect_uris",
            "at least one redirect URI is required",
        ));
    }
    debug!(endpoint = registration_endpoint, "registering OAuth client");

    let response = http
        .post(registration_endpoint)
        .json(&RegistrationRequest {
            client_name,
            redirect_uris,
        })
        .send()
        .await
        .map_err(|e| Error::transport("http", "register", e.to_string()))?;

    let status = response.status();
    if !matches!(status.as_u16(), 200 | 201) {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Authentication(format!(
            "client registration returned HTTP {status}: {body}"
        )));
    }
    response
        .json::<ClientRegistration>()
        .await
        .map_err(|e| Error::Serialization(format!("invalid registration response: {e}")))
}
