//! Authorization-Code + PKCE flow pieces: the authorization URL and the
//! token exchange.

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use conduit_protocol::{Error, Result};

use crate::metadata::AuthServerMetadata;
use crate::pkce::{PKCE_METHOD, PkceChallenge};

/// A successful token response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The bearer token.
    pub access_token: String,
    /// Token type; `"Bearer"` in practice.
    pub token_type: String,
    /// Lifetime in seconds, when announced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// Refresh token; unused by this client but surfaced to callers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Granted scopes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Build the authorization URL the user must visit.
pub fn authorization_url(
    metadata: &AuthServerMetadata,
    client_id: &str,
    redirect_uri: &str,
    state: &str,
    pkce: &PkceChallenge,
    scopes: &[String],
) -> Result<String> {
    let mut url = Url::parse(&metadata.authorization_endpoint).map_err(|e| {
        Error::validation(
            "authorization_endpoint",
            format!("{}: {e}", metadata.authorization_endpoint),
        )
    })?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", state)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", PKCE_METHOD);
        if !scopes.is_empty() {
            query.append_pair("scope", &scopes.join(" "));
        }
    }
    Ok(url.into())
}

/// Exchange an authorization code for tokens.
pub async fn exchange_code(
    metadata: &AuthServerMetadata,
    client_id: &str,
    client_secret: Option<&str>,
    code: &str,
    redirect_uri: &str,
    pkce: &PkceChallenge,
    http: &reqwest::Client,
) -> Result<TokenResponse> {
    debug!(endpoint = %metadata.token_endpoint, "exchanging authorization code");

    let mut form: Vec<(&str, &str)> = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("code_verifier", &pkce.verifier),
        ("client_id", client_id),
    ];
    if let Some(secret) = client_secret {
        form.push(("client_secret", secret));
    }

    let response = http
        .post(&metadata.token_endpoint)
        .form(&form)
        .send()
        .await
        .map_err(|e| Error::transport("http", "token-exchange", e.to_string()))?;

    let status = response.status();
    if status.as_u16() != 200 {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Authentication(format!(
            "token exchange returned HTTP {status}: {body}"
        )));
    }
    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::Serialization(format!("invalid token response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_metadata() -> AuthServerMetadata {
        AuthServerMetadata {
            authorization_endpoint: "https://as.example.com/authorize".to_string(),
            token_endpoint: "https://as.example.com/token".to_string(),
            registration_endpoint: None,
            extra: HashMap::new(),
        }
    }

    #[test]
    fn authorization_url_carries_pkce_and_state() {
        let pkce = PkceChallenge::generate();
        let url = authorization_url(
            &test_metadata(),
            "client-1",
            "http://localhost:7777/callback",
            "xyzzy",
            &pkce,
            &["mcp:tools".to_string(), "mcp:resources".to_string()],
        )
        .unwrap();

        let parsed = Url::parse(&url).unwrap();
        let query: HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["client_id"], "client-1");
        assert_eq!(query["state"], "xyzzy");
        assert_eq!(query["code_challenge"], pkce.challenge);
        assert_eq!(query["code_challenge_method"], "S256");
        assert_eq!(query["scope"], "mcp:tools mcp:resources");
    }

    #[test]
    fn authorization_url_omits_empty_scope() {
        let pkce = PkceChallenge::generate();
        let url = authorization_url(
            &test_metadata(),
            "client-1",
            "http://localhost:7777/callback",
            "s",
            &pkce,
            &[],
        )
        .unwrap();
        assert!(!url.contains("scope="));
    }
}
