//! # Conduit Auth
//!
//! OAuth 2.1 helpers for MCP servers behind authenticated HTTP endpoints:
//! authorization-server metadata discovery (RFC 8414), dynamic client
//! registration (RFC 7591), PKCE (RFC 7636), and the Authorization-Code
//! token exchange.
//!
//! These are building blocks, not a flow engine. The expected caller
//! sequence on an [`Error::Authentication`] from an HTTP transport:
//! discover (or synthesize) the server metadata, register a client, send
//! the user through the authorization URL, exchange the returned code, and
//! reconnect the transport with a bearer token. Token refresh is out of
//! scope.
//!
//! [`Error::Authentication`]: conduit_protocol::Error::Authentication

pub mod flow;
pub mod metadata;
pub mod pkce;
pub mod registration;

pub use flow::{TokenResponse, authorization_url, exchange_code};
pub use metadata::{AuthServerMetadata, discover_metadata, fallback_metadata};
pub use pkce::{PKCE_METHOD, PkceChallenge};
pub use registration::{ClientRegistration, register_client};
