//! Protocol version dates.
//!
//! MCP protocol versions are dates in `YYYY-MM-DD` form. A server version is
//! acceptable when it is not newer than the client's.

use std::fmt;

use chrono::NaiveDate;

use crate::error::{Error, Result};

/// The protocol date this client advertises (Streamable HTTP era).
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// The protocol date of the legacy HTTP+SSE transport.
pub const LEGACY_PROTOCOL_VERSION: &str = "2024-11-05";

/// A parsed protocol version, ordered by date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProtocolVersion(NaiveDate);

impl ProtocolVersion {
    /// Parse a `YYYY-MM-DD` protocol date.
    pub fn parse(s: &str) -> Result<Self> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| {
                Error::validation(
                    "protocolVersion",
                    format!("not a YYYY-MM-DD date: {s:?}"),
                )
            })
    }

    /// The version this client speaks.
    pub fn current() -> Self {
        Self::parse(PROTOCOL_VERSION).expect("PROTOCOL_VERSION is a valid date")
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_dates() {
        let legacy = ProtocolVersion::parse(LEGACY_PROTOCOL_VERSION).unwrap();
        let current = ProtocolVersion::current();
        assert!(legacy < current);
        assert_eq!(current, ProtocolVersion::parse("2025-03-26").unwrap());
    }

    #[test]
    fn rejects_garbage() {
        assert!(ProtocolVersion::parse("latest").is_err());
        assert!(ProtocolVersion::parse("2025-13-01").is_err());
        assert!(ProtocolVersion::parse("").is_err());
    }

    #[test]
    fn displays_canonical_form() {
        let v = ProtocolVersion::parse("2024-11-05").unwrap();
        assert_eq!(v.to_string(), "2024-11-05");
    }
}
