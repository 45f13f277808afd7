//! Logging control types.

use serde::{Deserialize, Serialize};

/// Syslog-style severity levels accepted by `logging/setLevel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    /// Detailed debugging information.
    Debug,
    /// Normal operational messages.
    Info,
    /// Normal but significant events.
    Notice,
    /// Warning conditions.
    Warning,
    /// Error conditions.
    Error,
    /// Critical conditions.
    Critical,
    /// Action must be taken immediately.
    Alert,
    /// System is unusable.
    Emergency,
}

/// Parameters of `logging/setLevel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLevelRequest {
    /// Minimum level the server should emit.
    pub level: LoggingLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&LoggingLevel::Warning).unwrap(),
            "\"warning\""
        );
        let level: LoggingLevel = serde_json::from_str("\"emergency\"").unwrap();
        assert_eq!(level, LoggingLevel::Emergency);
    }
}
