use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};

/// Identifies one recorded session (a trace) in the upstream collector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceKey(String);

/// Opaque pagination token handed back by a span source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl TraceKey {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(TraceError::InvalidArgument(
                "trace key cannot be empty".to_string(),
            ));
        }
        if trimmed.contains('/') {
            return Err(TraceError::InvalidArgument(format!(
                "invalid trace key: {input}"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trace_keys() {
        let key = TraceKey::parse("  call-42 ").unwrap();
        assert_eq!(key.as_str(), "call-42");
        assert_eq!(key.to_string(), "call-42");
    }

    #[test]
    fn rejects_bad_trace_keys() {
        assert!(TraceKey::parse("").is_err());
        assert!(TraceKey::parse("   ").is_err());
        assert!(TraceKey::parse("a/b").is_err());
    }

    #[test]
    fn bad_trace_key_is_an_invalid_argument() {
        assert!(matches!(
            TraceKey::parse(" "),
            Err(TraceError::InvalidArgument(_))
        ));
        assert!(matches!(
            TraceKey::parse("a/b"),
            Err(TraceError::InvalidArgument(_))
        ));
    }

    #[test]
    fn cursor_serializes_as_plain_string() {
        let cursor = Cursor::new("17");
        assert_eq!(serde_json::to_string(&cursor).unwrap(), "\"17\"");
    }
}
