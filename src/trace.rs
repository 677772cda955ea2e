//! Trace identifiers tying replies to the requests that caused them.
//!
//! A trace is 24 bytes: an 8 byte caller prefix (space padded or truncated)
//! followed by a 16 byte UUID v7. It travels as the message correlation id and
//! is rendered as 48 lowercase hex characters everywhere else.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Total identifier length in bytes
pub const TRACE_LEN: usize = 24;

/// Bytes reserved for the caller prefix
pub const PREFIX_LEN: usize = 8;

/// Length of the hex form
pub const TRACE_HEX_LEN: usize = TRACE_LEN * 2;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TraceParseError {
    #[error("trace must be 48 hex characters, got {0}")]
    Length(usize),
    #[error("trace is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Fixed-width correlation identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TraceId([u8; TRACE_LEN]);

impl TraceId {
    /// The all-zero trace carried by messages that belong to no interaction
    pub const ZERO: TraceId = TraceId([0; TRACE_LEN]);

    /// Generate a fresh trace with the given prefix.
    ///
    /// Identifiers from one process are time ordered and distinct even when
    /// generated within the same millisecond.
    pub fn generate(prefix: &str) -> Self {
        let mut bytes = [b' '; TRACE_LEN];
        let prefix = prefix.as_bytes();
        let len = prefix.len().min(PREFIX_LEN);
        bytes[..len].copy_from_slice(&prefix[..len]);
        bytes[PREFIX_LEN..].copy_from_slice(Uuid::now_v7().as_bytes());
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; TRACE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; TRACE_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// The 8 prefix bytes
    pub fn prefix(&self) -> &[u8] {
        &self.0[..PREFIX_LEN]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({})", self.to_hex())
    }
}

impl FromStr for TraceId {
    type Err = TraceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != TRACE_HEX_LEN {
            return Err(TraceParseError::Length(s.len()));
        }
        let mut bytes = [0u8; TRACE_LEN];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl From<[u8; TRACE_LEN]> for TraceId {
    fn from(bytes: [u8; TRACE_LEN]) -> Self {
        Self(bytes)
    }
}

impl Serialize for TraceId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TraceId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_pads_short_prefix() {
        let trace = TraceId::generate("ut");
        assert_eq!(trace.as_bytes().len(), TRACE_LEN);
        assert_eq!(trace.prefix(), b"ut      ");
        assert_eq!(trace.to_hex().len(), TRACE_HEX_LEN);
    }

    #[test]
    fn test_generate_truncates_long_prefix() {
        let trace = TraceId::generate("abcdefghijkl");
        assert_eq!(trace.prefix(), b"abcdefgh");
    }

    #[test]
    fn test_generate_empty_prefix() {
        let trace = TraceId::generate("");
        assert_eq!(trace.prefix(), b"        ");
        assert!(!trace.is_zero());
    }

    #[test]
    fn test_back_to_back_traces_differ() {
        let first = TraceId::generate("ut");
        let second = TraceId::generate("ut");
        assert_ne!(first, second);
        // UUID v7 tail keeps them time ordered
        assert!(first.as_bytes()[PREFIX_LEN..] < second.as_bytes()[PREFIX_LEN..]);
    }

    #[test]
    fn test_zero_trace() {
        assert!(TraceId::ZERO.is_zero());
        assert_eq!(TraceId::default(), TraceId::ZERO);
        assert_eq!(TraceId::ZERO.to_hex(), "0".repeat(TRACE_HEX_LEN));
    }

    #[test]
    fn test_parse_hex() {
        let trace = TraceId::generate("svc");
        let parsed: TraceId = trace.to_hex().parse().unwrap();
        assert_eq!(parsed, trace);

        assert_eq!(
            "abcd".parse::<TraceId>(),
            Err(TraceParseError::Length(4))
        );
        assert!(matches!(
            "zz".repeat(TRACE_LEN).parse::<TraceId>(),
            Err(TraceParseError::Hex(_))
        ));
    }

    #[test]
    fn test_serializes_as_hex_string() {
        let trace = TraceId::generate("ut");
        let json = serde_json::to_string(&trace).unwrap();
        assert_eq!(json, format!("\"{}\"", trace.to_hex()));
        let back: TraceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, trace);
    }
}
