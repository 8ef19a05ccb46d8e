//! Error types for the relay.

use thiserror::Error;

/// Relay error type.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Redis connection or operation error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reply envelope could not be built
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Unexpected reply shape from the stream server
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The work queue was closed while the reader still had entries
    #[error("Work queue closed")]
    QueueClosed,
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// Why a stream entry could not be turned into a request.
///
/// Every variant names the offending field so log lines point at the
/// producer's mistake directly.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("missing field `{0}`")]
    Missing(&'static str),

    #[error("field `{0}` is not valid UTF-8 text")]
    NotText(&'static str),

    #[error("field `{field}` holds invalid JSON: {source} : {raw}")]
    InvalidJson {
        field: &'static str,
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("field `deadline` is not an integer: {raw}")]
    InvalidDeadline {
        raw: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

impl ParseError {
    /// Name of the field that failed to parse.
    pub fn field(&self) -> &'static str {
        match self {
            ParseError::Missing(field) | ParseError::NotText(field) => field,
            ParseError::InvalidJson { field, .. } => field,
            ParseError::InvalidDeadline { .. } => "deadline",
        }
    }
}

/// Reply envelope serialization failure.
#[derive(Error, Debug)]
#[error("failed to serialize reply for rpc `{rpc}`: {source}")]
pub struct CodecError {
    pub rpc: String,
    #[source]
    pub source: serde_json::Error,
}

/// Error returned by an [`RpcHandler`](crate::RpcHandler).
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The handler does not serve this rpc name
    #[error("Unknown rpc: {0}")]
    UnknownRpc(String),

    /// Arguments were present but unusable
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    /// Backing store failed
    #[error("Store error: {0}")]
    Store(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_names_field() {
        assert_eq!(ParseError::Missing("who").field(), "who");
        assert_eq!(ParseError::NotText("rpc").field(), "rpc");

        let source = "abc".parse::<i64>().unwrap_err();
        let err = ParseError::InvalidDeadline {
            raw: "abc".to_string(),
            source,
        };
        assert_eq!(err.field(), "deadline");
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_handler_error_display() {
        let err = HandlerError::UnknownRpc("ping".to_string());
        assert_eq!(err.to_string(), "Unknown rpc: ping");
    }
}
