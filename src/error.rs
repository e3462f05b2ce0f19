use crate::sdk::SessionState;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Error frame reported by the recognition server.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerError {
    /// Provider-defined failure code from the frame body.
    pub code: u32,
    /// Message text, if the frame carried a payload.
    pub message: Option<String>,
    /// Structured payload when the frame declared JSON serialization.
    pub detail: Option<serde_json::Value>,
}

/// Broad class of a [`DecodeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    Framing,
    Decompression,
    Deserialization,
}

/// Failure to parse one inbound frame.
///
/// Every variant is fatal for the session that produced the frame: the
/// protocol has no resynchronization point.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("frame truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    #[error("invalid header size {0}")]
    InvalidHeaderSize(u8),

    #[error("unknown serialization method {0:#x}")]
    UnknownSerialization(u8),

    #[error("unknown compression method {0:#x}")]
    UnknownCompression(u8),

    #[error("declared payload length {declared} does not match actual {actual}")]
    LengthMismatch { declared: u32, actual: usize },

    #[error("failed to decompress payload: {0}")]
    Decompression(#[source] std::io::Error),

    #[error("payload is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),
}

impl DecodeError {
    #[must_use]
    pub const fn kind(&self) -> DecodeErrorKind {
        match self {
            Self::Decompression(_) => DecodeErrorKind::Decompression,
            Self::Malformed(_) => DecodeErrorKind::Deserialization,
            _ => DecodeErrorKind::Framing,
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP protocol error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse or serialize JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Header error: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Recognition server error {}: {}", .0.code, .0.message.as_deref().unwrap_or("<no message>"))]
    Api(ServerError),

    #[error("Payload of {0} bytes does not fit the 32-bit length field")]
    PayloadTooLarge(usize),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("The connection was closed unexpectedly")]
    ConnectionClosed,

    #[error("The caller stopped listening")]
    Cancelled,

    #[error("Invalid session transition from {from:?} to {to:?}")]
    InvalidState { from: SessionState, to: SessionState },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Recognition task failed with status {code}: {message}")]
    TaskFailed { code: String, message: String },
}

impl Error {
    /// Whether the error came from the socket rather than from frame contents.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::WebSocket(_) | Self::Io(_) | Self::Timeout(_) | Self::ConnectionClosed
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_kinds() {
        let truncated = DecodeError::Truncated { needed: 4, available: 1 };
        assert_eq!(truncated.kind(), DecodeErrorKind::Framing);

        let io = std::io::Error::new(std::io::ErrorKind::InvalidData, "bad gzip");
        assert_eq!(DecodeError::Decompression(io).kind(), DecodeErrorKind::Decompression);

        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(DecodeError::Malformed(json).kind(), DecodeErrorKind::Deserialization);
    }

    #[test]
    fn api_error_display_includes_code() {
        let err = Error::Api(ServerError {
            code: 45_000_001,
            message: Some("invalid params".to_string()),
            detail: None,
        });
        let text = err.to_string();
        assert!(text.contains("45000001"));
        assert!(text.contains("invalid params"));
        assert!(!err.is_transport());
        assert!(Error::ConnectionClosed.is_transport());
    }
}
