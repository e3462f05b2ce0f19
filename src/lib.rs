#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

pub mod config;
pub mod error;
pub mod protocol;
pub mod sdk;
pub mod transport;

pub use config::Credentials;
pub use error::{DecodeError, DecodeErrorKind, Error, Result, ServerError};
pub use protocol::models::{
    AudioCodec, AudioInfo, AudioParams, ContainerFormat, ControlRequest, Corpus,
    RecognitionOptions, RecognitionResponse, RecognitionResult, UserInfo, Utterance, Word,
};
pub use protocol::{
    Compression, FrameHeader, MessageType, ParsedFrame, Payload, Serialization,
    build_audio_frame, build_control_frame, decode_frame, encode_header, encode_sequence,
};
pub use sdk::{
    RecognitionSession, RecognitionStream, Recognizer, RecognizerBuilder, SessionSettings,
    SessionState, Transport,
};
pub use transport::rest::{AudioFileRequest, FileRecognitionAdapter, QueryOutcome, TaskHandle};

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use transport::ws::WsStream;

const TRACE_LOG_MAX_BYTES: usize = 1024;
const TRACE_TRUNCATE_SUFFIX: &str = "... (truncated)";

/// Low-level frame client over the recognition socket.
///
/// Thread safety: `SaucClient` is `Send` but not `Sync` because the underlying
/// WebSocket stream is not `Sync`.
#[must_use]
pub struct SaucClient {
    stream: WsStream,
}

impl SaucClient {
    /// Connect to the streaming recognition endpoint.
    ///
    /// # Errors
    /// Returns an error if the connection fails or if the URL is invalid.
    pub async fn connect(url: &str, credentials: &Credentials, session_id: &str) -> Result<Self> {
        let stream = transport::ws::connect(url, credentials, session_id).await?;
        Ok(Self { stream })
    }

    /// Send one encoded frame as a single binary message.
    ///
    /// # Errors
    /// Returns an error if the WebSocket send fails.
    pub async fn send_frame(&mut self, frame: Vec<u8>) -> Result<()> {
        tracing::trace!(len = frame.len(), "Sending frame");
        self.stream.send(Message::Binary(frame.into())).await?;
        Ok(())
    }

    /// Receive the next binary frame, answering pings on the way.
    ///
    /// # Errors
    /// Returns an error if the WebSocket fails or the server sends text.
    pub async fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        while let Some(msg) = self.stream.next().await {
            match msg? {
                Message::Binary(bytes) => {
                    tracing::trace!(len = bytes.len(), "Received frame");
                    return Ok(Some(bytes.to_vec()));
                }
                Message::Text(text) => {
                    return Err(Error::ProtocolViolation(format!(
                        "unexpected text message: {}",
                        safe_truncate(&text, TRACE_LOG_MAX_BYTES)
                    )));
                }
                Message::Close(_) => {
                    tracing::info!("WebSocket connection closed by server");
                    return Ok(None);
                }
                Message::Ping(payload) => {
                    tracing::debug!("Received Ping, sending Pong");
                    self.stream.send(Message::Pong(payload)).await?;
                }
                _ => (),
            }
        }
        Ok(None)
    }

    /// Close the socket.
    ///
    /// # Errors
    /// Returns an error if the close handshake cannot be sent.
    pub async fn close(&mut self) -> Result<()> {
        self.stream.close().await?;
        Ok(())
    }
}

pub(crate) fn safe_truncate(s: &str, max_bytes: usize) -> std::borrow::Cow<'_, str> {
    if s.len() <= max_bytes {
        return std::borrow::Cow::Borrowed(s);
    }

    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    std::borrow::Cow::Owned(format!(
        "{} {} {} bytes",
        &s[..end],
        TRACE_TRUNCATE_SUFFIX,
        s.len() - end
    ))
}

pub(crate) fn trace_json(value: &serde_json::Value) -> String {
    safe_truncate(&value.to_string(), TRACE_LOG_MAX_BYTES).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "语音识别".repeat(10);
        let out = safe_truncate(&text, 4);
        assert!(out.starts_with('语'));
        assert!(out.contains(TRACE_TRUNCATE_SUFFIX));
        assert_eq!(safe_truncate("short", 16), "short");
    }
}
