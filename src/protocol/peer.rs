//! Encoders for server-originated frames.
//!
//! The client never sends these; they exist so that test doubles and local
//! relays can speak the server side of the protocol.

use crate::error::Result;
use crate::protocol::compression::gzip_compress;
use crate::protocol::frame::assemble;
use crate::protocol::header::{Compression, MessageType, Serialization, encode_header, flags};
use serde_json::Value;

const fn response_flags(sequence: Option<i32>, is_final: bool) -> u8 {
    let mut type_flags = flags::NONE;
    if sequence.is_some() {
        type_flags |= flags::SEQUENCE;
    }
    if is_final {
        type_flags |= flags::FINAL;
    }
    type_flags
}

/// Full server response with a gzip-compressed JSON body.
///
/// # Errors
/// Returns an error if the body cannot be serialized or compressed.
pub fn build_server_response(body: &Value, sequence: Option<i32>, is_final: bool) -> Result<Vec<u8>> {
    let compressed = gzip_compress(&serde_json::to_vec(body)?)?;
    let header = encode_header(
        MessageType::FullServerResponse,
        response_flags(sequence, is_final),
        Serialization::Json,
        Compression::Gzip,
        0,
    );
    assemble(header, sequence, &[], &compressed)
}

/// Server ack for `ack_sequence`, optionally carrying a JSON body.
///
/// # Errors
/// Returns an error if the body cannot be serialized or compressed.
pub fn build_server_ack(
    ack_sequence: i32,
    sequence: Option<i32>,
    body: Option<&Value>,
    is_final: bool,
) -> Result<Vec<u8>> {
    let type_flags = response_flags(sequence, is_final);
    let Some(body) = body else {
        let header = encode_header(MessageType::ServerAck, type_flags, Serialization::None, Compression::None, 0);
        let mut frame = header.to_vec();
        if let Some(seq) = sequence {
            frame.extend_from_slice(&seq.to_be_bytes());
        }
        frame.extend_from_slice(&ack_sequence.to_be_bytes());
        return Ok(frame);
    };

    let compressed = gzip_compress(&serde_json::to_vec(body)?)?;
    let header = encode_header(MessageType::ServerAck, type_flags, Serialization::Json, Compression::Gzip, 0);
    assemble(header, sequence, &ack_sequence.to_be_bytes(), &compressed)
}

/// Server error response with a plain JSON body `{"error": message}`.
///
/// # Errors
/// Returns an error if the body cannot be serialized.
pub fn build_server_error(code: u32, message: &str) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(&serde_json::json!({ "error": message }))?;
    let header = encode_header(
        MessageType::ServerErrorResponse,
        flags::NONE,
        Serialization::Json,
        Compression::None,
        0,
    );
    assemble(header, None, &code.to_be_bytes(), &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::{Payload, decode_frame};
    use serde_json::json;

    #[test]
    fn server_response_decodes() {
        let body = json!({ "result": { "text": "hi" } });
        let frame = build_server_response(&body, Some(3), false).unwrap();
        let parsed = decode_frame(&frame).unwrap();
        assert_eq!(parsed.message_type(), MessageType::FullServerResponse);
        assert_eq!(parsed.sequence, Some(3));
        assert!(!parsed.is_last_package);
        assert_eq!(parsed.payload, Some(Payload::Json(body)));
    }

    #[test]
    fn ack_without_body_decodes() {
        let frame = build_server_ack(-4, Some(-4), None, true).unwrap();
        let parsed = decode_frame(&frame).unwrap();
        assert_eq!(parsed.sequence, Some(-4));
        assert_eq!(parsed.ack_sequence, Some(-4));
        assert!(parsed.is_last_package);
        assert_eq!(parsed.payload, None);
    }

    #[test]
    fn ack_with_body_decodes() {
        let body = json!({ "result": { "text": "partial" } });
        let frame = build_server_ack(2, None, Some(&body), false).unwrap();
        let parsed = decode_frame(&frame).unwrap();
        assert_eq!(parsed.sequence, None);
        assert_eq!(parsed.ack_sequence, Some(2));
        assert_eq!(parsed.text().as_deref(), Some("partial"));
    }

    #[test]
    fn server_error_decodes() {
        let frame = build_server_error(45_000_002, "empty audio").unwrap();
        let parsed = decode_frame(&frame).unwrap();
        let err = parsed.server_error().unwrap();
        assert_eq!(err.code, 45_000_002);
        assert_eq!(err.message.as_deref(), Some("empty audio"));
    }
}
