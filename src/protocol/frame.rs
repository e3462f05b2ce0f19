//! Frame assembly and parsing.
//!
//! ```text
//! ┌────────┬─────────────┬──────────────────────┬─────────┐
//! │ header │ sequence?   │ declared length?     │ payload │
//! │ 4 bytes│ i32 BE      │ u32 BE (per type)    │         │
//! └────────┴─────────────┴──────────────────────┴─────────┘
//! ```
//!
//! Body layout after the optional sequence, by message type:
//!
//! * full client request, audio-only request, full server response:
//!   `[length:4][payload]`
//! * server ack: `[ack_sequence:4]?[length:4 payload]?`, each part present
//!   only when enough bytes remain
//! * server error response: `[error_code:4][length:4][payload]`
//! * anything else: ignored
//!
//! A declared length that disagrees with the bytes that follow is a
//! framing error.

use crate::error::{DecodeError, Error, Result, ServerError};
use crate::protocol::compression::{gzip_compress, gzip_decompress};
use crate::protocol::header::{
    Compression, FrameHeader, MessageType, Serialization, encode_header, flags,
};
use crate::protocol::models::{ControlRequest, RecognitionResponse};
use serde_json::Value;

const SEQUENCE_LEN: usize = 4;
const LENGTH_LEN: usize = 4;

/// Big-endian two's-complement encoding of a sequence number.
#[must_use]
pub const fn encode_sequence(seq: i32) -> [u8; SEQUENCE_LEN] {
    seq.to_be_bytes()
}

/// Read a sequence number from the first four bytes of `buf`.
///
/// # Errors
/// Returns [`DecodeError::Truncated`] if fewer than four bytes are given.
pub fn decode_sequence(buf: &[u8]) -> std::result::Result<i32, DecodeError> {
    Cursor::new(buf).read_i32()
}

/// Assemble `header + [sequence] + length + payload` in one buffer.
///
/// `payload` is already compressed; the length prefix is taken from it.
pub(crate) fn assemble(
    header: [u8; 4],
    sequence: Option<i32>,
    prefix: &[u8],
    payload: &[u8],
) -> Result<Vec<u8>> {
    let length = length_prefix(payload.len())?;
    let mut frame =
        Vec::with_capacity(header.len() + SEQUENCE_LEN + prefix.len() + LENGTH_LEN + payload.len());
    frame.extend_from_slice(&header);
    if let Some(seq) = sequence {
        frame.extend_from_slice(&encode_sequence(seq));
    }
    frame.extend_from_slice(prefix);
    frame.extend_from_slice(&length);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// The length field is a `u32`; anything longer cannot be framed.
fn length_prefix(len: usize) -> Result<[u8; LENGTH_LEN]> {
    u32::try_from(len)
        .map(u32::to_be_bytes)
        .map_err(|_| Error::PayloadTooLarge(len))
}

/// Build the gzip-compressed JSON control frame that opens a session.
///
/// # Errors
/// Returns an error if the request cannot be serialized or compressed.
pub fn build_control_frame(request: &ControlRequest, seq: i32) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(request)?;
    let compressed = gzip_compress(&json)?;
    let header = encode_header(
        MessageType::FullClientRequest,
        flags::SEQUENCE,
        Serialization::Json,
        Compression::Gzip,
        0,
    );
    assemble(header, Some(seq), &[], &compressed)
}

/// Build one audio frame.
///
/// `seq` is the positive counter value; the final frame carries it negated
/// together with the final-frame flag. An empty final chunk is still a
/// complete frame.
///
/// # Errors
/// Returns [`Error::ProtocolViolation`] if `seq` is not positive, or an error
/// if compression fails.
pub fn build_audio_frame(chunk: &[u8], seq: i32, is_final: bool) -> Result<Vec<u8>> {
    if seq <= 0 {
        return Err(Error::ProtocolViolation(format!(
            "audio sequence must be positive, got {seq}"
        )));
    }
    let compressed = gzip_compress(chunk)?;
    let (type_flags, wire_seq) = if is_final {
        (flags::FINAL_WITH_SEQUENCE, -seq)
    } else {
        (flags::SEQUENCE, seq)
    };
    let header = encode_header(
        MessageType::AudioOnlyRequest,
        type_flags,
        Serialization::None,
        Compression::Gzip,
        0,
    );
    assemble(header, Some(wire_seq), &[], &compressed)
}

/// Decoded payload of a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    #[must_use]
    pub const fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Text(text) => Some(text.as_bytes()),
            Self::Binary(bytes) => Some(bytes),
            Self::Json(_) => None,
        }
    }
}

/// Result of [`decode_frame`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFrame {
    pub header: FrameHeader,
    pub is_last_package: bool,
    /// Frame-level sequence, present when the sequence flag is set.
    pub sequence: Option<i32>,
    /// Sequence acknowledged by a server ack.
    pub ack_sequence: Option<i32>,
    pub error_code: Option<u32>,
    /// Length declared on the wire, before decompression.
    pub payload_length: Option<u32>,
    pub payload: Option<Payload>,
}

impl ParsedFrame {
    const fn bare(header: FrameHeader) -> Self {
        Self {
            header,
            is_last_package: header.is_final(),
            sequence: None,
            ack_sequence: None,
            error_code: None,
            payload_length: None,
            payload: None,
        }
    }

    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        self.header.message_type
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.header.message_type, MessageType::ServerErrorResponse)
    }

    /// The server error carried by an error-response frame.
    #[must_use]
    pub fn server_error(&self) -> Option<ServerError> {
        if !self.is_error() {
            return None;
        }
        let (message, detail) = match &self.payload {
            Some(Payload::Json(value)) => {
                let message = ["error", "message", "msg"]
                    .iter()
                    .find_map(|key| value.get(key).and_then(Value::as_str))
                    .map(str::to_string);
                (message, Some(value.clone()))
            }
            Some(Payload::Text(text)) => (Some(text.clone()), None),
            Some(Payload::Binary(_)) | None => (None, None),
        };
        Some(ServerError {
            code: self.error_code.unwrap_or_default(),
            message,
            detail,
        })
    }

    /// Interpret a JSON payload as a recognition response.
    #[must_use]
    pub fn recognition(&self) -> Option<serde_json::Result<RecognitionResponse>> {
        self.payload
            .as_ref()
            .and_then(Payload::as_json)
            .map(|value| serde_json::from_value(value.clone()))
    }

    /// Recognized text so far, if the frame carries any.
    #[must_use]
    pub fn text(&self) -> Option<String> {
        match self.recognition()? {
            Ok(response) => response.result.map(|result| result.text),
            Err(_) => None,
        }
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    const fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> std::result::Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                needed: self.pos + n,
                available: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_array(&mut self) -> std::result::Result<[u8; 4], DecodeError> {
        let mut out = [0u8; 4];
        out.copy_from_slice(self.take(4)?);
        Ok(out)
    }

    fn read_i32(&mut self) -> std::result::Result<i32, DecodeError> {
        self.read_array().map(i32::from_be_bytes)
    }

    fn read_u32(&mut self) -> std::result::Result<u32, DecodeError> {
        self.read_array().map(u32::from_be_bytes)
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }

    /// Read a length prefix and check it against everything that follows.
    fn read_sized_payload(&mut self) -> std::result::Result<(u32, &'a [u8]), DecodeError> {
        let declared = self.read_u32()?;
        let payload = self.rest();
        if declared as usize != payload.len() {
            return Err(DecodeError::LengthMismatch {
                declared,
                actual: payload.len(),
            });
        }
        Ok((declared, payload))
    }
}

/// Parse one inbound frame.
///
/// # Errors
/// Returns a [`DecodeError`] for any structural violation. Callers must treat
/// it as fatal for the session.
pub fn decode_frame(buf: &[u8]) -> std::result::Result<ParsedFrame, DecodeError> {
    let header = FrameHeader::decode(buf)?;
    let mut cursor = Cursor::new(buf);
    // Extension words are reserved and skipped.
    cursor.take(header.byte_len())?;

    let mut frame = ParsedFrame::bare(header);
    if header.has_sequence() {
        frame.sequence = Some(cursor.read_i32()?);
    }

    let payload = match header.message_type {
        MessageType::FullClientRequest
        | MessageType::AudioOnlyRequest
        | MessageType::FullServerResponse => {
            let (declared, payload) = cursor.read_sized_payload()?;
            frame.payload_length = Some(declared);
            payload
        }
        MessageType::ServerAck => {
            if cursor.remaining() >= SEQUENCE_LEN {
                frame.ack_sequence = Some(cursor.read_i32()?);
            }
            if cursor.remaining() >= LENGTH_LEN {
                let (declared, payload) = cursor.read_sized_payload()?;
                frame.payload_length = Some(declared);
                payload
            } else {
                &[]
            }
        }
        MessageType::ServerErrorResponse => {
            frame.error_code = Some(cursor.read_u32()?);
            let (declared, payload) = cursor.read_sized_payload()?;
            frame.payload_length = Some(declared);
            payload
        }
        MessageType::Unhandled(nibble) => {
            tracing::debug!(message_type = nibble, "Ignoring frame of unhandled type");
            return Ok(frame);
        }
    };

    frame.payload = decode_payload(&header, payload)?;
    Ok(frame)
}

fn decode_payload(
    header: &FrameHeader,
    bytes: &[u8],
) -> std::result::Result<Option<Payload>, DecodeError> {
    if bytes.is_empty() {
        return Ok(None);
    }

    let raw = match header.compression {
        Compression::Gzip => gzip_decompress(bytes).map_err(DecodeError::Decompression)?,
        Compression::None => bytes.to_vec(),
    };

    let payload = match header.serialization {
        Serialization::Json => {
            Payload::Json(serde_json::from_slice(&raw).map_err(DecodeError::Malformed)?)
        }
        Serialization::None => match String::from_utf8(raw) {
            Ok(text) if !text.is_empty() => Payload::Text(text),
            Ok(_) => Payload::Binary(Vec::new()),
            Err(err) => Payload::Binary(err.into_bytes()),
        },
    };
    Ok(Some(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_frame(header: [u8; 4], body: &[&[u8]]) -> Vec<u8> {
        let mut frame = header.to_vec();
        for part in body {
            frame.extend_from_slice(part);
        }
        frame
    }

    #[test]
    fn sequence_round_trips_extremes() {
        for seq in [0, 1, -1, 42, -42, i32::MAX, i32::MIN, i32::MIN + 1] {
            assert_eq!(decode_sequence(&encode_sequence(seq)).unwrap(), seq);
        }
        assert_eq!(encode_sequence(-2), [0xFF, 0xFF, 0xFF, 0xFE]);
    }

    #[test]
    fn short_buffers_are_truncated() {
        for len in 0..4 {
            let buf = vec![0x11; len];
            assert!(matches!(
                decode_frame(&buf),
                Err(DecodeError::Truncated { needed: 4, .. })
            ));
        }
    }

    #[test]
    fn missing_sequence_is_truncated() {
        let header = encode_header(
            MessageType::FullServerResponse,
            flags::SEQUENCE,
            Serialization::None,
            Compression::None,
            0,
        );
        let frame = raw_frame(header, &[&[0, 0]]);
        assert!(matches!(
            decode_frame(&frame),
            Err(DecodeError::Truncated { needed: 8, available: 6 })
        ));
    }

    #[test]
    fn header_extension_is_skipped() {
        let mut frame = vec![0x12, 0x90, 0x00, 0x00];
        frame.extend_from_slice(&[0xAA; 4]);
        frame.extend_from_slice(&2u32.to_be_bytes());
        frame.extend_from_slice(b"ok");
        let parsed = decode_frame(&frame).unwrap();
        assert_eq!(parsed.header.header_size_units, 2);
        assert_eq!(parsed.payload, Some(Payload::Text("ok".to_string())));
    }

    #[test]
    fn header_extension_longer_than_buffer_is_truncated() {
        let frame = [0x13, 0x90, 0x00, 0x00, 0x00];
        assert!(matches!(
            decode_frame(&frame),
            Err(DecodeError::Truncated { needed: 12, available: 5 })
        ));
    }

    #[test]
    fn control_frame_round_trips_json() {
        let request = ControlRequest::default();
        let frame = build_control_frame(&request, 1).unwrap();
        assert_eq!(&frame[..4], &[0x11, 0x11, 0x11, 0x00]);

        let parsed = decode_frame(&frame).unwrap();
        assert_eq!(parsed.message_type(), MessageType::FullClientRequest);
        assert_eq!(parsed.sequence, Some(1));
        assert!(!parsed.is_last_package);
        assert_eq!(parsed.payload_length, Some((frame.len() - 12) as u32));
        let expected = serde_json::to_value(&request).unwrap();
        assert_eq!(parsed.payload, Some(Payload::Json(expected)));
    }

    #[test]
    fn user_only_json_round_trips() {
        let value = json!({ "user": { "uid": "t" } });
        let compressed = gzip_compress(&serde_json::to_vec(&value).unwrap()).unwrap();
        let header = encode_header(
            MessageType::FullClientRequest,
            flags::SEQUENCE,
            Serialization::Json,
            Compression::Gzip,
            0,
        );
        let frame = assemble(header, Some(1), &[], &compressed).unwrap();
        let parsed = decode_frame(&frame).unwrap();
        assert_eq!(parsed.payload, Some(Payload::Json(value)));
    }

    #[test]
    fn final_audio_frame_negates_sequence() {
        let frame = build_audio_frame(&[1, 2, 3], 5, true).unwrap();
        let parsed = decode_frame(&frame).unwrap();
        assert_eq!(parsed.message_type(), MessageType::AudioOnlyRequest);
        assert_eq!(parsed.sequence, Some(-5));
        assert!(parsed.is_last_package);

        let frame = build_audio_frame(&[1, 2, 3], 5, false).unwrap();
        let parsed = decode_frame(&frame).unwrap();
        assert_eq!(parsed.sequence, Some(5));
        assert!(!parsed.is_last_package);
    }

    #[test]
    fn empty_final_audio_frame_is_complete() {
        let frame = build_audio_frame(&[], 4, true).unwrap();
        let parsed = decode_frame(&frame).unwrap();
        assert!(parsed.is_last_package);
        assert_eq!(parsed.sequence, Some(-4));
        assert!(parsed.payload_length.unwrap() > 0);
        assert_eq!(parsed.payload, Some(Payload::Binary(Vec::new())));
    }

    #[test]
    fn audio_sequence_must_be_positive() {
        for seq in [0, -1, i32::MIN] {
            for is_final in [false, true] {
                let err = build_audio_frame(&[1, 2, 3], seq, is_final).unwrap_err();
                assert!(matches!(err, Error::ProtocolViolation(_)), "seq {seq}: {err}");
            }
        }
        let parsed = decode_frame(&build_audio_frame(&[], i32::MAX, true).unwrap()).unwrap();
        assert_eq!(parsed.sequence, Some(-i32::MAX));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn length_prefix_refuses_to_wrap() {
        let widest = u32::MAX as usize;
        assert_eq!(length_prefix(widest).unwrap(), [0xFF; 4]);
        assert!(matches!(
            length_prefix(widest + 1),
            Err(Error::PayloadTooLarge(len)) if len == widest + 1
        ));
        assert!(matches!(
            length_prefix(widest + 6),
            Err(Error::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn header_fields_survive_frame_decode() {
        let types = [
            MessageType::FullClientRequest,
            MessageType::AudioOnlyRequest,
            MessageType::FullServerResponse,
            MessageType::ServerAck,
            MessageType::ServerErrorResponse,
            MessageType::Unhandled(0b0111),
        ];
        for message_type in types {
            for type_flags in 0..=0x0F_u8 {
                for serialization in [Serialization::None, Serialization::Json] {
                    for compression in [Compression::None, Compression::Gzip] {
                        let reserved = type_flags.wrapping_mul(17);
                        let mut frame = encode_header(
                            message_type,
                            type_flags,
                            serialization,
                            compression,
                            reserved,
                        )
                        .to_vec();
                        if flags::has_flag(type_flags, flags::SEQUENCE) {
                            frame.extend_from_slice(&encode_sequence(7));
                        }
                        match message_type {
                            MessageType::ServerErrorResponse => {
                                frame.extend_from_slice(&9_u32.to_be_bytes());
                                frame.extend_from_slice(&[0; 4]);
                            }
                            MessageType::ServerAck | MessageType::Unhandled(_) => {}
                            _ => frame.extend_from_slice(&[0; 4]),
                        }

                        let parsed = decode_frame(&frame).unwrap();
                        let expected =
                            FrameHeader::new(message_type, type_flags, serialization, compression)
                                .with_reserved(reserved);
                        assert_eq!(parsed.header, expected);
                        assert_eq!(
                            parsed.is_last_package,
                            flags::has_flag(type_flags, flags::FINAL)
                        );
                        assert_eq!(
                            parsed.sequence,
                            flags::has_flag(type_flags, flags::SEQUENCE).then_some(7)
                        );
                        assert_eq!(parsed.payload, None);
                    }
                }
            }
        }
    }

    #[test]
    fn length_mismatch_is_a_framing_error() {
        let header = encode_header(
            MessageType::FullServerResponse,
            flags::NONE,
            Serialization::None,
            Compression::None,
            0,
        );
        let frame = raw_frame(header, &[&10u32.to_be_bytes(), b"short"]);
        assert!(matches!(
            decode_frame(&frame),
            Err(DecodeError::LengthMismatch { declared: 10, actual: 5 })
        ));

        let frame = raw_frame(header, &[&u32::MAX.to_be_bytes()]);
        assert!(matches!(
            decode_frame(&frame),
            Err(DecodeError::LengthMismatch { declared: u32::MAX, actual: 0 })
        ));
    }

    #[test]
    fn ack_with_sequence_and_payload() {
        let header = encode_header(
            MessageType::ServerAck,
            flags::FINAL_WITH_SEQUENCE,
            Serialization::Json,
            Compression::None,
            0,
        );
        let body = br#"{"ok":true}"#;
        let frame = raw_frame(
            header,
            &[
                &(-3i32).to_be_bytes(),
                &3i32.to_be_bytes(),
                &(body.len() as u32).to_be_bytes(),
                body,
            ],
        );
        let parsed = decode_frame(&frame).unwrap();
        assert_eq!(parsed.sequence, Some(-3));
        assert_eq!(parsed.ack_sequence, Some(3));
        assert!(parsed.is_last_package);
        assert_eq!(parsed.payload, Some(Payload::Json(json!({ "ok": true }))));
    }

    #[test]
    fn bare_ack_has_no_payload() {
        let header = encode_header(
            MessageType::ServerAck,
            flags::NONE,
            Serialization::None,
            Compression::None,
            0,
        );
        let parsed = decode_frame(&raw_frame(header, &[&7i32.to_be_bytes()])).unwrap();
        assert_eq!(parsed.ack_sequence, Some(7));
        assert_eq!(parsed.payload_length, None);
        assert_eq!(parsed.payload, None);

        let parsed = decode_frame(&header).unwrap();
        assert_eq!(parsed.ack_sequence, None);
    }

    #[test]
    fn error_response_exposes_code_and_message() {
        let header = encode_header(
            MessageType::ServerErrorResponse,
            flags::NONE,
            Serialization::Json,
            Compression::Gzip,
            0,
        );
        let body = gzip_compress(br#"{"error":"bad audio"}"#).unwrap();
        let frame = raw_frame(
            header,
            &[&45_000_151u32.to_be_bytes(), &(body.len() as u32).to_be_bytes(), body.as_slice()],
        );
        let parsed = decode_frame(&frame).unwrap();
        assert_eq!(parsed.error_code, Some(45_000_151));
        let err = parsed.server_error().unwrap();
        assert_eq!(err.code, 45_000_151);
        assert_eq!(err.message.as_deref(), Some("bad audio"));
    }

    #[test]
    fn unhandled_type_yields_bare_frame() {
        let header = encode_header(
            MessageType::Unhandled(0b0100),
            flags::FINAL,
            Serialization::None,
            Compression::None,
            0,
        );
        let parsed = decode_frame(&raw_frame(header, &[b"whatever"])).unwrap();
        assert!(parsed.is_last_package);
        assert_eq!(parsed.payload, None);
        assert_eq!(parsed.message_type(), MessageType::Unhandled(0b0100));
    }

    #[test]
    fn corrupt_gzip_is_a_decompression_error() {
        let header = encode_header(
            MessageType::FullServerResponse,
            flags::NONE,
            Serialization::Json,
            Compression::Gzip,
            0,
        );
        let frame = raw_frame(header, &[&4u32.to_be_bytes(), b"nope"]);
        assert!(matches!(decode_frame(&frame), Err(DecodeError::Decompression(_))));
    }

    #[test]
    fn invalid_json_is_malformed() {
        let header = encode_header(
            MessageType::FullServerResponse,
            flags::NONE,
            Serialization::Json,
            Compression::None,
            0,
        );
        let frame = raw_frame(header, &[&3u32.to_be_bytes(), b"{no"]);
        assert!(matches!(decode_frame(&frame), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn recognition_text_is_extracted() {
        let header = encode_header(
            MessageType::FullServerResponse,
            flags::SEQUENCE,
            Serialization::Json,
            Compression::None,
            0,
        );
        let body = serde_json::to_vec(&json!({
            "audio_info": { "duration": 1200 },
            "result": { "text": "你好" }
        }))
        .unwrap();
        let frame = raw_frame(
            header,
            &[&2i32.to_be_bytes(), &(body.len() as u32).to_be_bytes(), &body],
        );
        let parsed = decode_frame(&frame).unwrap();
        assert_eq!(parsed.text().as_deref(), Some("你好"));
        let response = parsed.recognition().unwrap().unwrap();
        assert_eq!(response.audio_info.unwrap().duration, 1200);
    }
}
