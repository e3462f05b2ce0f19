//! Binary framing for the streaming recognition socket.
//!
//! Everything here is pure: no I/O and no shared state, so the functions are
//! safe to call from any number of sessions at once.

pub mod compression;
pub mod frame;
pub mod header;
pub mod models;
pub mod peer;

pub use frame::{
    ParsedFrame, Payload, build_audio_frame, build_control_frame, decode_frame, decode_sequence,
    encode_sequence,
};
pub use header::{Compression, FrameHeader, MessageType, Serialization, encode_header, flags};
