//! The fixed 4-byte frame header.
//!
//! ```text
//! byte 0: version:4        | header_size_units:4
//! byte 1: message_type:4   | type_flags:4
//! byte 2: serialization:4  | compression:4
//! byte 3: reserved
//! ```

use crate::error::DecodeError;

/// Protocol generation spoken by this crate.
pub const PROTOCOL_VERSION: u8 = 0b0001;

/// Header length in 4-byte units. No extensions are ever sent.
pub const DEFAULT_HEADER_SIZE_UNITS: u8 = 0b0001;

/// Size of the fixed header in bytes.
pub const HEADER_LEN: usize = 4;

const NIBBLE_MAX: u8 = 0x0F;

/// Bits of the `type_flags` nibble.
pub mod flags {
    /// No flags.
    pub const NONE: u8 = 0b0000;
    /// A 4-byte sequence number follows the header.
    pub const SEQUENCE: u8 = 0b0001;
    /// Last frame of the logical request or response stream.
    pub const FINAL: u8 = 0b0010;
    /// Sequence present on the last frame.
    pub const FINAL_WITH_SEQUENCE: u8 = SEQUENCE | FINAL;

    #[inline]
    #[must_use]
    pub const fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    FullClientRequest,
    AudioOnlyRequest,
    FullServerResponse,
    ServerAck,
    ServerErrorResponse,
    /// A nibble this crate does not interpret.
    Unhandled(u8),
}

impl MessageType {
    #[must_use]
    pub const fn from_nibble(nibble: u8) -> Self {
        match nibble {
            0b0001 => Self::FullClientRequest,
            0b0010 => Self::AudioOnlyRequest,
            0b1001 => Self::FullServerResponse,
            0b1011 => Self::ServerAck,
            0b1111 => Self::ServerErrorResponse,
            other => Self::Unhandled(other),
        }
    }

    #[must_use]
    pub const fn nibble(self) -> u8 {
        match self {
            Self::FullClientRequest => 0b0001,
            Self::AudioOnlyRequest => 0b0010,
            Self::FullServerResponse => 0b1001,
            Self::ServerAck => 0b1011,
            Self::ServerErrorResponse => 0b1111,
            Self::Unhandled(n) => n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Serialization {
    #[default]
    None,
    Json,
}

impl Serialization {
    #[must_use]
    pub const fn nibble(self) -> u8 {
        match self {
            Self::None => 0b0000,
            Self::Json => 0b0001,
        }
    }
}

impl TryFrom<u8> for Serialization {
    type Error = DecodeError;

    fn try_from(nibble: u8) -> Result<Self, Self::Error> {
        match nibble {
            0b0000 => Ok(Self::None),
            0b0001 => Ok(Self::Json),
            other => Err(DecodeError::UnknownSerialization(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
}

impl Compression {
    #[must_use]
    pub const fn nibble(self) -> u8 {
        match self {
            Self::None => 0b0000,
            Self::Gzip => 0b0001,
        }
    }
}

impl TryFrom<u8> for Compression {
    type Error = DecodeError;

    fn try_from(nibble: u8) -> Result<Self, Self::Error> {
        match nibble {
            0b0000 => Ok(Self::None),
            0b0001 => Ok(Self::Gzip),
            other => Err(DecodeError::UnknownCompression(other)),
        }
    }
}

/// Decoded form of the fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub header_size_units: u8,
    pub message_type: MessageType,
    pub flags: u8,
    pub serialization: Serialization,
    pub compression: Compression,
    pub reserved: u8,
}

impl FrameHeader {
    #[must_use]
    pub const fn new(
        message_type: MessageType,
        flags: u8,
        serialization: Serialization,
        compression: Compression,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            header_size_units: DEFAULT_HEADER_SIZE_UNITS,
            message_type,
            flags,
            serialization,
            compression,
            reserved: 0,
        }
    }

    #[must_use]
    pub const fn with_reserved(mut self, reserved: u8) -> Self {
        self.reserved = reserved;
        self
    }

    #[must_use]
    pub const fn has_sequence(&self) -> bool {
        flags::has_flag(self.flags, flags::SEQUENCE)
    }

    #[must_use]
    pub const fn is_final(&self) -> bool {
        flags::has_flag(self.flags, flags::FINAL)
    }

    /// Length of the header including extension words.
    #[must_use]
    pub const fn byte_len(&self) -> usize {
        self.header_size_units as usize * 4
    }

    /// Pack the header into its wire form.
    ///
    /// # Panics
    ///
    /// Panics if any nibble field is greater than 15.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let message_type = self.message_type.nibble();
        assert!(self.version <= NIBBLE_MAX, "version {} exceeds a nibble", self.version);
        assert!(
            self.header_size_units <= NIBBLE_MAX,
            "header size {} exceeds a nibble",
            self.header_size_units
        );
        assert!(message_type <= NIBBLE_MAX, "message type {message_type} exceeds a nibble");
        assert!(self.flags <= NIBBLE_MAX, "type flags {} exceed a nibble", self.flags);

        [
            (self.version << 4) | self.header_size_units,
            (message_type << 4) | self.flags,
            (self.serialization.nibble() << 4) | self.compression.nibble(),
            self.reserved,
        ]
    }

    /// Parse the fixed header from the start of `buf`.
    ///
    /// # Errors
    /// Returns a framing error for short buffers, a foreign protocol version,
    /// a zero header size, or an unknown serialization/compression nibble.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < HEADER_LEN {
            return Err(DecodeError::Truncated {
                needed: HEADER_LEN,
                available: buf.len(),
            });
        }

        let version = buf[0] >> 4;
        if version != PROTOCOL_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        let header_size_units = buf[0] & 0x0F;
        if header_size_units == 0 {
            return Err(DecodeError::InvalidHeaderSize(header_size_units));
        }

        Ok(Self {
            version,
            header_size_units,
            message_type: MessageType::from_nibble(buf[1] >> 4),
            flags: buf[1] & 0x0F,
            serialization: Serialization::try_from(buf[2] >> 4)?,
            compression: Compression::try_from(buf[2] & 0x0F)?,
            reserved: buf[3],
        })
    }
}

/// Build a version-1 header with no extensions. Clients always send a zero
/// `reserved` byte.
///
/// # Panics
///
/// Panics if `type_flags` (or an unhandled message type) exceeds a nibble.
#[must_use]
pub fn encode_header(
    message_type: MessageType,
    type_flags: u8,
    serialization: Serialization,
    compression: Compression,
    reserved: u8,
) -> [u8; HEADER_LEN] {
    FrameHeader::new(message_type, type_flags, serialization, compression)
        .with_reserved(reserved)
        .encode()
}
