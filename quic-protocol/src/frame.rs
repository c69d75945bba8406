//! Binary frame format for the device protocol.
//!
//! Frame layout (host to device):
//!
//! ```text
//! +--------+-----------------+-------------+-----------------+
//! |  sync  | flag | category | payload_len | payload         |
//! | 1 byte | 3 bit|  5 bit   | 2 bytes BE  | payload_len     |
//! +--------+-----------------+-------------+-----------------+
//! ```
//!
//! Frames read back from the device are handed to the decoder without the
//! sync byte: the first byte seen is the flag/category byte.

use crate::error::ProtocolError;
use crate::MAX_PAYLOAD_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

/// Marker byte preceding every frame on the wire: '#'.
pub const SYNC_MARKER: u8 = b'#';

/// Size of the header following the sync marker (1 + 2 = 3).
pub const FRAME_HEADER_SIZE: usize = 3;

const CATEGORY_MASK: u8 = 0x1F;
const FLAG_SHIFT: u8 = 5;

/// The kind of exchange a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCategory {
    Invalid,
    Get,
    Set,
    Log,
    CalibrateImu,
    Blackbox,
    /// Device-specific category outside the known set (5-bit value).
    Other(u8),
}

impl CommandCategory {
    /// Decodes the low five bits of a header byte.
    pub fn from_bits(bits: u8) -> Self {
        match bits & CATEGORY_MASK {
            0 => CommandCategory::Invalid,
            1 => CommandCategory::Get,
            2 => CommandCategory::Set,
            3 => CommandCategory::Log,
            4 => CommandCategory::CalibrateImu,
            5 => CommandCategory::Blackbox,
            n => CommandCategory::Other(n),
        }
    }

    pub fn bits(&self) -> u8 {
        match self {
            CommandCategory::Invalid => 0,
            CommandCategory::Get => 1,
            CommandCategory::Set => 2,
            CommandCategory::Log => 3,
            CommandCategory::CalibrateImu => 4,
            CommandCategory::Blackbox => 5,
            CommandCategory::Other(n) => n & CATEGORY_MASK,
        }
    }

    /// Returns whether frames of this category are unsolicited device output
    /// rather than replies to a request.
    pub fn is_stream(&self) -> bool {
        matches!(self, CommandCategory::Log | CommandCategory::Blackbox)
    }
}

impl fmt::Display for CommandCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandCategory::Invalid => write!(f, "INVALID"),
            CommandCategory::Get => write!(f, "GET"),
            CommandCategory::Set => write!(f, "SET"),
            CommandCategory::Log => write!(f, "LOG"),
            CommandCategory::CalibrateImu => write!(f, "CAL_IMU"),
            CommandCategory::Blackbox => write!(f, "BLACKBOX"),
            CommandCategory::Other(n) => write!(f, "CMD_{}", n & CATEGORY_MASK),
        }
    }
}

/// Top three bits of the header byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseFlag {
    #[default]
    None,
    /// Payload is a CBOR text string describing the failure.
    Error,
    Reserved(u8),
}

impl ResponseFlag {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => ResponseFlag::None,
            1 => ResponseFlag::Error,
            n => ResponseFlag::Reserved(n),
        }
    }

    pub fn bits(&self) -> u8 {
        match self {
            ResponseFlag::None => 0,
            ResponseFlag::Error => 1,
            ResponseFlag::Reserved(n) => n & 0x07,
        }
    }
}

/// A decoded device protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub category: CommandCategory,
    pub flag: ResponseFlag,
    pub payload: Bytes,
}

impl Packet {
    /// Creates a packet with no flag set.
    pub fn new(category: CommandCategory, payload: impl Into<Bytes>) -> Self {
        Self {
            category,
            flag: ResponseFlag::None,
            payload: payload.into(),
        }
    }

    /// Creates a packet carrying the error flag.
    pub fn error(category: CommandCategory, payload: impl Into<Bytes>) -> Self {
        Self {
            category,
            flag: ResponseFlag::Error,
            payload: payload.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.flag == ResponseFlag::Error
    }

    /// The packed flag/category header byte.
    pub fn header_byte(&self) -> u8 {
        (self.flag.bits() << FLAG_SHIFT) | self.category.bits()
    }

    /// Encodes the packet with its leading sync marker.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let mut buf = BytesMut::with_capacity(1 + FRAME_HEADER_SIZE + self.payload.len());
        buf.put_u8(SYNC_MARKER);
        self.put_frame(&mut buf)?;
        Ok(buf)
    }

    /// Encodes the packet the way the transport reader hands it to the
    /// decoder: header and payload, no sync marker.
    pub fn encode_without_sync(&self) -> Result<BytesMut, ProtocolError> {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + self.payload.len());
        self.put_frame(&mut buf)?;
        Ok(buf)
    }

    fn put_frame(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let payload_len = self.payload.len();
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        buf.put_u8(self.header_byte());
        buf.put_u16(payload_len as u16);
        buf.put_slice(&self.payload);
        Ok(())
    }

    /// Decodes a marker-stripped frame from the front of `buf`.
    ///
    /// Returns `None` and leaves `buf` untouched if the frame is not yet
    /// complete.
    pub fn decode(buf: &mut BytesMut) -> Option<Self> {
        let payload_len = Self::peek_payload_len(buf)?;
        if buf.len() < FRAME_HEADER_SIZE + payload_len {
            return None;
        }

        let header = buf[0];
        buf.advance(FRAME_HEADER_SIZE);
        let payload = buf.split_to(payload_len).freeze();

        Some(Self {
            category: CommandCategory::from_bits(header),
            flag: ResponseFlag::from_bits(header >> FLAG_SHIFT),
            payload,
        })
    }

    /// Reads the declared payload length if the header is buffered.
    pub fn peek_payload_len(buf: &[u8]) -> Option<usize> {
        if buf.len() < FRAME_HEADER_SIZE {
            return None;
        }
        Some(u16::from_be_bytes([buf[1], buf[2]]) as usize)
    }
}
