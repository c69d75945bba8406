//! # quic-protocol
//!
//! Wire protocol spoken by flight controllers over USB/serial.
//!
//! This crate provides:
//! - Binary framing: sync marker, packed flag/category byte, 16-bit length
//! - Incremental decoding with optional sync-marker search
//! - Command categories, response flags and configuration value ids
//! - CBOR payload helpers for self-describing values

pub mod codec;
pub mod error;
pub mod frame;
pub mod value;

pub use codec::{Decoder, Encoder, SyncMode};
pub use error::ProtocolError;
pub use frame::{CommandCategory, Packet, ResponseFlag, FRAME_HEADER_SIZE, SYNC_MARKER};
pub use value::{BlackboxRecord, ValueId};

/// Maximum frame payload size (16-bit length field).
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;
