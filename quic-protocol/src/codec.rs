//! Encoder and decoder for device protocol frames.

use crate::error::ProtocolError;
use crate::frame::{CommandCategory, Packet, FRAME_HEADER_SIZE, SYNC_MARKER};
use crate::value;
use bytes::{Buf, Bytes, BytesMut};
use serde::Serialize;

/// Encodes host commands into frames.
pub struct Encoder;

impl Encoder {
    /// Encodes a command with a prebuilt payload. The flag is always `None`;
    /// only the device sets the error flag.
    pub fn encode_command(
        category: CommandCategory,
        payload: impl Into<Bytes>,
    ) -> Result<BytesMut, ProtocolError> {
        Packet::new(category, payload).encode()
    }

    /// Encodes a command whose payload is a single CBOR value.
    pub fn encode_value<T: Serialize + ?Sized>(
        category: CommandCategory,
        value: &T,
    ) -> Result<BytesMut, ProtocolError> {
        let payload = value::to_vec(value)?;
        Self::encode_command(category, payload)
    }
}

/// How frame boundaries are found in the inbound byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// The transport already consumed the sync marker; the buffer starts at a
    /// header byte.
    Stripped,
    /// Each frame is preceded by the sync marker; bytes before it are noise.
    Marked,
}

/// Incremental frame decoder over a growing byte buffer.
pub struct Decoder {
    buffer: BytesMut,
    mode: SyncMode,
    /// A marker was consumed and the following frame is not complete yet.
    in_frame: bool,
    discarded: u64,
}

impl Decoder {
    pub fn new() -> Self {
        Self::with_mode(SyncMode::Stripped)
    }

    /// Decoder that locates the sync marker itself.
    pub fn with_sync_marker() -> Self {
        Self::with_mode(SyncMode::Marked)
    }

    pub fn with_mode(mode: SyncMode) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            mode,
            in_frame: false,
            discarded: 0,
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next packet from the buffer.
    pub fn decode_packet(&mut self) -> Option<Packet> {
        if self.mode == SyncMode::Marked && !self.in_frame {
            match self.buffer.iter().position(|&b| b == SYNC_MARKER) {
                Some(pos) => {
                    self.discarded += pos as u64;
                    self.buffer.advance(pos + 1);
                    self.in_frame = true;
                }
                None => {
                    self.discarded += self.buffer.len() as u64;
                    self.buffer.clear();
                    return None;
                }
            }
        }

        let packet = Packet::decode(&mut self.buffer)?;
        self.in_frame = false;
        Some(packet)
    }

    /// Checks the buffer once the stream has ended.
    ///
    /// A partially buffered frame means the stream was cut mid-frame; the
    /// error is fatal to the connection.
    pub fn finish(&self) -> Result<(), ProtocolError> {
        match Packet::peek_payload_len(&self.buffer) {
            Some(declared) => Err(ProtocolError::Truncated {
                declared,
                received: self.buffer.len() - FRAME_HEADER_SIZE,
            }),
            None if !self.buffer.is_empty() || self.in_frame => {
                Err(ProtocolError::TruncatedHeader {
                    received: self.buffer.len(),
                })
            }
            None => Ok(()),
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the number of noise bytes skipped while searching for markers.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.in_frame = false;
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
