//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while framing packets or encoding payload values.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The stream ended inside a frame payload. The position of the next
    /// frame boundary is unknown, so the connection cannot continue.
    #[error("truncated frame: header declared {declared} payload bytes, stream ended after {received}")]
    Truncated { declared: usize, received: usize },

    #[error("truncated frame header: stream ended after {received} of 3 header bytes")]
    TruncatedHeader { received: usize },

    #[error("CBOR encode error: {0}")]
    Encode(String),

    #[error("CBOR decode error: {0}")]
    Decode(String),

    #[error("unknown value id: {0}")]
    UnknownValueId(u8),
}

impl ProtocolError {
    /// Returns whether the error leaves the byte stream desynchronized.
    pub fn is_desync(&self) -> bool {
        matches!(
            self,
            ProtocolError::Truncated { .. } | ProtocolError::TruncatedHeader { .. }
        )
    }
}
