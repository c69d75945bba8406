//! Client error types.

use quic_protocol::{CommandCategory, ProtocolError, ValueId};
use std::time::Duration;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    /// The inbound stream can no longer be trusted; the owner must reconnect.
    #[error("connection reset: {0}")]
    ConnectionReset(ProtocolError),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("request timeout: no {category} response within {timeout:?}")]
    Timeout {
        category: CommandCategory,
        timeout: Duration,
    },

    /// The device answered with the error flag; the message is shown verbatim.
    #[error("{0}")]
    Device(String),

    #[error("value id mismatch: requested {expected}, device answered {actual}")]
    TypeMismatch { expected: ValueId, actual: u64 },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("{0} frames are device-initiated and cannot be requested")]
    UnsupportedCategory(CommandCategory),
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Decode(msg) => ClientError::Decode(msg),
            err if err.is_desync() => ClientError::ConnectionReset(err),
            err => ClientError::Protocol(err),
        }
    }
}

impl ClientError {
    /// Returns whether the same request may simply be issued again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Timeout { .. })
    }

    /// Returns whether the connection must be re-established before any
    /// further request can succeed.
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::ConnectionReset(_)
                | ClientError::NotConnected
                | ClientError::ConnectionClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_is_verbatim() {
        let err = ClientError::Device("invalid profile".to_string());
        assert_eq!(err.to_string(), "invalid profile");
    }

    #[test]
    fn test_protocol_error_conversion() {
        let err: ClientError = ProtocolError::Decode("eof".into()).into();
        assert!(matches!(err, ClientError::Decode(ref m) if m == "eof"));

        let err: ClientError = ProtocolError::Truncated {
            declared: 8,
            received: 2,
        }
        .into();
        assert!(matches!(err, ClientError::ConnectionReset(_)));
        assert!(err.requires_reconnect());

        let err: ClientError = ProtocolError::FrameTooLarge { size: 2, max: 1 }.into();
        assert!(matches!(err, ClientError::Protocol(_)));
        assert!(!err.requires_reconnect());
    }

    #[test]
    fn test_retryable() {
        let timeout = ClientError::Timeout {
            category: CommandCategory::Get,
            timeout: Duration::from_secs(30),
        };
        assert!(timeout.is_retryable());
        assert!(!timeout.requires_reconnect());

        assert!(!ClientError::Device("busy".into()).is_retryable());
        assert!(!ClientError::ConnectionClosed.is_retryable());
        assert!(ClientError::ConnectionClosed.requires_reconnect());
    }

    #[test]
    fn test_type_mismatch_display() {
        let err = ClientError::TypeMismatch {
            expected: ValueId::Profile,
            actual: 9,
        };
        let msg = err.to_string();
        assert!(msg.contains("PROFILE"));
        assert!(msg.contains('9'));
    }

    #[test]
    fn test_timeout_display() {
        let err = ClientError::Timeout {
            category: CommandCategory::Get,
            timeout: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("GET"));
        assert!(err.to_string().contains("30s"));
    }
}
