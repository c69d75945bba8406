//! High-level client API.

use crate::connection::Connection;
use crate::error::ClientError;
use bytes::Bytes;
use quic_protocol::{value, CommandCategory, Packet, ValueId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Typed access to device configuration values.
#[derive(Clone)]
pub struct Client {
    conn: Arc<Connection>,
}

impl Client {
    pub fn new(conn: Arc<Connection>) -> Self {
        Self { conn }
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> Arc<Connection> {
        self.conn.clone()
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    // =========================================================================
    // Helper methods
    // =========================================================================

    /// Strips and checks the value id the device echoes in front of every
    /// Get/Set response, returning the remaining bytes.
    fn strip_echoed_id(id: ValueId, packet: Packet) -> Result<Bytes, ClientError> {
        let mut cursor = &packet.payload[..];
        let echoed: u64 = value::read_next(&mut cursor)?;
        if echoed != u64::from(id.as_u8()) {
            return Err(ClientError::TypeMismatch {
                expected: id,
                actual: echoed,
            });
        }
        let consumed = packet.payload.len() - cursor.len();
        Ok(packet.payload.slice(consumed..))
    }

    async fn exchange_value(
        &self,
        category: CommandCategory,
        id: ValueId,
        payload: Vec<u8>,
    ) -> Result<Bytes, ClientError> {
        let packet = self.conn.send(category, payload).await?;
        Self::strip_echoed_id(id, packet)
    }

    fn set_payload(id: ValueId, value_bytes: &[u8]) -> Result<Vec<u8>, ClientError> {
        let mut payload = value::to_vec(&id)?;
        payload.extend_from_slice(value_bytes);
        Ok(payload)
    }

    // =========================================================================
    // Value operations
    // =========================================================================

    /// Reads a value and returns its encoded bytes without decoding them.
    pub async fn get_value_reader(&self, id: ValueId) -> Result<Bytes, ClientError> {
        let payload = value::to_vec(&id)?;
        self.exchange_value(CommandCategory::Get, id, payload).await
    }

    /// Reads a value and decodes it into `T`.
    pub async fn get_value<T: DeserializeOwned>(&self, id: ValueId) -> Result<T, ClientError> {
        let bytes = self.get_value_reader(id).await?;
        Ok(value::from_slice(&bytes)?)
    }

    /// Writes a value. Returns the value the device actually applied, which
    /// may differ from the one sent (the firmware clamps out-of-range fields).
    pub async fn set_value<T>(&self, id: ValueId, val: &T) -> Result<T, ClientError>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut payload = value::to_vec(&id)?;
        value::append(&mut payload, val)?;

        let bytes = self.exchange_value(CommandCategory::Set, id, payload).await?;
        Ok(value::from_slice(&bytes)?)
    }

    /// Writes a value whose encoded form is read verbatim from `reader`.
    pub async fn set_value_from_reader<R, T>(
        &self,
        id: ValueId,
        mut reader: R,
    ) -> Result<T, ClientError>
    where
        R: AsyncRead + Unpin,
        T: DeserializeOwned,
    {
        let mut encoded = Vec::new();
        reader.read_to_end(&mut encoded).await?;
        let payload = Self::set_payload(id, &encoded)?;

        let bytes = self.exchange_value(CommandCategory::Set, id, payload).await?;
        Ok(value::from_slice(&bytes)?)
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Starts IMU calibration and waits for the device to acknowledge it.
    pub async fn calibrate_imu(&self) -> Result<(), ClientError> {
        self.conn.send(CommandCategory::CalibrateImu, Bytes::new()).await?;
        Ok(())
    }

    /// Sends a command with a prebuilt payload and returns the raw response.
    pub async fn send_raw(
        &self,
        category: CommandCategory,
        payload: impl Into<Bytes>,
    ) -> Result<Packet, ClientError> {
        self.conn.send(category, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(parts: &[&[u8]]) -> Packet {
        Packet::new(CommandCategory::Get, parts.concat())
    }

    #[test]
    fn test_strip_echoed_id() {
        let id = value::to_vec(&ValueId::Profile).unwrap();
        let body = value::to_vec("rest").unwrap();

        let rest = Client::strip_echoed_id(ValueId::Profile, response(&[&id, &body])).unwrap();
        assert_eq!(&rest[..], &body[..]);
        assert_eq!(value::from_slice::<String>(&rest).unwrap(), "rest");
    }

    #[test]
    fn test_strip_echoed_id_mismatch() {
        let id = value::to_vec(&9u8).unwrap();
        let err = Client::strip_echoed_id(ValueId::Profile, response(&[&id])).unwrap_err();
        assert!(matches!(
            err,
            ClientError::TypeMismatch {
                expected: ValueId::Profile,
                actual: 9
            }
        ));
    }

    #[test]
    fn test_strip_echoed_id_out_of_range() {
        let id = value::to_vec(&300u16).unwrap();
        let err = Client::strip_echoed_id(ValueId::Info, response(&[&id])).unwrap_err();
        assert!(matches!(
            err,
            ClientError::TypeMismatch {
                expected: ValueId::Info,
                actual: 300
            }
        ));
    }

    #[test]
    fn test_strip_echoed_id_empty_payload() {
        let err = Client::strip_echoed_id(ValueId::Info, response(&[])).unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }

    #[test]
    fn test_set_payload_layout() {
        let payload = Client::set_payload(ValueId::BlackboxRate, &[0x18, 0x20]).unwrap();
        assert_eq!(payload, vec![0x04, 0x18, 0x20]);
    }
}
