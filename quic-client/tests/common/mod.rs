//! Emulated flight controller on the far end of an in-memory duplex stream.

#![allow(dead_code)]

use bytes::Bytes;
use quic_client::{ClientError, Connection, ControllerConfig};
use quic_protocol::{value, CommandCategory, Decoder, Packet, ValueId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

pub struct Device {
    reader: ReadHalf<DuplexStream>,
    writer: WriteHalf<DuplexStream>,
    decoder: Decoder,
    /// Emit frames with the leading sync marker.
    marked: bool,
}

pub struct Harness {
    pub conn: Arc<Connection>,
    pub read_loop: JoinHandle<Result<(), ClientError>>,
    pub device: Device,
}

/// Connects a host to a fresh emulated device.
pub fn connect(config: ControllerConfig) -> Harness {
    let marked = config.inbound_sync_marker;
    let (host, far) = tokio::io::duplex(64 * 1024);
    let (conn, read_loop) = Connection::attach(config, host);
    let (reader, writer) = tokio::io::split(far);

    Harness {
        conn,
        read_loop,
        device: Device {
            reader,
            writer,
            // Host frames always carry the marker.
            decoder: Decoder::with_sync_marker(),
            marked,
        },
    }
}

impl Device {
    /// Waits for the next command sent by the host.
    pub async fn next_request(&mut self) -> Packet {
        let mut buf = [0u8; 1024];
        loop {
            if let Some(packet) = self.decoder.decode_packet() {
                return packet;
            }
            let n = self.reader.read(&mut buf).await.unwrap();
            assert!(n > 0, "host closed the transport");
            self.decoder.extend(&buf[..n]);
        }
    }

    pub async fn send(&mut self, packet: Packet) {
        let encoded = if self.marked {
            packet.encode().unwrap()
        } else {
            packet.encode_without_sync().unwrap()
        };
        self.write_raw(&encoded).await;
    }

    pub async fn write_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Answers a value request: echoed id followed by the encoded value.
    pub async fn reply_value<T: Serialize + ?Sized>(
        &mut self,
        category: CommandCategory,
        id: ValueId,
        val: &T,
    ) {
        self.send(Packet::new(category, value_payload(id, val))).await;
    }

    pub async fn reply_error(&mut self, category: CommandCategory, message: &str) {
        self.send(Packet::error(category, value::to_vec(message).unwrap()))
            .await;
    }

    pub async fn log(&mut self, line: &str) {
        self.send(Packet::new(CommandCategory::Log, value::to_vec(line).unwrap()))
            .await;
    }

    pub async fn blackbox<T: Serialize + ?Sized>(&mut self, record: &T) {
        self.send(Packet::new(
            CommandCategory::Blackbox,
            value::to_vec(record).unwrap(),
        ))
        .await;
    }

    /// Reads until the host shuts down its write side, returning how many
    /// bytes arrived that were not already decoded.
    pub async fn read_to_eof(&mut self) -> usize {
        let mut rest = Vec::new();
        self.reader.read_to_end(&mut rest).await.unwrap();
        rest.len()
    }

    /// Closes the device's write side; the host sees end of stream.
    pub async fn hang_up(&mut self) {
        let _ = self.writer.shutdown().await;
    }

    /// Runs a device that stores every value it is sent and answers Get
    /// requests from that store, until the host hangs up.
    pub fn spawn_store(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut store: HashMap<u8, Bytes> = HashMap::new();
            let mut buf = [0u8; 1024];
            loop {
                let packet = match self.decoder.decode_packet() {
                    Some(packet) => packet,
                    None => match self.reader.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            self.decoder.extend(&buf[..n]);
                            continue;
                        }
                    },
                };

                let mut cursor = &packet.payload[..];
                let id: u8 = value::read_next(&mut cursor).unwrap();
                let id_bytes = value::to_vec(&id).unwrap();

                match packet.category {
                    CommandCategory::Set => {
                        store.insert(id, Bytes::copy_from_slice(cursor));
                        self.send(Packet::new(CommandCategory::Set, packet.payload.clone()))
                            .await;
                    }
                    CommandCategory::Get => match store.get(&id) {
                        Some(stored) => {
                            let payload = [&id_bytes[..], &stored[..]].concat();
                            self.send(Packet::new(CommandCategory::Get, payload)).await;
                        }
                        None => self.reply_error(CommandCategory::Get, "value not set").await,
                    },
                    other => self.reply_error(other, "unsupported").await,
                }
            }
        })
    }
}

pub fn value_payload<T: Serialize + ?Sized>(id: ValueId, val: &T) -> Vec<u8> {
    let mut payload = value::to_vec(&id).unwrap();
    value::append(&mut payload, val).unwrap();
    payload
}

/// Reads the value id at the front of a request payload.
pub fn requested_id(packet: &Packet) -> ValueId {
    value::from_slice(&packet.payload).unwrap()
}
