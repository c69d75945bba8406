//! Connection management.

use crate::config::ControllerConfig;
use crate::dispatch::Dispatcher;
use crate::error::ClientError;
use crate::sink::StreamSink;
use crate::transport::{closed, write_loop, WriteQueue};
use bytes::Bytes;
use quic_protocol::{value, BlackboxRecord, CommandCategory, Decoder, Encoder, Packet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A connection to a flight controller over an open byte transport.
pub struct Connection {
    config: ControllerConfig,
    /// Queue feeding the transport writer.
    writer: WriteQueue,
    dispatcher: Dispatcher,
    /// Is the read side still alive?
    connected: AtomicBool,
    /// Flips to `true` once; stops the read loop and the writer task.
    closing: watch::Sender<bool>,
}

impl Connection {
    /// Creates a connection that writes through `writer`. The caller drives
    /// [`Connection::read_loop`] with the read side of the transport.
    pub fn new(config: ControllerConfig, writer: WriteQueue) -> Self {
        let config = config.clamped();
        let dispatcher = Dispatcher::new(&config);
        let (closing, _) = watch::channel(false);
        Self {
            config,
            writer,
            dispatcher,
            connected: AtomicBool::new(true),
            closing,
        }
    }

    /// Takes over a duplex transport: spawns the writer task and the read
    /// loop. The returned handle resolves when the read loop ends. Once the
    /// connection is closed or the read loop ends, both tasks release their
    /// half of the transport and the device sees end of stream.
    pub fn attach<T>(
        config: ControllerConfig,
        io: T,
    ) -> (Arc<Self>, JoinHandle<Result<(), ClientError>>)
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(io);
        let (writer, rx) = WriteQueue::channel(config.write_queue_capacity);
        let conn = Arc::new(Self::new(config, writer));

        let closing = conn.close_signal();
        tokio::spawn(async move {
            if let Err(e) = write_loop(rx, write_half, closing).await {
                tracing::debug!("writer task ended: {}", e);
            }
        });

        let reader = conn.clone();
        let handle = tokio::spawn(async move { reader.read_loop(read_half).await });

        (conn, handle)
    }

    /// Sends a command and waits for the device's response of the same
    /// category.
    ///
    /// A response carrying the error flag is turned into
    /// [`ClientError::Device`] with the device's message.
    pub async fn send(
        &self,
        category: CommandCategory,
        payload: impl Into<Bytes>,
    ) -> Result<Packet, ClientError> {
        // Other(3) and Log share wire bits; key everything by the decoded form.
        let category = CommandCategory::from_bits(category.bits());
        if category.is_stream() {
            return Err(ClientError::UnsupportedCategory(category));
        }
        if !self.is_connected() {
            tracing::debug!("send() called but not connected");
            return Err(ClientError::NotConnected);
        }

        let frame = Encoder::encode_command(category, payload)?.freeze();
        let packet = self
            .dispatcher
            .correlator()
            .exchange(category, frame, &self.writer, self.config.request_timeout())
            .await?;

        if packet.is_error() {
            let message: String = value::from_slice(&packet.payload)?;
            tracing::debug!("{} request rejected by device: {}", category, message);
            return Err(ClientError::Device(message));
        }

        Ok(packet)
    }

    /// Reads and dispatches inbound frames until the transport ends or the
    /// connection is closed.
    ///
    /// Always returns an error: `ConnectionClosed` on a clean end of stream
    /// or after [`Connection::close`], `ConnectionReset` when the stream was
    /// cut mid-frame, `Io` on a read failure. Waiting requests fail with
    /// `ConnectionClosed` either way.
    pub async fn read_loop<R>(&self, mut reader: R) -> Result<(), ClientError>
    where
        R: AsyncRead + Unpin,
    {
        tracing::debug!("read_loop started");
        let mut decoder = if self.config.inbound_sync_marker {
            Decoder::with_sync_marker()
        } else {
            Decoder::new()
        };
        let mut buf = vec![0u8; self.config.read_buffer_size];
        let mut discarded = 0;
        let mut closing = self.close_signal();

        loop {
            let read = tokio::select! {
                biased;
                _ = closed(&mut closing) => return self.closed_locally(),
                read = reader.read(&mut buf) => read,
            };
            let n = match read {
                Ok(n) => n,
                Err(e) => {
                    self.shutdown();
                    return Err(ClientError::Io(e));
                }
            };

            if n == 0 {
                self.shutdown();
                return match decoder.finish() {
                    Ok(()) => {
                        tracing::debug!("read_loop: connection closed");
                        Err(ClientError::ConnectionClosed)
                    }
                    Err(e) => {
                        tracing::error!("read_loop: stream ended mid-frame: {}", e);
                        Err(ClientError::ConnectionReset(e))
                    }
                };
            }

            decoder.extend(&buf[..n]);
            while let Some(packet) = decoder.decode_packet() {
                // A blocked sink push must not outlive a close.
                tokio::select! {
                    biased;
                    _ = closed(&mut closing) => return self.closed_locally(),
                    _ = self.dispatcher.dispatch(packet) => {}
                }
            }

            if decoder.discarded() > discarded {
                tracing::warn!(
                    "read_loop: skipped {} bytes outside frames",
                    decoder.discarded() - discarded
                );
                discarded = decoder.discarded();
            }
        }
    }

    fn shutdown(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.dispatcher.correlator().close();
        self.closing.send_replace(true);
    }

    fn closed_locally(&self) -> Result<(), ClientError> {
        tracing::debug!("read_loop: connection closed locally");
        self.shutdown();
        Err(ClientError::ConnectionClosed)
    }

    /// A receiver that turns `true` when the connection closes. Callers who
    /// drive [`write_loop`] themselves pass it there.
    pub fn close_signal(&self) -> watch::Receiver<bool> {
        self.closing.subscribe()
    }

    /// Device log lines.
    pub fn log(&self) -> &StreamSink<String> {
        self.dispatcher.log()
    }

    /// Blackbox telemetry records.
    pub fn blackbox(&self) -> &StreamSink<BlackboxRecord> {
        self.dispatcher.blackbox()
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Closes the connection. Waiting requests fail with `ConnectionClosed`,
    /// the read loop returns and the writer shuts down its half of the
    /// transport.
    pub fn close(&self) {
        tracing::debug!("Closing connection...");
        self.shutdown();
    }

    /// Returns the number of requests waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.dispatcher.correlator().pending_count()
    }

    /// Returns the number of responses that arrived with nobody waiting.
    pub fn dropped_responses(&self) -> u64 {
        self.dispatcher.correlator().dropped_responses()
    }
}
