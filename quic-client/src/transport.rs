//! Outbound side of the byte transport.
//!
//! Every encoded frame goes through a bounded [`WriteQueue`] so that requests
//! from many tasks reach the device in the order they were enqueued, each
//! frame written whole.

use crate::error::ClientError;
use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};

/// Handle for enqueuing encoded frames.
#[derive(Clone)]
pub struct WriteQueue {
    tx: mpsc::Sender<Bytes>,
}

impl WriteQueue {
    /// Creates a queue and the receiver a writer task drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueues one frame, waiting while the queue is full.
    pub async fn send(&self, frame: Bytes) -> Result<(), ClientError> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| ClientError::ConnectionClosed)
    }

    /// Returns whether the writer side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Resolves once `closing` holds `true`. A dropped sender never closes.
pub(crate) async fn closed(closing: &mut watch::Receiver<bool>) {
    loop {
        let done = *closing.borrow_and_update();
        if done {
            return;
        }
        if closing.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Drains the queue into `writer` until every [`WriteQueue`] is dropped,
/// `closing` turns `true`, or a write fails. The writer is shut down on a
/// clean exit so the device sees end of stream.
pub async fn write_loop<W>(
    mut rx: mpsc::Receiver<Bytes>,
    mut writer: W,
    mut closing: watch::Receiver<bool>,
) -> Result<(), ClientError>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = closed(&mut closing) => {
                tracing::debug!("write_loop: connection closed");
                break;
            }
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => {
                    tracing::debug!("write_loop: queue closed");
                    break;
                }
            },
        };

        if let Err(e) = writer.write_all(&frame).await {
            tracing::debug!("write_loop: write failed: {}", e);
            rx.close();
            return Err(ClientError::Io(e));
        }
        writer.flush().await?;
    }

    rx.close();
    let _ = writer.shutdown().await;
    Ok(())
}
