//! Request/response correlation by command category.
//!
//! The device protocol has no request ids: a response is matched to its
//! request purely by category. Each category owns a single-slot bucket. A
//! request holds the bucket's in-flight lock for the whole exchange, so at
//! most one request per category is outstanding and a response can never be
//! handed to the wrong caller.

use crate::error::ClientError;
use crate::transport::WriteQueue;
use bytes::Bytes;
use dashmap::DashMap;
use quic_protocol::{CommandCategory, Packet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Result of offering an inbound packet to its bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Delivered,
    /// Nobody was waiting; the packet was discarded.
    Dropped,
}

#[derive(Default)]
struct Bucket {
    inflight: tokio::sync::Mutex<()>,
    waiter: parking_lot::Mutex<Option<oneshot::Sender<Packet>>>,
}

/// Per-connection table of correlation buckets.
#[derive(Default)]
pub struct Correlator {
    buckets: DashMap<u8, Arc<Bucket>>,
    closed: AtomicBool,
    dropped: AtomicU64,
}

/// Disarms a bucket when the waiting call ends, however it ends.
struct Armed<'a> {
    bucket: &'a Bucket,
}

impl Drop for Armed<'_> {
    fn drop(&mut self) {
        self.bucket.waiter.lock().take();
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket(&self, category: CommandCategory) -> Arc<Bucket> {
        self.buckets
            .entry(category.bits())
            .or_default()
            .value()
            .clone()
    }

    /// Sends `frame` and waits for the response of the same category.
    pub async fn exchange(
        &self,
        category: CommandCategory,
        frame: Bytes,
        writer: &WriteQueue,
        timeout: Duration,
    ) -> Result<Packet, ClientError> {
        let bucket = self.bucket(category);
        let _inflight = bucket.inflight.lock().await;

        let rx = {
            let mut waiter = bucket.waiter.lock();
            if self.closed.load(Ordering::SeqCst) {
                return Err(ClientError::ConnectionClosed);
            }
            let (tx, rx) = oneshot::channel();
            *waiter = Some(tx);
            rx
        };
        let _armed = Armed { bucket: &bucket };

        tracing::debug!("-> {} ({} bytes)", category, frame.len());
        writer.send(frame).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(packet)) => Ok(packet),
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                tracing::debug!("{} request timed out after {:?}", category, timeout);
                Err(ClientError::Timeout { category, timeout })
            }
        }
    }

    /// Hands `packet` to the waiter of its category without blocking.
    pub fn offer(&self, packet: Packet) -> Offer {
        let category = packet.category;
        let waiter = match self.buckets.get(&category.bits()) {
            Some(bucket) => bucket.waiter.lock().take(),
            None => None,
        };

        match waiter {
            Some(tx) => match tx.send(packet) {
                Ok(()) => Offer::Delivered,
                Err(_) => self.drop_response(category),
            },
            None => self.drop_response(category),
        }
    }

    fn drop_response(&self, category: CommandCategory) -> Offer {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("no waiter for {} response, dropped", category);
        Offer::Dropped
    }

    /// Fails every armed waiter with `ConnectionClosed` and refuses new ones.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for bucket in self.buckets.iter() {
            bucket.waiter.lock().take();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of buckets with an armed waiter.
    pub fn pending_count(&self) -> usize {
        self.buckets
            .iter()
            .filter(|bucket| bucket.waiter.lock().is_some())
            .count()
    }

    /// Number of responses discarded because nobody was waiting.
    pub fn dropped_responses(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
