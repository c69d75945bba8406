//! Routing of decoded packets.

use crate::config::ControllerConfig;
use crate::correlator::{Correlator, Offer};
use crate::sink::{PushOutcome, StreamSink};
use quic_protocol::{value, BlackboxRecord, CommandCategory, Packet};

/// What happened to a dispatched packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Log(PushOutcome),
    Blackbox(PushOutcome),
    /// Handed to the request waiting on this category.
    Delivered(CommandCategory),
    /// No request was waiting on this category.
    Dropped(CommandCategory),
    /// A log or blackbox payload that could not be decoded.
    Malformed(CommandCategory),
}

/// Sends each inbound packet to a stream sink or to its correlation bucket.
pub struct Dispatcher {
    correlator: Correlator,
    log: StreamSink<String>,
    blackbox: StreamSink<BlackboxRecord>,
}

impl Dispatcher {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            correlator: Correlator::new(),
            log: StreamSink::new(config.log.capacity, config.log.overflow),
            blackbox: StreamSink::new(config.blackbox.capacity, config.blackbox.overflow),
        }
    }

    pub async fn dispatch(&self, packet: Packet) -> Dispatched {
        let category = packet.category;
        if category != CommandCategory::Blackbox {
            tracing::debug!(
                "<- {} flag={:?} ({} bytes)",
                category,
                packet.flag,
                packet.payload.len()
            );
        }

        match category {
            CommandCategory::Log => match value::from_slice::<String>(&packet.payload) {
                Ok(line) => Dispatched::Log(self.log.push(line).await),
                Err(e) => {
                    tracing::warn!("skipping undecodable log frame: {}", e);
                    Dispatched::Malformed(category)
                }
            },
            CommandCategory::Blackbox => match BlackboxRecord::decode(&packet.payload) {
                Ok(record) => Dispatched::Blackbox(self.blackbox.push(record).await),
                Err(e) => {
                    tracing::warn!("skipping undecodable blackbox frame: {}", e);
                    Dispatched::Malformed(category)
                }
            },
            _ => match self.correlator.offer(packet) {
                Offer::Delivered => Dispatched::Delivered(category),
                Offer::Dropped => Dispatched::Dropped(category),
            },
        }
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    pub fn log(&self) -> &StreamSink<String> {
        &self.log
    }

    pub fn blackbox(&self) -> &StreamSink<BlackboxRecord> {
        &self.blackbox
    }
}
