//! # quic-client
//!
//! Controller side of the flight-controller device protocol.
//!
//! This crate provides:
//! - A connection over any async duplex byte stream, with a single read loop
//! - Request/response correlation by command category, with timeout
//! - Bounded device log and blackbox telemetry streams
//! - Typed get/set of configuration values

pub mod client;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod dispatch;
pub mod error;
pub mod sink;
pub mod transport;

pub use client::Client;
pub use config::{ConfigError, ControllerConfig, SinkConfig};
pub use connection::Connection;
pub use dispatch::Dispatched;
pub use error::ClientError;
pub use sink::{OverflowPolicy, PushOutcome, StreamSink};
pub use transport::WriteQueue;
