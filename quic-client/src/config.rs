//! Controller configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via QUIC_CONFIG)
//! 3. Environment variables

use crate::sink::OverflowPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default request timeout (30 seconds).
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default capacity of the log and blackbox sinks.
pub const DEFAULT_SINK_CAPACITY: usize = 100;

/// Default read buffer size (4 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4 * 1024;

/// Minimum read buffer size.
pub const MIN_READ_BUFFER_SIZE: usize = 64;

/// Maximum read buffer size (64 KiB, one maximal frame).
pub const MAX_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Default number of frames the write queue holds before senders wait.
pub const DEFAULT_WRITE_QUEUE_CAPACITY: usize = 64;

/// Connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// How long a request waits for its response.
    pub request_timeout_ms: u64,
    /// Frames buffered for the transport writer.
    pub write_queue_capacity: usize,
    /// Read buffer size for transport reads.
    pub read_buffer_size: usize,
    /// Inbound frames still carry the sync marker and the decoder must find
    /// it. When false the transport reader has already stripped it.
    pub inbound_sync_marker: bool,
    /// Device log sink.
    pub log: SinkConfig,
    /// Blackbox telemetry sink.
    pub blackbox: SinkConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            write_queue_capacity: DEFAULT_WRITE_QUEUE_CAPACITY,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            inbound_sync_marker: false,
            log: SinkConfig::default(),
            blackbox: SinkConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("QUIC_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ControllerConfig =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(config.clamped())
    }

    fn apply_env_overrides(&mut self) {
        if let Some(ms) = env_parse("QUIC_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = ms;
        }
        if let Some(n) = env_parse::<usize>("QUIC_WRITE_QUEUE_CAPACITY") {
            self.write_queue_capacity = n.max(1);
        }
        if let Some(size) = env_parse::<usize>("QUIC_READ_BUFFER_SIZE") {
            self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        }
        if let Ok(sync) = std::env::var("QUIC_INBOUND_SYNC_MARKER") {
            self.inbound_sync_marker = sync == "1" || sync.to_lowercase() == "true";
        }
        self.log.apply_env_overrides("QUIC_LOG");
        self.blackbox.apply_env_overrides("QUIC_BLACKBOX");
    }

    /// Raises or lowers out-of-range fields to their limits.
    pub(crate) fn clamped(mut self) -> Self {
        self.read_buffer_size = self
            .read_buffer_size
            .clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self.write_queue_capacity = self.write_queue_capacity.max(1);
        self.log.capacity = self.log.capacity.max(1);
        self.blackbox.capacity = self.blackbox.capacity.max(1);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_write_queue_capacity(mut self, capacity: usize) -> Self {
        self.write_queue_capacity = capacity.max(1);
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    pub fn with_inbound_sync_marker(mut self, enabled: bool) -> Self {
        self.inbound_sync_marker = enabled;
        self
    }

    pub fn with_log_sink(mut self, sink: SinkConfig) -> Self {
        self.log = sink;
        self
    }

    pub fn with_blackbox_sink(mut self, sink: SinkConfig) -> Self {
        self.blackbox = sink;
        self
    }
}

/// Capacity and overflow behaviour of a stream sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_SINK_CAPACITY,
            overflow: OverflowPolicy::Block,
        }
    }
}

impl SinkConfig {
    pub fn new(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            capacity: capacity.max(1),
            overflow,
        }
    }

    fn apply_env_overrides(&mut self, prefix: &str) {
        if let Some(n) = env_parse::<usize>(&format!("{prefix}_CAPACITY")) {
            self.capacity = n.max(1);
        }
        if let Ok(policy) = std::env::var(format!("{prefix}_OVERFLOW")) {
            match policy.parse() {
                Ok(p) => self.overflow = p,
                Err(e) => tracing::warn!("ignoring {}_OVERFLOW: {}", prefix, e),
            }
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{}': {message}", .path.display())]
    Parse { path: PathBuf, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ControllerConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.log.capacity, 100);
        assert_eq!(config.blackbox.capacity, 100);
        assert_eq!(config.log.overflow, OverflowPolicy::Block);
        assert!(!config.inbound_sync_marker);
    }

    #[test]
    fn test_buffer_clamping() {
        let config = ControllerConfig::new().with_read_buffer_size(1);
        assert_eq!(config.read_buffer_size, MIN_READ_BUFFER_SIZE);

        let config = ControllerConfig::new().with_read_buffer_size(10 * 1024 * 1024);
        assert_eq!(config.read_buffer_size, MAX_READ_BUFFER_SIZE);
    }

    #[test]
    fn test_builders() {
        let config = ControllerConfig::new()
            .with_request_timeout(Duration::from_millis(1500))
            .with_inbound_sync_marker(true)
            .with_log_sink(SinkConfig::new(0, OverflowPolicy::DropOldest));

        assert_eq!(config.request_timeout_ms, 1500);
        assert!(config.inbound_sync_marker);
        assert_eq!(config.log.capacity, 1);
        assert_eq!(config.log.overflow, OverflowPolicy::DropOldest);
    }

    #[test]
    fn test_from_file_partial_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "request_timeout_ms: 5000\nlog:\n  overflow: drop_newest\nblackbox:\n  capacity: 10\n  overflow: drop_oldest"
        )
        .unwrap();

        let config = ControllerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.log.capacity, DEFAULT_SINK_CAPACITY);
        assert_eq!(config.log.overflow, OverflowPolicy::DropNewest);
        assert_eq!(config.blackbox.capacity, 10);
        assert_eq!(config.blackbox.overflow, OverflowPolicy::DropOldest);
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
    }

    #[test]
    fn test_from_file_missing() {
        let result = ControllerConfig::from_file("/nonexistent/quic.yaml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_from_file_invalid_policy() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log:\n  overflow: sometimes").unwrap();

        let result = ControllerConfig::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = ControllerConfig::default().with_blackbox_sink(SinkConfig::new(
            25,
            OverflowPolicy::DropNewest,
        ));
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: ControllerConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.blackbox, config.blackbox);
        assert_eq!(parsed.request_timeout_ms, config.request_timeout_ms);
    }
}
