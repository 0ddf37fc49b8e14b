use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::transport::framing::DEFAULT_MAX_CONTENT_LENGTH;

/// Default cap on concurrently served connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// Default time in-flight connections get to finish after `stop()`.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between metrics reports.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub socket_path: PathBuf,
    pub file_path: PathBuf,
    /// Connections served at once; the accept loop waits for a free slot
    /// once this many are in flight.
    pub max_connections: usize,
    pub drain_timeout: Duration,
    pub max_content_length: usize,
    pub metrics_interval: Duration,
}

impl ServerConfig {
    pub fn new(socket_path: impl Into<PathBuf>, file_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            file_path: file_path.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            metrics_interval: DEFAULT_METRICS_INTERVAL,
        }
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        // Zero would never accept; tokio caps a semaphore at MAX_PERMITS
        self.max_connections = max.clamp(1, Semaphore::MAX_PERMITS);
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_max_content_length(mut self, max: usize) -> Self {
        self.max_content_length = max;
        self
    }

    pub fn with_metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = interval;
        self
    }
}
