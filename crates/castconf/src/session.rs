//! Session tuning - flush cadence, lifecycle mode, listener queue depth.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Elapsed time after which the next ingest rotates the buffer to disk.
    /// Default: 10000 (10s)
    #[serde(default = "SessionConfig::default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Accept `/stream` without a prior `/start-stream` by starting a
    /// session implicitly.
    /// Default: false
    #[serde(default)]
    pub auto_start: bool,

    /// Frames queued per listener before it is considered too slow and dropped.
    /// Default: 256
    #[serde(default = "SessionConfig::default_listener_queue")]
    pub listener_queue: usize,

    /// Largest accepted chunk body in bytes.
    /// Default: 8 MiB
    #[serde(default = "SessionConfig::default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,
}

impl SessionConfig {
    fn default_flush_interval_ms() -> u64 {
        10_000
    }

    fn default_listener_queue() -> usize {
        256
    }

    fn default_max_chunk_bytes() -> usize {
        8 * 1024 * 1024
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: Self::default_flush_interval_ms(),
            auto_start: false,
            listener_queue: Self::default_listener_queue(),
            max_chunk_bytes: Self::default_max_chunk_bytes(),
        }
    }
}
