//! Time-driven flush decision.
//!
//! Evaluated on every ingest before the new chunk is appended; there is no
//! background timer, so an idle session holds its buffer until the next
//! chunk or an explicit end.

use std::time::Duration;

/// Default rotation interval.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushDecision {
    /// Keep accumulating into the current segment.
    Keep,
    /// Detach the buffer and persist it as a finished segment.
    Flush,
    /// Interval elapsed with nothing buffered: restart the segment clock only.
    ResetClock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    interval: Duration,
}

impl FlushPolicy {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn evaluate(&self, buffer_is_empty: bool, since_last_flush: Duration) -> FlushDecision {
        if since_last_flush < self.interval {
            FlushDecision::Keep
        } else if buffer_is_empty {
            FlushDecision::ResetClock
        } else {
            FlushDecision::Flush
        }
    }
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_INTERVAL)
    }
}
