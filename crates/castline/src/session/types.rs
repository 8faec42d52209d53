//! Types shared between the session actor and its handle.

use std::path::PathBuf;

use bytes::Bytes;
use castconf::SessionConfig;
use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::RelayError;
use crate::listeners::DEFAULT_QUEUE_DEPTH;
use crate::policy::FlushPolicy;

/// Command queue depth between request handlers and the actor.
pub const CHANNEL_CAPACITY: usize = 1024;

/// A detached buffer, ready to be written as one file.
#[derive(Debug, Clone)]
pub struct Segment {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub started_at: DateTime<Local>,
}

/// Behavior knobs for a session actor.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub policy: FlushPolicy,
    /// Start a session implicitly when a chunk arrives while inactive.
    pub auto_start: bool,
    pub listener_queue: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            policy: FlushPolicy::default(),
            auto_start: false,
            listener_queue: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl From<&SessionConfig> for SessionOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            policy: FlushPolicy::new(config.flush_interval()),
            auto_start: config.auto_start,
            listener_queue: config.listener_queue,
        }
    }
}

/// Read-only snapshot served at `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub active: bool,
    pub buffered_bytes: usize,
    pub current_file_name: Option<String>,
    pub segments_flushed: u64,
    pub bytes_ingested: u64,
    pub listeners: usize,
    pub session_age_ms: Option<u64>,
    pub since_flush_ms: Option<u64>,
    pub flush_interval_ms: u64,
}

#[derive(Debug)]
pub(crate) struct StartOutcome {
    pub file_name: String,
}

#[derive(Debug)]
pub(crate) struct IngestOutcome {
    /// Segment rotated out before this chunk was appended.
    pub flushed: Option<Segment>,
    pub started: bool,
    pub buffered_bytes: usize,
    pub delivered: usize,
}

#[derive(Debug)]
pub(crate) struct EndOutcome {
    pub segment: Segment,
    pub bytes_ingested: u64,
}

pub(crate) enum SessionCommand {
    Start {
        reply: oneshot::Sender<Result<StartOutcome, RelayError>>,
    },
    Ingest {
        chunk: Bytes,
        reply: oneshot::Sender<Result<IngestOutcome, RelayError>>,
    },
    End {
        reply: oneshot::Sender<Result<EndOutcome, RelayError>>,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
}

/// Result of a successful `start`.
#[derive(Debug, Clone, Serialize)]
pub struct StartReceipt {
    pub file_name: String,
}

/// Result of a successful `ingest`.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    /// True when this chunk implicitly started the session.
    pub started: bool,
    pub buffered_bytes: usize,
    pub delivered: usize,
    /// File written by a rotation this chunk triggered.
    pub flushed: Option<PathBuf>,
}

/// Result of a successful `end`.
#[derive(Debug, Clone, Serialize)]
pub struct EndReceipt {
    pub saved: Option<PathBuf>,
    pub bytes_ingested: u64,
}
