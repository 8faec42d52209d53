//! Single-writer session actor.
//!
//! All buffer mutation, flush evaluation and fan-out run on one task fed by
//! an `mpsc` queue, so each ingest's evaluate/rotate/append/broadcast step is
//! atomic with respect to every other command. The actor never touches the
//! disk: rotated segments travel back to the caller in the reply.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Local;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::RelayError;
use crate::listeners::ListenerRegistry;
use crate::naming::SegmentNamer;
use crate::persist::FilePersister;
use crate::policy::{FlushDecision, FlushPolicy};

use super::types::{
    EndOutcome, IngestOutcome, Segment, SessionCommand, SessionOptions, SessionStatus,
    StartOutcome,
};

pub(crate) struct SessionActor {
    // Lifecycle
    active: bool,
    session_start: Option<Instant>,
    last_flush: Instant,

    // Current segment
    buffer: Vec<u8>,
    current_file_name: Option<String>,
    segment_started_at: chrono::DateTime<Local>,

    // Counters for the running session
    segments_flushed: u64,
    bytes_ingested: u64,

    // Configuration
    policy: FlushPolicy,
    auto_start: bool,
    namer: SegmentNamer,

    // Collaborators
    listeners: Arc<ListenerRegistry>,
    /// Only used for segments whose caller went away before the reply.
    persister: FilePersister,

    command_rx: mpsc::Receiver<SessionCommand>,
}

impl SessionActor {
    pub(crate) fn new(
        options: SessionOptions,
        listeners: Arc<ListenerRegistry>,
        persister: FilePersister,
        command_rx: mpsc::Receiver<SessionCommand>,
    ) -> Self {
        Self {
            active: false,
            session_start: None,
            last_flush: Instant::now(),
            buffer: Vec::new(),
            current_file_name: None,
            segment_started_at: Local::now(),
            segments_flushed: 0,
            bytes_ingested: 0,
            policy: options.policy,
            auto_start: options.auto_start,
            namer: SegmentNamer::new(),
            listeners,
            persister,
            command_rx,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!(
            flush_interval_ms = self.policy.interval().as_millis() as u64,
            auto_start = self.auto_start,
            "session actor started"
        );

        while let Some(command) = self.command_rx.recv().await {
            match command {
                SessionCommand::Start { reply } => {
                    let _ = reply.send(self.start());
                }
                SessionCommand::Ingest { chunk, reply } => {
                    let result = self.ingest(chunk);
                    if let Err(Ok(outcome)) = reply.send(result) {
                        self.persist_orphan(outcome.flushed);
                    }
                }
                SessionCommand::End { reply } => {
                    let result = self.end();
                    if let Err(Ok(outcome)) = reply.send(result) {
                        self.persist_orphan(Some(outcome.segment));
                    }
                }
                SessionCommand::Status { reply } => {
                    let _ = reply.send(self.status());
                }
            }
        }

        if self.active && !self.buffer.is_empty() {
            warn!(
                bytes = self.buffer.len(),
                "session actor stopping with unflushed audio"
            );
        }
        debug!("session actor stopped");
    }

    fn start(&mut self) -> Result<StartOutcome, RelayError> {
        if self.active {
            return Err(RelayError::SessionAlreadyActive);
        }

        let now = Instant::now();
        self.active = true;
        self.buffer = Vec::new();
        self.session_start = Some(now);
        self.last_flush = now;
        self.segments_flushed = 0;
        self.bytes_ingested = 0;
        let file_name = self.begin_segment();

        info!(file = %file_name, "stream session started");
        Ok(StartOutcome { file_name })
    }

    fn ingest(&mut self, chunk: Bytes) -> Result<IngestOutcome, RelayError> {
        let mut started = false;
        if !self.active {
            if !self.auto_start {
                return Err(RelayError::SessionNotActive);
            }
            self.start()?;
            started = true;
        }

        let now = Instant::now();
        let since_flush = now.saturating_duration_since(self.last_flush);
        let flushed = match self.policy.evaluate(self.buffer.is_empty(), since_flush) {
            FlushDecision::Keep => None,
            FlushDecision::Flush => Some(self.rotate(now)),
            FlushDecision::ResetClock => {
                self.rotate(now);
                None
            }
        };

        // Reserve on the buffer that receives the chunk, which after a
        // rotation is the fresh one
        if let Err(e) = reserve(&mut self.buffer, chunk.len()) {
            self.persist_orphan(flushed);
            return Err(e);
        }

        self.buffer.extend_from_slice(&chunk);
        self.bytes_ingested += chunk.len() as u64;
        let delivered = self.listeners.broadcast(&chunk);

        Ok(IngestOutcome {
            flushed,
            started,
            buffered_bytes: self.buffer.len(),
            delivered,
        })
    }

    fn end(&mut self) -> Result<EndOutcome, RelayError> {
        if !self.active {
            return Err(RelayError::SessionNotActive);
        }

        let segment = self.detach();
        if !segment.bytes.is_empty() {
            self.segments_flushed += 1;
        }
        self.active = false;
        self.session_start = None;
        self.current_file_name = None;

        info!(
            bytes_ingested = self.bytes_ingested,
            segments = self.segments_flushed,
            "stream session ended"
        );

        Ok(EndOutcome {
            segment,
            bytes_ingested: self.bytes_ingested,
        })
    }

    fn status(&self) -> SessionStatus {
        let now = Instant::now();
        SessionStatus {
            active: self.active,
            buffered_bytes: self.buffer.len(),
            current_file_name: self.current_file_name.clone(),
            segments_flushed: self.segments_flushed,
            bytes_ingested: self.bytes_ingested,
            listeners: self.listeners.len(),
            session_age_ms: self
                .session_start
                .map(|start| now.saturating_duration_since(start).as_millis() as u64),
            since_flush_ms: self
                .active
                .then(|| now.saturating_duration_since(self.last_flush).as_millis() as u64),
            flush_interval_ms: self.policy.interval().as_millis() as u64,
        }
    }

    /// Swap out the buffer and open the next segment.
    fn rotate(&mut self, now: Instant) -> Segment {
        let segment = self.detach();
        self.last_flush = now;
        let next = self.begin_segment();

        if segment.bytes.is_empty() {
            debug!(next = %next, "flush interval elapsed with empty buffer");
        } else {
            self.segments_flushed += 1;
            debug!(
                file = %segment.file_name,
                bytes = segment.bytes.len(),
                next = %next,
                "rotated segment"
            );
        }
        segment
    }

    fn detach(&mut self) -> Segment {
        Segment {
            file_name: self
                .current_file_name
                .take()
                .unwrap_or_else(|| self.namer.next_name(self.segment_started_at)),
            bytes: std::mem::take(&mut self.buffer),
            started_at: self.segment_started_at,
        }
    }

    fn begin_segment(&mut self) -> String {
        let started_at = Local::now();
        let name = self.namer.next_name(started_at);
        self.segment_started_at = started_at;
        self.current_file_name = Some(name.clone());
        name
    }

    fn persist_orphan(&self, segment: Option<Segment>) {
        let Some(segment) = segment.filter(|s| !s.bytes.is_empty()) else {
            return;
        };
        warn!(file = %segment.file_name, "persisting segment in background");
        let persister = self.persister.clone();
        tokio::spawn(async move {
            if let Err(e) = persister.persist(&segment).await {
                error!(error = %e, "failed to persist orphaned segment");
            }
        });
    }
}

fn reserve(buffer: &mut Vec<u8>, additional: usize) -> Result<(), RelayError> {
    buffer
        .try_reserve(additional)
        .map_err(|e| RelayError::BufferAppend(e.to_string()))
}
