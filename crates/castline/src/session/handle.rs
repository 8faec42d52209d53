//! Cheap, cloneable front door to the session actor.
//!
//! Handlers own a `SessionHandle`; every call is a message to the actor plus
//! a `oneshot` reply. Segments the actor rotates out come back here and are
//! written to disk after the actor has already moved on to the next command.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::{RelayError, AUDIO_MPEG};
use crate::listeners::{Listener, ListenerRegistry};
use crate::persist::{FilePersister, PersistError};

use super::actor::SessionActor;
use super::types::{
    EndReceipt, IngestReceipt, Segment, SessionCommand, SessionOptions, SessionStatus,
    StartReceipt, CHANNEL_CAPACITY,
};

#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
    listeners: Arc<ListenerRegistry>,
    persister: FilePersister,
}

impl SessionHandle {
    /// Spawn the session actor. The actor stops once every handle is dropped.
    pub fn spawn(options: SessionOptions, persister: FilePersister) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let listeners = ListenerRegistry::new_shared(options.listener_queue);
        let actor = SessionActor::new(options, listeners.clone(), persister.clone(), rx);
        let task = tokio::spawn(actor.run());

        (
            Self {
                tx,
                listeners,
                persister,
            },
            task,
        )
    }

    pub async fn start(&self) -> Result<StartReceipt, RelayError> {
        let outcome = self
            .request(|reply| SessionCommand::Start { reply })
            .await??;
        Ok(StartReceipt {
            file_name: outcome.file_name,
        })
    }

    /// Append one chunk. The content type is checked before the actor sees
    /// the chunk, so a rejected chunk is never buffered nor broadcast.
    ///
    /// If this chunk triggered a rotation and writing the rotated segment
    /// fails, the error is returned even though the chunk itself was
    /// accepted into the new segment.
    pub async fn ingest(
        &self,
        chunk: Bytes,
        content_type: Option<&str>,
    ) -> Result<IngestReceipt, RelayError> {
        check_content_type(content_type)?;

        let outcome = self
            .request(|reply| SessionCommand::Ingest { chunk, reply })
            .await??;

        let flushed = match outcome.flushed {
            Some(segment) => self.persist_detached(segment).await?,
            None => None,
        };

        Ok(IngestReceipt {
            started: outcome.started,
            buffered_bytes: outcome.buffered_bytes,
            delivered: outcome.delivered,
            flushed,
        })
    }

    /// Deactivate the session and write whatever is still buffered.
    pub async fn end(&self) -> Result<EndReceipt, RelayError> {
        let outcome = self.request(|reply| SessionCommand::End { reply }).await??;
        let saved = self.persist_detached(outcome.segment).await?;
        Ok(EndReceipt {
            saved,
            bytes_ingested: outcome.bytes_ingested,
        })
    }

    pub async fn status(&self) -> Result<SessionStatus, RelayError> {
        self.request(|reply| SessionCommand::Status { reply }).await
    }

    /// Register a new listener for live chunks.
    pub fn listen(&self) -> Listener {
        self.listeners.connect()
    }

    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    /// End an active session during shutdown so buffered audio is kept.
    pub async fn shutdown(&self) -> Result<Option<EndReceipt>, RelayError> {
        match self.end().await {
            Ok(receipt) => {
                info!(saved = ?receipt.saved, "flushed active session on shutdown");
                Ok(Some(receipt))
            }
            Err(RelayError::SessionNotActive) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, RelayError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| RelayError::BufferAppend("session actor unavailable".into()))?;
        reply_rx
            .await
            .map_err(|_| RelayError::BufferAppend("session actor dropped the request".into()))
    }

    /// Write a detached segment on its own task so a cancelled request
    /// cannot abandon the write halfway.
    async fn persist_detached(&self, segment: Segment) -> Result<Option<PathBuf>, RelayError> {
        let persister = self.persister.clone();
        let path = persister.dir().join(&segment.file_name);
        let bytes = segment.bytes.len();

        let result = tokio::spawn(async move { persister.persist(&segment).await })
            .await
            .unwrap_or_else(|join_err| {
                Err(PersistError::Write {
                    path: path.clone(),
                    source: std::io::Error::other(join_err.to_string()),
                })
            });

        result.map_err(|e| {
            error!(error = %e, bytes, "segment lost: persist failed");
            RelayError::from(e)
        })
    }
}

pub fn check_content_type(content_type: Option<&str>) -> Result<(), RelayError> {
    match content_type {
        Some(AUDIO_MPEG) => Ok(()),
        other => Err(RelayError::InvalidContentType {
            found: other.map(str::to_string),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_content_type() {
        assert!(check_content_type(Some("audio/mpeg")).is_ok());
        assert!(matches!(
            check_content_type(Some("audio/wav")),
            Err(RelayError::InvalidContentType { found: Some(_) })
        ));
        assert!(matches!(
            check_content_type(None),
            Err(RelayError::InvalidContentType { found: None })
        ));
    }
}
