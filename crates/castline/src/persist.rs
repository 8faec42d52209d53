//! Segment persistence - one flat file per flushed segment.
//!
//! Files are created with create-new semantics so an existing recording is
//! never overwritten. When the name is already taken (for example by a
//! previous run within the same second) a numbered variant is used instead.
//! A failed write loses that segment; there is no partial-write recovery.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::naming;
use crate::session::Segment;

/// Numbered variants tried before giving up on a taken name.
const MAX_NAME_ATTEMPTS: u32 = 100;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to create file {path}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write to file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl PersistError {
    pub fn path(&self) -> &Path {
        match self {
            PersistError::Create { path, .. } | PersistError::Write { path, .. } => path,
        }
    }
}

/// Writes detached segments into a recordings directory.
#[derive(Debug, Clone)]
pub struct FilePersister {
    dir: PathBuf,
}

impl FilePersister {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the recordings directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `segment` to `<dir>/<file_name>`.
    ///
    /// Returns the path written. Empty segments are skipped and yield `None`.
    pub async fn persist(&self, segment: &Segment) -> Result<Option<PathBuf>, PersistError> {
        if segment.bytes.is_empty() {
            debug!(file = %segment.file_name, "skipping empty segment");
            return Ok(None);
        }

        let (path, mut file) = self.create_unique(&segment.file_name).await?;

        let write = async {
            file.write_all(&segment.bytes).await?;
            file.sync_all().await
        };
        write.await.map_err(|source| PersistError::Write {
            path: path.clone(),
            source,
        })?;

        let span_ms = (chrono::Local::now() - segment.started_at).num_milliseconds();
        info!(
            path = %path.display(),
            bytes = segment.bytes.len(),
            started_at = %segment.started_at.format("%H:%M:%S%.3f"),
            span_ms,
            "saved audio segment"
        );

        Ok(Some(path))
    }

    async fn create_unique(
        &self,
        file_name: &str,
    ) -> Result<(PathBuf, tokio::fs::File), PersistError> {
        let mut path = self.dir.join(file_name);

        for attempt in 0..MAX_NAME_ATTEMPTS {
            if attempt > 0 {
                path = self.dir.join(naming::with_suffix(file_name, attempt));
            }

            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    if attempt > 0 {
                        warn!(
                            wanted = file_name,
                            path = %path.display(),
                            "segment name taken, wrote numbered variant"
                        );
                    }
                    return Ok((path, file));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(PersistError::Create { path, source }),
            }
        }

        Err(PersistError::Create {
            path,
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "no free segment name",
            ),
        })
    }
}
