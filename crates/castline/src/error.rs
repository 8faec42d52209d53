//! Request-level errors and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::persist::PersistError;

/// The only content type accepted on `/stream`.
pub const AUDIO_MPEG: &str = "audio/mpeg";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid Content-Type {found:?}. Expected audio/mpeg")]
    InvalidContentType { found: Option<String> },

    #[error("A stream session is already active")]
    SessionAlreadyActive,

    #[error("No active stream session")]
    SessionNotActive,

    #[error("Failed to process audio chunk: {0}")]
    BufferAppend(String),

    #[error("Failed to save audio data: {0}")]
    Persist(#[from] PersistError),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::InvalidContentType { .. }
            | RelayError::SessionAlreadyActive
            | RelayError::SessionNotActive => StatusCode::BAD_REQUEST,
            RelayError::BufferAppend(_) | RelayError::Persist(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_client_errors_are_400() {
        for err in [
            RelayError::InvalidContentType { found: None },
            RelayError::SessionAlreadyActive,
            RelayError::SessionNotActive,
        ] {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_persist_errors_are_500() {
        let err: RelayError = PersistError::Write {
            path: PathBuf::from("broadcast_x.mp3"),
            source: std::io::Error::other("disk full"),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("disk full"));
        assert!(err.to_string().starts_with("Failed to save audio data"));
    }

    #[test]
    fn test_content_type_message_names_expected_type() {
        let err = RelayError::InvalidContentType {
            found: Some("text/plain".into()),
        };
        assert!(err.to_string().contains("audio/mpeg"));
        assert!(err.to_string().contains("text/plain"));
    }
}
