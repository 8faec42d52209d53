//! HTTP surface: ingest lifecycle, live listening, status.
//!
//! - `POST /start-stream` - begin a session
//! - `POST /stream` - one `audio/mpeg` chunk per request
//! - `POST /end-stream` - final flush, deactivate
//! - `GET /listen` - websocket; every ingested chunk as a binary frame
//! - `GET /status`, `GET /health`

use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        DefaultBodyLimit, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::error::RelayError;
use crate::session::{SessionHandle, SessionStatus};

const TRACEPARENT: &str = "traceparent";

#[derive(Clone)]
pub struct AppState {
    pub session: SessionHandle,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(session: SessionHandle) -> Self {
        Self {
            session,
            started_at: Instant::now(),
        }
    }
}

pub fn router(state: AppState, max_chunk_bytes: usize) -> Router {
    Router::new()
        .route("/start-stream", post(start_stream))
        .route("/stream", post(ingest_chunk))
        .route("/end-stream", post(end_stream))
        .route("/listen", get(listen_ws))
        .route("/status", get(status))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_chunk_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn start_stream(State(state): State<AppState>) -> Result<impl IntoResponse, RelayError> {
    let receipt = state.session.start().await?;
    Ok((
        StatusCode::OK,
        format!("Stream started, recording to {}", receipt.file_name),
    ))
}

async fn ingest_chunk(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, RelayError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let traceparent = headers.get(TRACEPARENT).and_then(|v| v.to_str().ok());
    let span = crate::span_with_parent!(traceparent, "ingest_chunk", bytes = body.len());

    async move {
        let receipt = state.session.ingest(body, content_type.as_deref()).await?;
        tracing::trace!(
            buffered = receipt.buffered_bytes,
            delivered = receipt.delivered,
            "chunk accepted"
        );
        Ok::<_, RelayError>(StatusCode::OK)
    }
    .instrument(span)
    .await
}

async fn end_stream(State(state): State<AppState>) -> Result<impl IntoResponse, RelayError> {
    let receipt = state.session.end().await?;
    let message = match receipt.saved {
        Some(path) => format!("Stream ended, saved {}", path.display()),
        None => "Stream ended, nothing to save".to_string(),
    };
    Ok((StatusCode::OK, message))
}

async fn status(State(state): State<AppState>) -> Result<Json<SessionStatus>, RelayError> {
    Ok(Json(state.session.status().await?))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "listeners": state.session.listeners().len(),
    }))
}

async fn listen_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_listener(socket, state.session))
}

/// Pump chunks to one websocket until either side goes away.
async fn handle_listener(socket: WebSocket, session: SessionHandle) {
    let mut listener = session.listen();
    let id = listener.id();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            frame = listener.recv() => {
                let Some(chunk) = frame else {
                    // Registry dropped us (queue overflowed)
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                };
                if sender.send(Message::Binary(chunk)).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::debug!(listener = %id, "listen socket closed");
    // Dropping `listener` unsubscribes it
}
