//! HTTP surface tests
//!
//! Requests go straight through the router with `oneshot`; recordings land
//! in a temp dir per test.

use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use castline::policy::FlushPolicy;
use castline::session::{SessionHandle, SessionOptions};
use castline::web::{self, AppState};
use castline::FilePersister;
use tempfile::TempDir;
use tower::ServiceExt;

const MAX_CHUNK: usize = 64 * 1024;

struct TestApp {
    router: Router,
    session: SessionHandle,
    dir: TempDir,
}

impl TestApp {
    fn new(options: SessionOptions) -> Self {
        let dir = TempDir::new().unwrap();
        let (session, _task) = SessionHandle::spawn(options, FilePersister::new(dir.path()));
        let router = web::router(AppState::new(session.clone()), MAX_CHUNK);
        Self {
            router,
            session,
            dir,
        }
    }

    async fn post(&self, uri: &str) -> (StatusCode, String) {
        let request = Request::post(uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    async fn chunk(&self, content_type: &str, bytes: &'static [u8]) -> (StatusCode, String) {
        let request = Request::post("/stream")
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(bytes))
            .unwrap();
        self.send(request).await
    }

    async fn get(&self, uri: &str) -> (StatusCode, String) {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    fn recordings(&self) -> Vec<PathBuf> {
        let mut files: Vec<_> = std::fs::read_dir(self.dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        files.sort();
        files
    }
}

#[tokio::test]
async fn test_full_lifecycle_writes_one_file() {
    let app = TestApp::new(SessionOptions::default());

    let (status, body) = app.post("/start-stream").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("broadcast_"), "unexpected body: {body}");

    assert_eq!(app.chunk("audio/mpeg", b"AAAAA").await.0, StatusCode::OK);
    assert_eq!(app.chunk("audio/mpeg", b"BBBBB").await.0, StatusCode::OK);

    let (status, _) = app.post("/end-stream").await;
    assert_eq!(status, StatusCode::OK);

    let files = app.recordings();
    assert_eq!(files.len(), 1);
    assert_eq!(std::fs::read(&files[0]).unwrap(), b"AAAAABBBBB");
}

#[tokio::test]
async fn test_wrong_content_type_is_400() {
    let app = TestApp::new(SessionOptions::default());
    app.post("/start-stream").await;

    let (status, body) = app.chunk("text/plain", b"hello").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("audio/mpeg"));

    let snapshot = app.session.status().await.unwrap();
    assert_eq!(snapshot.buffered_bytes, 0);
}

#[tokio::test]
async fn test_missing_content_type_is_400() {
    let app = TestApp::new(SessionOptions::default());
    app.post("/start-stream").await;

    let request = Request::post("/stream")
        .body(Body::from(&b"hello"[..]))
        .unwrap();
    assert_eq!(app.send(request).await.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_lifecycle_misuse_is_400() {
    let app = TestApp::new(SessionOptions::default());

    assert_eq!(app.post("/end-stream").await.0, StatusCode::BAD_REQUEST);
    assert_eq!(app.chunk("audio/mpeg", b"x").await.0, StatusCode::BAD_REQUEST);

    assert_eq!(app.post("/start-stream").await.0, StatusCode::OK);
    assert_eq!(app.post("/start-stream").await.0, StatusCode::BAD_REQUEST);

    assert!(app.recordings().is_empty());
}

#[tokio::test]
async fn test_oversized_chunk_is_413() {
    let app = TestApp::new(SessionOptions::default());
    app.post("/start-stream").await;

    let request = Request::post("/stream")
        .header(header::CONTENT_TYPE, "audio/mpeg")
        .body(Body::from(vec![0u8; MAX_CHUNK + 1]))
        .unwrap();
    assert_eq!(app.send(request).await.0, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(app.session.status().await.unwrap().buffered_bytes, 0);
}

#[tokio::test]
async fn test_status_reports_session() {
    let app = TestApp::new(SessionOptions::default());

    let (status, body) = app.get("/status").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["active"], false);
    assert_eq!(json["flush_interval_ms"], 10_000);

    app.post("/start-stream").await;
    app.chunk("audio/mpeg", b"abc").await;

    let (_, body) = app.get("/status").await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["active"], true);
    assert_eq!(json["buffered_bytes"], 3);
    assert_eq!(json["bytes_ingested"], 3);
    assert!(json["current_file_name"]
        .as_str()
        .unwrap()
        .starts_with("broadcast_"));
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new(SessionOptions::default());
    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["listeners"], 0);
}

#[tokio::test]
async fn test_auto_start_accepts_stream_without_start() {
    let app = TestApp::new(SessionOptions {
        auto_start: true,
        ..SessionOptions::default()
    });

    assert_eq!(app.chunk("audio/mpeg", b"abc").await.0, StatusCode::OK);
    assert_eq!(app.post("/end-stream").await.0, StatusCode::OK);
    assert_eq!(app.recordings().len(), 1);
}

/// Chronological order: `broadcast_<stamp>.mp3` first, then `_1`, `_2`, ...
fn segment_order(path: &Path) -> (String, u32) {
    let name = path.file_name().unwrap().to_string_lossy();
    let stem = name
        .trim_start_matches("broadcast_")
        .trim_end_matches(".mp3")
        .to_string();
    // stamp is YYYYMMDD_HHMMSS, 15 chars
    let (stamp, rest) = stem.split_at(15);
    let repeat = rest.trim_start_matches('_').parse().unwrap_or(0);
    (stamp.to_string(), repeat)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ingest_keeps_every_chunk_exactly_once() {
    const PRODUCERS: usize = 8;
    const CHUNKS: usize = 100;
    const CHUNK_LEN: usize = 8;

    let app = TestApp::new(SessionOptions {
        policy: FlushPolicy::new(Duration::from_millis(1)),
        ..SessionOptions::default()
    });
    assert_eq!(app.post("/start-stream").await.0, StatusCode::OK);

    let mut tasks = Vec::new();
    for producer in 0..PRODUCERS {
        let router = app.router.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..CHUNKS {
                let chunk = format!("{:04}{:04}", producer, i);
                let request = Request::post("/stream")
                    .header(header::CONTENT_TYPE, "audio/mpeg")
                    .body(Body::from(chunk))
                    .unwrap();
                let response = router.clone().oneshot(request).await.unwrap();
                assert_eq!(response.status(), StatusCode::OK);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(app.post("/end-stream").await.0, StatusCode::OK);

    let mut files = app.recordings();
    files.sort_by_key(|f| segment_order(f));

    let mut stream = Vec::new();
    for file in &files {
        let bytes = std::fs::read(file).unwrap();
        assert!(!bytes.is_empty(), "{} is empty", file.display());
        // Chunks are appended whole, never split across segments
        assert_eq!(bytes.len() % CHUNK_LEN, 0, "{} splits a chunk", file.display());
        stream.extend_from_slice(&bytes);
    }
    assert_eq!(stream.len(), PRODUCERS * CHUNKS * CHUNK_LEN);

    let mut seen = std::collections::HashSet::new();
    let mut next = [0usize; PRODUCERS];
    for chunk in stream.chunks(CHUNK_LEN) {
        let text = std::str::from_utf8(chunk).unwrap();
        let producer: usize = text[..4].parse().unwrap();
        let index: usize = text[4..].parse().unwrap();

        assert!(seen.insert((producer, index)), "duplicate chunk {text}");
        assert_eq!(index, next[producer], "producer {producer} out of order");
        next[producer] += 1;
    }
    assert_eq!(seen.len(), PRODUCERS * CHUNKS);
}
