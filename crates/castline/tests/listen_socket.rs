//! `/listen` over a real socket: a bound server, a websocket client, and
//! chunks pushed through the session.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use castline::session::{SessionHandle, SessionOptions};
use castline::web::{self, AppState};
use castline::FilePersister;
use futures::{SinkExt, StreamExt};
use tempfile::TempDir;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const MPEG: Option<&str> = Some("audio/mpeg");
const WAIT: Duration = Duration::from_secs(5);

async fn serve(session: SessionHandle) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = web::router(AppState::new(session), 64 * 1024);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// The socket registers after the upgrade completes, so poll for it.
async fn wait_for_listeners(session: &SessionHandle, n: usize) {
    timeout(WAIT, async {
        while session.listeners().len() != n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("expected {n} listeners"));
}

#[tokio::test]
async fn test_listener_gets_binary_frames_in_order() {
    let temp = TempDir::new().unwrap();
    let (session, _task) =
        SessionHandle::spawn(SessionOptions::default(), FilePersister::new(temp.path()));
    let addr = serve(session.clone()).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/listen")).await.unwrap();
    wait_for_listeners(&session, 1).await;

    session.start().await.unwrap();
    for chunk in [&b"C1"[..], &b"C2"[..], &b"C3"[..]] {
        let receipt = session
            .ingest(Bytes::copy_from_slice(chunk), MPEG)
            .await
            .unwrap();
        assert_eq!(receipt.delivered, 1);
    }

    let mut frames = Vec::new();
    while frames.len() < 3 {
        let message = timeout(WAIT, ws.next())
            .await
            .expect("frame within timeout")
            .expect("socket open")
            .unwrap();
        match message {
            Message::Binary(data) => frames.push(data.to_vec()),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected message: {other:?}"),
        }
    }
    assert_eq!(frames, vec![b"C1".to_vec(), b"C2".to_vec(), b"C3".to_vec()]);
}

#[tokio::test]
async fn test_closed_socket_unsubscribes() {
    let temp = TempDir::new().unwrap();
    let (session, _task) =
        SessionHandle::spawn(SessionOptions::default(), FilePersister::new(temp.path()));
    let addr = serve(session.clone()).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/listen")).await.unwrap();
    wait_for_listeners(&session, 1).await;

    ws.close(None).await.unwrap();
    wait_for_listeners(&session, 0).await;

    session.start().await.unwrap();
    let receipt = session.ingest(Bytes::from_static(b"C1"), MPEG).await.unwrap();
    assert_eq!(receipt.delivered, 0);
}
