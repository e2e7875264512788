//! Stream session lifecycle against in-process WebSocket servers.
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::Response,
    routing::get,
    Router,
};
use botwatch::session::{
    reconnect_delay, SessionManager, SessionOutcome, MAX_RECONNECT_DELAY_MS,
    MIN_RECONNECT_DELAY_MS,
};
use botwatch::state::Store;
use botwatch::types::{BotStatus, ConnectionMode, EndpointConfig, StreamPhase};
use serde_json::json;

/// Serves `/ws`, running `script` on every accepted socket.
async fn serve_ws<F, Fut>(script: F) -> SocketAddr
where
    F: Fn(WebSocket) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let app = Router::new().route(
        "/ws",
        get(move |ws: WebSocketUpgrade| {
            let script = script.clone();
            async move {
                let resp: Response = ws.on_upgrade(script);
                resp
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Keeps the socket open until the client goes away.
async fn hold_open(mut socket: WebSocket) {
    while let Some(Ok(_)) = socket.recv().await {}
}

fn cfg(addr: SocketAddr, interval_ms: u64) -> EndpointConfig {
    EndpointConfig::new(&addr.to_string(), None, interval_ms, true)
}

async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[test]
fn reconnect_delay_is_clamped() {
    assert_eq!(reconnect_delay(0), Duration::from_millis(MIN_RECONNECT_DELAY_MS));
    assert_eq!(reconnect_delay(5_000), Duration::from_millis(5_000));
    assert_eq!(reconnect_delay(3_600_000), Duration::from_millis(MAX_RECONNECT_DELAY_MS));
}

#[tokio::test]
async fn connect_reaches_connected_phase() {
    let addr = serve_ws(hold_open).await;
    let store = Store::new();
    let session = SessionManager::new(store.clone());

    let outcome = session.connect(&cfg(addr, 5000)).await;
    assert_eq!(outcome, SessionOutcome::Connected);
    let state = store.connection().await;
    assert!(state.stream_connected);
    assert_eq!(state.stream_phase, StreamPhase::Connected);
    assert_eq!(state.stream_endpoint, format!("ws://{addr}/ws"));
    assert_eq!(state.mode, ConnectionMode::Remote);
    assert!(store.logs().await.iter().any(|l| l.contains("[INFO] Stream connected")));

    session.shutdown().await;
    assert!(!store.connection().await.stream_connected);
}

#[tokio::test]
async fn plain_text_frame_becomes_remote_log_line() {
    let addr = serve_ws(|mut socket: WebSocket| async move {
        let _ = socket.send(Message::Text("job finished".into())).await;
        hold_open(socket).await;
    })
    .await;
    let store = Store::new();
    let before = store.snapshot().await;
    let session = SessionManager::new(store.clone());
    session.connect(&cfg(addr, 5000)).await;

    let logged = wait_until(|| {
        let store = store.clone();
        async move { store.logs().await.iter().any(|l| l.ends_with("[REMOTE] job finished")) }
    })
    .await;
    assert!(logged);
    assert_eq!(store.snapshot().await, before);
    assert!(store.connection().await.last_event_at.is_some());
    session.shutdown().await;
}

#[tokio::test]
async fn snapshot_frames_replace_the_cache() {
    let addr = serve_ws(|mut socket: WebSocket| async move {
        let frame = json!({
            "type": "snapshot",
            "snapshot": { "status": "processing", "queue_depth": 11, "active_workers": 3 }
        });
        let _ = socket.send(Message::Text(frame.to_string())).await;
        hold_open(socket).await;
    })
    .await;
    let store = Store::new();
    let session = SessionManager::new(store.clone());
    session.connect(&cfg(addr, 5000)).await;

    let updated = wait_until(|| {
        let store = store.clone();
        async move { store.snapshot().await.status == BotStatus::Running }
    })
    .await;
    assert!(updated);
    let snap = store.snapshot().await;
    assert_eq!(snap.queue_depth, 11);
    assert_eq!(snap.active_workers, 3);
    // JSON frames without log fields add no log lines
    assert!(!store.logs().await.iter().any(|l| l.contains("[REMOTE]")));
    session.shutdown().await;
}

#[tokio::test]
async fn server_close_schedules_reconnect() {
    let addr = serve_ws(|mut socket: WebSocket| async move {
        let _ = socket.send(Message::Close(None)).await;
    })
    .await;
    let store = Store::new();
    let session = SessionManager::new(store.clone());
    session.connect(&cfg(addr, 4_000)).await;

    let scheduled = wait_until(|| {
        let session = session.clone();
        async move { session.reconnect_pending().await }
    })
    .await;
    assert!(scheduled);
    let delay = session.pending_reconnect_delay().await.unwrap();
    assert_eq!(delay, Duration::from_millis(4_000));
    assert!(delay >= Duration::from_millis(MIN_RECONNECT_DELAY_MS));
    assert!(delay <= Duration::from_millis(MAX_RECONNECT_DELAY_MS));

    let state = store.connection().await;
    assert!(state.reconnect_scheduled);
    assert_eq!(state.stream_phase, StreamPhase::Disconnected);
    assert!(store.logs().await.iter().any(|l| l.contains("Reconnecting stream in 4000ms")));

    session.shutdown().await;
    assert!(!session.reconnect_pending().await);
}

#[tokio::test]
async fn manual_disconnect_suppresses_reconnect() {
    let addr = serve_ws(hold_open).await;
    let store = Store::new();
    let session = SessionManager::new(store.clone());
    assert_eq!(session.connect(&cfg(addr, 2_000)).await, SessionOutcome::Connected);

    let state = session.disconnect().await;
    assert!(!state.stream_connected);
    assert!(!state.reconnect_scheduled);

    // Let the close handshake and close handling run.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!session.reconnect_pending().await);
    assert!(!store.connection().await.reconnect_scheduled);
    assert!(store.logs().await.iter().any(|l| l.contains("Stream disconnected by operator")));
}

#[tokio::test]
async fn refused_connect_fails_and_schedules_retry() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let store = Store::new();
    let session = SessionManager::new(store.clone());
    let outcome = session.connect(&cfg(addr, 10_000)).await;
    assert!(matches!(outcome, SessionOutcome::Failed(_)), "{outcome:?}");
    let state = store.connection().await;
    assert!(!state.stream_connected);
    assert!(state.last_error.is_some());
    assert!(session.reconnect_pending().await);
    assert_eq!(session.pending_reconnect_delay().await, Some(Duration::from_millis(10_000)));
    session.shutdown().await;
}

#[tokio::test]
async fn no_reconnect_when_auto_reconnect_is_off() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let session = SessionManager::new(Store::new());
    let cfg = EndpointConfig::new(&addr.to_string(), None, 5_000, false);
    session.connect(&cfg).await;
    assert!(!session.reconnect_pending().await);
}

#[tokio::test]
async fn new_connect_cancels_pending_timer() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let store = Store::new();
    let session = SessionManager::new(store.clone());
    session.connect(&cfg(addr, 10_000)).await;
    assert!(session.reconnect_pending().await);

    let outcome = session.connect(&EndpointConfig::new("", None, 5_000, true)).await;
    assert_eq!(outcome, SessionOutcome::NotConfigured);
    assert!(!session.reconnect_pending().await);
    let state = store.connection().await;
    assert_eq!(state.last_error.as_deref(), Some("Stream endpoint is not configured"));
    assert_eq!(state.stream_phase, StreamPhase::Disconnected);
}

#[tokio::test]
async fn reconnect_replaces_session_after_delay() {
    let addr = serve_ws(hold_open).await;
    let store = Store::new();
    let session = SessionManager::new(store.clone());
    // First attempt targets a dead port, then the live server.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);
    session.connect(&cfg(dead, 2_000)).await;
    assert!(session.reconnect_pending().await);

    assert_eq!(session.connect(&cfg(addr, 2_000)).await, SessionOutcome::Connected);
    assert!(!session.reconnect_pending().await);
    assert!(store.connection().await.stream_connected);
    session.shutdown().await;
}
