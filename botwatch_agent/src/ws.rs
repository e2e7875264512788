//! WebSocket upgrade and per-connection handler. Forwards broadcast frames.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::Ordering;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::state::{snapshot_frame, AppState};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    state.client_count.fetch_add(1, Ordering::Relaxed);

    // Ensure we decrement on disconnect (drop).
    struct ClientGuard(AppState);
    impl Drop for ClientGuard {
        fn drop(&mut self) {
            self.0.client_count.fetch_sub(1, Ordering::Relaxed);
        }
    }
    let _guard = ClientGuard(state.clone());
    info!(clients = state.client_count.load(Ordering::Relaxed), "stream client connected");

    let mut events = state.events.subscribe();
    let (mut tx, mut rx) = socket.split();

    // Current state first so the console does not wait a tick.
    let first = snapshot_frame(&state.snapshot.read().await.clone());
    if tx.send(Message::Text(first)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            frame = events.recv() => match frame {
                Ok(text) => {
                    if tx.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "stream client lagging"),
                Err(RecvError::Closed) => break,
            },
            incoming = rx.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!("stream client disconnected");
}
