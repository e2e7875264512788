//! Plain HTTP routes of the mock backend.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use botwatch::dispatch::{simulate, BotAction};
use botwatch::types::LogLevel;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::Ordering;
use tracing::info;

use crate::state::{entry_json, status_word, wire_snapshot, AppState};
use crate::ws::ws_handler;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(api_status))
        .route("/snapshot", get(snapshot))
        .route("/logs", get(logs))
        .route("/action", post(action))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true, "service": "botwatch_agent" }))
}

async fn api_status(State(state): State<AppState>) -> impl IntoResponse {
    let snap = state.snapshot.read().await;
    Json(json!({
        "state": status_word(snap.status),
        "workers": snap.active_workers,
        "clients": state.client_count.load(Ordering::Relaxed),
    }))
}

async fn snapshot(State(state): State<AppState>) -> impl IntoResponse {
    let snap = state.snapshot.read().await.clone();
    Json(json!({ "data": wire_snapshot(&snap) }))
}

async fn logs(State(state): State<AppState>) -> impl IntoResponse {
    let entries: Vec<_> = state.logs.read().await.iter().map(entry_json).collect();
    Json(json!({ "logs": entries }))
}

#[derive(Debug, Deserialize)]
struct ActionRequest {
    action: String,
}

async fn action(
    State(state): State<AppState>,
    Json(req): Json<ActionRequest>,
) -> impl IntoResponse {
    let parsed = match req.action.parse::<BotAction>() {
        Ok(a) => a,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "ok": false, "message": e })));
        }
    };

    let next = {
        let mut snap = state.snapshot.write().await;
        let next = simulate(&snap, parsed);
        *snap = next.clone();
        next
    };
    info!(action = parsed.as_str(), status = %next.status, "action applied");
    state
        .log(LogLevel::Info, format!("operator action '{}' applied", parsed.as_str()))
        .await;
    state.publish_snapshot().await;

    (
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "message": format!("Action '{}' applied", parsed.as_str()),
            "snapshot": wire_snapshot(&next),
        })),
    )
}
