//! Mock backend routes, exercised raw and through the console library.
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use botwatch::config::ConsoleConfig;
use botwatch::console::Console;
use botwatch::prober::Prober;
use botwatch::session::SessionOutcome;
use botwatch::state::Store;
use botwatch::types::{ActionSource, BotStatus, ConnectionMode};
use botwatch_agent::{router, sampler, AppState};
use futures_util::StreamExt;
use serde_json::Value;
use tokio_tungstenite::{connect_async, tungstenite::Message};

async fn spawn_agent(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    addr
}

fn console_for(addr: SocketAddr) -> Console {
    let store = Store::new();
    let prober = Prober::with_timeout(store.clone(), Duration::from_secs(2));
    let cfg = ConsoleConfig {
        api_endpoint: addr.to_string(),
        polling_interval_ms: 2_000,
        ..ConsoleConfig::default()
    };
    Console::with_store(PathBuf::from("unused/config.json"), cfg, store, prober)
}

#[tokio::test]
async fn snapshot_route_nests_snake_case_fields() {
    let addr = spawn_agent(AppState::new()).await;
    let body: Value = reqwest::get(format!("http://{addr}/snapshot"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["status"], "idle");
    assert_eq!(body["data"]["queue_depth"], 12);
    assert!(body["data"]["last_heartbeat"].is_string());
}

#[tokio::test]
async fn unknown_action_is_rejected_with_400() {
    let addr = spawn_agent(AppState::new()).await;
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/action"))
        .json(&serde_json::json!({ "action": "dance" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn console_round_trip_against_agent() {
    let addr = spawn_agent(AppState::new()).await;
    let c = console_for(addr);

    let state = c.test_connection().await;
    assert!(state.api_reachable);
    assert_eq!(state.mode, ConnectionMode::Remote);

    let snap = c.get_snapshot().await;
    assert_eq!(snap.status, BotStatus::Idle);
    assert_eq!(snap.queue_depth, 12);

    let result = c.perform_bot_action("start").await;
    assert!(result.ok);
    assert_eq!(result.source, ActionSource::Remote);
    assert_eq!(result.snapshot.status, BotStatus::Running);
    assert_eq!(result.snapshot.active_workers, 1);

    // the agent recorded the action in its own log
    let logs = c.get_logs().await;
    assert!(logs.iter().any(|l| l.contains("operator action 'start' applied")), "{logs:?}");

    let result = c.perform_bot_action("stop").await;
    assert_eq!(result.snapshot.status, BotStatus::Stopped);
    assert_eq!(c.get_snapshot().await.status, BotStatus::Stopped);
}

#[tokio::test]
async fn stream_delivers_snapshot_on_connect() {
    let addr = spawn_agent(AppState::new()).await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let first = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = match first {
        Message::Text(text) => text,
        other => panic!("expected text frame, got {other:?}"),
    };
    let frame: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(frame["type"], "snapshot");
    assert_eq!(frame["snapshot"]["status"], "idle");
}

#[tokio::test]
async fn console_stream_follows_ticker() {
    let state = AppState::new();
    let addr = spawn_agent(state.clone()).await;
    let _ticker = sampler::spawn_ticker(state.clone(), Duration::from_millis(50));

    let c = console_for(addr);
    c.perform_bot_action("start").await;
    let conn = c.connect_stream().await;
    assert!(conn.stream_connected);

    let mut processed = false;
    for _ in 0..60 {
        let logs = c.store().logs().await;
        let jobs = c.store().snapshot().await.jobs_processed;
        if logs.iter().any(|l| l.contains("processed")) && jobs > 0 {
            processed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(processed, "stream never delivered ticker frames");
    c.shutdown().await;
}

#[tokio::test]
async fn ticker_only_processes_while_running() {
    let state = AppState::new();
    assert_eq!(sampler::advance(&state).await, 0);
    assert_eq!(state.snapshot.read().await.queue_depth, 14);

    {
        let mut snap = state.snapshot.write().await;
        snap.status = BotStatus::Running;
        snap.active_workers = 3;
    }
    assert_eq!(sampler::advance(&state).await, 3);
    let snap = state.snapshot.read().await.clone();
    assert_eq!(snap.queue_depth, 13);
    assert_eq!(snap.jobs_processed, 3);

    state.snapshot.write().await.status = BotStatus::Stopped;
    assert_eq!(sampler::advance(&state).await, 0);
    assert_eq!(state.snapshot.read().await.queue_depth, 13);
}

#[tokio::test]
async fn console_connect_outcome_is_connected() {
    let addr = spawn_agent(AppState::new()).await;
    let c = console_for(addr);
    let ep = c.endpoint_config().await;
    assert_eq!(c.session().connect(&ep).await, SessionOutcome::Connected);
    c.shutdown().await;
}
