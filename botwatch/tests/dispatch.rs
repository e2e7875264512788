//! Operator actions: remote path first, local simulation when the backend is gone.
use std::time::Duration;

use axum::{routing::post, Json, Router};
use botwatch::dispatch::{simulate, BotAction, Dispatcher};
use botwatch::prober::Prober;
use botwatch::state::Store;
use botwatch::types::{ActionSource, BotStatus, EndpointConfig, Snapshot};
use serde_json::json;

fn snapshot(status: BotStatus, workers: u32) -> Snapshot {
    Snapshot {
        status,
        queue_depth: 5,
        jobs_processed: 40,
        success_rate: 99.85,
        active_workers: workers,
        ..Snapshot::default()
    }
}

async fn unreachable_config() -> EndpointConfig {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    EndpointConfig::new(&addr.to_string(), None, 5000, true)
}

fn dispatcher(store: &Store) -> Dispatcher {
    let prober = Prober::with_timeout(store.clone(), Duration::from_millis(300));
    Dispatcher::new(prober, store.clone())
}

#[test]
fn action_names_parse_loosely() {
    assert_eq!(" Start ".parse::<BotAction>(), Ok(BotAction::Start));
    assert_eq!("SYNC".parse::<BotAction>(), Ok(BotAction::Sync));
    assert!("dance".parse::<BotAction>().is_err());
}

#[test]
fn simulation_transitions() {
    let base = snapshot(BotStatus::Idle, 8);
    let started = simulate(&base, BotAction::Start);
    assert_eq!(started.status, BotStatus::Running);
    // capped at 8 workers
    assert_eq!(started.active_workers, 8);

    assert_eq!(simulate(&base, BotAction::Pause).status, BotStatus::Paused);
    assert_eq!(simulate(&base, BotAction::Resume).status, BotStatus::Running);

    let stopped = simulate(&base, BotAction::Stop);
    assert_eq!(stopped.status, BotStatus::Stopped);
    assert_eq!(stopped.active_workers, 0);

    let synced = simulate(&base, BotAction::Sync);
    assert_eq!(synced.queue_depth, 3);
    assert_eq!(synced.jobs_processed, 43);
    assert_eq!(synced.success_rate, 99.9);
    assert_eq!(synced.status, BotStatus::Idle);

    let nearly_empty = Snapshot {
        queue_depth: 1,
        ..base.clone()
    };
    let drained = simulate(&nearly_empty, BotAction::Sync);
    assert_eq!(drained.queue_depth, 0);
}

#[test]
fn any_action_is_accepted_from_any_status() {
    for status in [BotStatus::Idle, BotStatus::Running, BotStatus::Paused, BotStatus::Stopped] {
        assert_eq!(simulate(&snapshot(status, 1), BotAction::Pause).status, BotStatus::Paused);
        assert_eq!(simulate(&snapshot(status, 1), BotAction::Stop).status, BotStatus::Stopped);
    }
}

#[tokio::test]
async fn start_is_simulated_when_remote_is_unreachable() {
    let store = Store::new();
    store.replace_snapshot(snapshot(BotStatus::Idle, 3)).await;

    let result = dispatcher(&store).perform_action(&unreachable_config().await, "start").await;
    assert!(result.ok);
    assert_eq!(result.source, ActionSource::Local);
    assert_eq!(result.snapshot.status, BotStatus::Running);
    assert_eq!(result.snapshot.active_workers, 4);
    assert_eq!(store.snapshot().await.active_workers, 4);
    assert!(store.logs().await.iter().any(|l| l.contains("[WARN] Local simulation")));
}

#[tokio::test]
async fn unknown_action_is_ignored_but_ok() {
    let store = Store::new();
    let before = snapshot(BotStatus::Paused, 2);
    store.replace_snapshot(before.clone()).await;

    let result = dispatcher(&store).perform_action(&unreachable_config().await, "dance").await;
    assert!(result.ok);
    assert!(result.message.contains("Ignored"), "{}", result.message);
    assert_eq!(result.snapshot, before);
    assert_eq!(store.snapshot().await, before);
}

#[tokio::test]
async fn empty_endpoint_falls_back_to_simulation() {
    let store = Store::new();
    let cfg = EndpointConfig::new("", None, 5000, true);
    let result = dispatcher(&store).perform_action(&cfg, "stop").await;
    assert!(result.ok);
    assert_eq!(result.source, ActionSource::Local);
    assert_eq!(result.snapshot.status, BotStatus::Stopped);
}

#[tokio::test]
async fn remote_snapshot_is_authoritative() {
    let app = Router::new().route(
        "/action",
        post(|| async {
            Json(json!({
                "message": "started",
                "snapshot": { "status": "running", "activeWorkers": 6 }
            }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let store = Store::new();
    store.replace_snapshot(snapshot(BotStatus::Idle, 0)).await;
    let cfg = EndpointConfig::new(&addr.to_string(), None, 5000, true);
    let result = dispatcher(&store).perform_action(&cfg, "start").await;
    assert!(result.ok);
    assert_eq!(result.source, ActionSource::Remote);
    assert_eq!(result.message, "started");
    // remote says 6, local simulation would have said 1
    assert_eq!(result.snapshot.active_workers, 6);
    assert_eq!(store.snapshot().await.active_workers, 6);
}
