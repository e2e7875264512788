//! Shared mock-backend state: simulated bot snapshot, log history and event fan-out.

use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use botwatch::history::push_capped;
use botwatch::reconcile::MAX_LOG_LINES;
use botwatch::types::{BotStatus, LogEntry, LogLevel, Snapshot};
use chrono::Utc;
use serde_json::json;
use tokio::sync::{broadcast, RwLock};

pub type SharedSnapshot = Arc<RwLock<Snapshot>>;
pub type SharedLogs = Arc<RwLock<VecDeque<LogEntry>>>;

#[derive(Clone)]
pub struct AppState {
    pub snapshot: SharedSnapshot,
    pub logs: SharedLogs,

    // Pre-serialized frames for every connected WebSocket client
    pub events: broadcast::Sender<String>,
    pub client_count: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            snapshot: Arc::new(RwLock::new(initial_snapshot())),
            logs: Arc::new(RwLock::new(VecDeque::with_capacity(MAX_LOG_LINES))),
            events,
            client_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Records a log entry and pushes it to stream clients.
    pub async fn log(&self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry::now(level, message);
        let frame = json!({ "logs": [entry_json(&entry)] });
        push_capped(&mut *self.logs.write().await, entry, MAX_LOG_LINES);
        // No receivers is fine.
        let _ = self.events.send(frame.to_string());
    }

    pub async fn publish_snapshot(&self) {
        let snap = self.snapshot.read().await.clone();
        let _ = self.events.send(snapshot_frame(&snap));
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

fn initial_snapshot() -> Snapshot {
    Snapshot {
        status: BotStatus::Idle,
        queue_depth: 12,
        jobs_processed: 0,
        success_rate: 97.5,
        active_workers: 0,
        last_heartbeat: Utc::now(),
    }
}

/// Status words the mock backend reports; deliberately not the canonical names.
pub fn status_word(status: BotStatus) -> &'static str {
    match status {
        BotStatus::Idle => "idle",
        BotStatus::Running => "processing",
        BotStatus::Paused => "paused",
        BotStatus::Stopped => "halted",
    }
}

/// snake_case wire body, nested the way the console must tolerate.
pub fn wire_snapshot(s: &Snapshot) -> serde_json::Value {
    json!({
        "status": status_word(s.status),
        "queue_depth": s.queue_depth,
        "jobs_processed": s.jobs_processed,
        "success_rate": s.success_rate,
        "active_workers": s.active_workers,
        "last_heartbeat": s.last_heartbeat.to_rfc3339(),
    })
}

pub fn entry_json(entry: &LogEntry) -> serde_json::Value {
    json!({
        "timestamp": entry.timestamp,
        "level": entry.level,
        "message": entry.message,
    })
}

pub fn snapshot_frame(s: &Snapshot) -> String {
    json!({ "type": "snapshot", "snapshot": wire_snapshot(s) }).to_string()
}
