//! Shared console state: connection record, current snapshot and log cache.
//!
//! Every write clones the record, edits the clone and swaps it in, so a
//! reader never sees a half-applied update. `mode` is recomputed on each
//! connection write.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;

use crate::history::LogCache;
use crate::logfile::LocalLog;
use crate::types::{ConnectionState, LogEntry, LogLevel, Snapshot};

#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    connection: RwLock<ConnectionState>,
    snapshot: RwLock<Snapshot>,
    logs: RwLock<LogCache>,
    local_log: Option<LocalLog>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose log lines are also appended to `local_log`.
    pub fn with_local_log(local_log: LocalLog) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                local_log: Some(local_log),
                ..StoreInner::default()
            }),
        }
    }

    pub fn local_log(&self) -> Option<&LocalLog> {
        self.inner.local_log.as_ref()
    }

    pub async fn connection(&self) -> ConnectionState {
        self.inner.connection.read().await.clone()
    }

    /// Applies `f` to a copy of the connection record and publishes it.
    pub async fn update_connection<F>(&self, f: F) -> ConnectionState
    where
        F: FnOnce(&mut ConnectionState),
    {
        let mut guard = self.inner.connection.write().await;
        let mut next = guard.clone();
        f(&mut next);
        next.refresh_mode();
        *guard = next.clone();
        next
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.inner.snapshot.read().await.clone()
    }

    pub async fn replace_snapshot(&self, snapshot: Snapshot) {
        *self.inner.snapshot.write().await = snapshot;
    }

    pub async fn logs(&self) -> Vec<String> {
        self.inner.logs.read().await.to_vec()
    }

    /// Lines appended after `seen`, plus the new sequence number.
    pub async fn logs_since(&self, seen: u64) -> (Vec<String>, u64) {
        let logs = self.inner.logs.read().await;
        (logs.since(seen), logs.appended())
    }

    pub async fn push_log(&self, level: LogLevel, message: impl Into<String>) {
        let line = LogEntry::now(level, message).to_string();
        self.append_lines(vec![line]).await;
    }

    /// Appends already-formatted lines in order.
    pub async fn append_lines(&self, lines: Vec<String>) {
        if lines.is_empty() {
            return;
        }
        // Held across the file write so file and cache keep the same order.
        let mut logs = self.inner.logs.write().await;
        if let Some(local) = self.inner.local_log.clone() {
            let batch = lines.clone();
            let path = local.path().to_path_buf();
            match tokio::task::spawn_blocking(move || local.append_all(&batch)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(path = %path.display(), error = %e, "failed to append local log")
                }
                Err(e) => warn!(error = %e, "local log writer panicked"),
            }
        }
        logs.extend(lines);
    }
}
