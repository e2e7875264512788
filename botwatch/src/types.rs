//! Canonical models shared by the prober, session manager and façade.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Run status of the remote bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BotStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Stopped,
}

impl BotStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BotStatus::Idle => "Idle",
            BotStatus::Running => "Running",
            BotStatus::Paused => "Paused",
            BotStatus::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the bot's run status and throughput counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub status: BotStatus,
    pub queue_depth: u32,
    pub jobs_processed: u64,
    pub success_rate: f64,
    pub active_workers: u32,
    pub last_heartbeat: DateTime<Utc>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            status: BotStatus::Idle,
            queue_depth: 0,
            jobs_processed: 0,
            success_rate: 0.0,
            active_workers: 0,
            last_heartbeat: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConnectionMode {
    #[default]
    Local,
    Remote,
}

/// Lifecycle phase of the streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StreamPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Reachability and session status as seen by the console.
///
/// `mode` is derived: call [`ConnectionState::refresh_mode`] after changing
/// `api_reachable` or `stream_connected`. [`crate::state::Store`] does this
/// on every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub mode: ConnectionMode,
    pub api_reachable: bool,
    pub api_endpoint: String,
    pub api_latency_ms: Option<u64>,
    pub stream_connected: bool,
    pub stream_endpoint: String,
    pub stream_phase: StreamPhase,
    pub reconnect_scheduled: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl ConnectionState {
    pub fn refresh_mode(&mut self) {
        self.mode = if self.api_reachable || self.stream_connected {
            ConnectionMode::Remote
        } else {
            ConnectionMode::Local
        };
    }
}

/// Resolved endpoints and polling policy. Built from
/// [`crate::config::ConsoleConfig::endpoint_config`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    pub api_endpoint: String,
    pub stream_endpoint: String,
    pub polling_interval_ms: u64,
    pub auto_reconnect: bool,
}

impl EndpointConfig {
    /// Normalizes `api` and derives the stream endpoint unless `stream` is given.
    pub fn new(
        api: &str,
        stream: Option<&str>,
        polling_interval_ms: u64,
        auto_reconnect: bool,
    ) -> Self {
        let api_endpoint = crate::endpoint::normalize_http(api);
        let stream_endpoint = crate::endpoint::derive_stream(&api_endpoint, stream);
        Self {
            api_endpoint,
            stream_endpoint,
            polling_interval_ms,
            auto_reconnect,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionSource {
    Remote,
    Local,
}

/// Outcome of an operator action. `ok` is always true: failures degrade to
/// local simulation instead of erroring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub ok: bool,
    pub message: String,
    pub snapshot: Snapshot,
    pub source: ActionSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Remote,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Remote => "REMOTE",
        }
    }
}

/// One operator-facing log line. Rendered as `[timestamp] [LEVEL] message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub message: String,
}

impl LogEntry {
    pub fn now(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: format_timestamp(Utc::now()),
            level: level.as_str().to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] [{}] {}", self.timestamp, self.level, self.message)
    }
}

/// Timestamp format used inside log lines (UTC, millisecond precision).
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
