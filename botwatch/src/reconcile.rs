//! Maps arbitrary backend JSON into [`Snapshot`] and canonical log lines.
//!
//! The backend's schema is not ours, so every logical field is looked up
//! through an ordered alias list and falls back to the previous cached value.
//! Nothing here fails: unusable input degrades to `None` or an empty list.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::types::{format_timestamp, BotStatus, LogLevel, Snapshot};

/// Log cache / extraction cap.
pub const MAX_LOG_LINES: usize = 500;

const NESTED_KEYS: &[&str] = &["snapshot", "data"];

const STATUS_KEYS: &[&str] = &["status", "state", "botStatus", "bot_status"];
const QUEUE_KEYS: &[&str] = &["queueDepth", "queue_depth", "queue", "pending"];
const JOBS_KEYS: &[&str] = &["jobsProcessed", "jobs_processed", "processed", "jobs"];
const SUCCESS_KEYS: &[&str] = &["successRate", "success_rate", "success"];
const WORKERS_KEYS: &[&str] = &["activeWorkers", "active_workers", "workers"];
const HEARTBEAT_KEYS: &[&str] = &[
    "lastHeartbeat",
    "last_heartbeat",
    "heartbeat",
    "updatedAt",
    "updated_at",
];

const LOG_ARRAY_KEYS: &[&str] = &["logs", "data"];
const LOG_SINGLE_KEYS: &[&str] = &["log", "message"];
const ENTRY_MESSAGE_KEYS: &[&str] = &["message", "log", "msg"];
const ENTRY_TIME_KEYS: &[&str] = &["timestamp", "time", "ts"];
const ENTRY_LEVEL_KEYS: &[&str] = &["level", "severity"];

const QUEUE_MAX: f64 = 10_000.0;
const JOBS_MAX: f64 = 100_000_000.0;
const SUCCESS_MAX: f64 = 100.0;
const WORKERS_MAX: f64 = 1_000.0;

/// Builds a snapshot from any JSON object, filling gaps from `previous`.
/// Returns `None` only when `payload` is not an object.
pub fn normalize_snapshot(payload: &Value, previous: &Snapshot) -> Option<Snapshot> {
    let obj = payload.as_object()?;
    let body = nested_snapshot(obj).unwrap_or(obj);

    let status = match lookup(body, STATUS_KEYS) {
        Some(v) => map_status(v),
        None => previous.status,
    };
    let queue_depth = lookup_number(body, QUEUE_KEYS)
        .map(|n| clamp_round(n, QUEUE_MAX) as u32)
        .unwrap_or_else(|| previous.queue_depth.min(QUEUE_MAX as u32));
    let jobs_processed = lookup_number(body, JOBS_KEYS)
        .map(|n| clamp_round(n, JOBS_MAX) as u64)
        .unwrap_or_else(|| previous.jobs_processed.min(JOBS_MAX as u64));
    let success_rate = lookup_number(body, SUCCESS_KEYS)
        .unwrap_or(previous.success_rate)
        .clamp(0.0, SUCCESS_MAX);
    let active_workers = lookup_number(body, WORKERS_KEYS)
        .map(|n| clamp_round(n, WORKERS_MAX) as u32)
        .unwrap_or_else(|| previous.active_workers.min(WORKERS_MAX as u32));
    let last_heartbeat = lookup(body, HEARTBEAT_KEYS)
        .and_then(parse_time)
        .unwrap_or_else(Utc::now);

    Some(Snapshot {
        status,
        queue_depth,
        jobs_processed,
        success_rate,
        active_workers,
        last_heartbeat,
    })
}

/// Like [`normalize_snapshot`], but only for payloads that actually look like
/// a snapshot: a nested `snapshot`/`data` object or at least one known field.
/// Acknowledgements and log-only frames yield `None`.
pub fn recognize_snapshot(payload: &Value, previous: &Snapshot) -> Option<Snapshot> {
    let obj = payload.as_object()?;
    if nested_snapshot(obj).is_some() || has_snapshot_field(obj) {
        normalize_snapshot(payload, previous)
    } else {
        None
    }
}

/// Maps a free-form status value onto [`BotStatus`].
pub fn map_status(value: &Value) -> BotStatus {
    let Some(raw) = value.as_str() else {
        return BotStatus::Idle;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "idle" => BotStatus::Idle,
        "running" | "active" | "busy" | "processing" => BotStatus::Running,
        "paused" => BotStatus::Paused,
        "stopped" | "halted" | "terminated" | "off" => BotStatus::Stopped,
        _ => BotStatus::Idle,
    }
}

/// Extracts ordered log lines from a payload, falling back to `raw_text`.
///
/// Priority: top-level array; `logs`/`data` array; single `log`/`message`
/// string; raw text split on line boundaries. Keeps the latest
/// [`MAX_LOG_LINES`] entries.
pub fn extract_logs(payload: Option<&Value>, raw_text: &str) -> Vec<String> {
    let mut lines: Vec<String> = match payload {
        Some(Value::Array(items)) => items.iter().filter_map(format_entry).collect(),
        Some(Value::Object(obj)) => {
            let array = LOG_ARRAY_KEYS
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_array));
            let single = LOG_SINGLE_KEYS
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_str));
            if let Some(items) = array {
                items.iter().filter_map(format_entry).collect()
            } else if let Some(single) = single {
                format_plain(single).into_iter().collect()
            } else {
                raw_lines(raw_text)
            }
        }
        Some(Value::String(s)) => format_plain(s).into_iter().collect(),
        _ => raw_lines(raw_text),
    };

    if lines.len() > MAX_LOG_LINES {
        lines.drain(..lines.len() - MAX_LOG_LINES);
    }
    lines
}

/// True when `line` already carries a `[<rfc3339>] [LEVEL] ` prefix.
pub fn is_canonical_line(line: &str) -> bool {
    let Some(rest) = line.strip_prefix('[') else {
        return false;
    };
    let Some((ts, rest)) = rest.split_once(']') else {
        return false;
    };
    if DateTime::parse_from_rfc3339(ts).is_err() {
        return false;
    }
    let Some(rest) = rest.strip_prefix(" [") else {
        return false;
    };
    matches!(rest.split_once(']'), Some((level, _)) if !level.is_empty())
}

/// Renders `[timestamp] [LEVEL] message`.
pub fn format_line(timestamp: &str, level: &str, message: &str) -> String {
    format!("[{timestamp}] [{level}] {message}")
}

fn nested_snapshot(obj: &Map<String, Value>) -> Option<&Map<String, Value>> {
    NESTED_KEYS.iter().find_map(|k| obj.get(*k).and_then(Value::as_object))
}

fn has_snapshot_field(obj: &Map<String, Value>) -> bool {
    [STATUS_KEYS, QUEUE_KEYS, JOBS_KEYS, SUCCESS_KEYS, WORKERS_KEYS]
        .iter()
        .any(|keys| lookup(obj, keys).is_some())
}

fn lookup<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
}

// First alias that holds something numeric; non-numeric aliases are skipped.
fn lookup_number(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| obj.get(*k).and_then(as_number))
}

fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn clamp_round(n: f64, max: f64) -> f64 {
    n.round().clamp(0.0, max)
}

fn parse_time(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => {
            let raw = n.as_f64()?;
            // Values this small are epoch seconds, not milliseconds.
            let millis = if raw.abs() < 100_000_000_000.0 { raw * 1000.0 } else { raw };
            Utc.timestamp_millis_opt(millis as i64).single()
        }
        _ => None,
    }
}

fn format_entry(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => format_plain(s),
        Value::Object(obj) => format_object_entry(obj),
        Value::Number(_) | Value::Bool(_) => format_plain(&value.to_string()),
        _ => None,
    }
}

fn format_plain(raw: &str) -> Option<String> {
    let line = raw.trim();
    if line.is_empty() {
        return None;
    }
    if is_canonical_line(line) {
        return Some(line.to_string());
    }
    Some(format_line(
        &format_timestamp(Utc::now()),
        LogLevel::Remote.as_str(),
        line,
    ))
}

fn format_object_entry(obj: &Map<String, Value>) -> Option<String> {
    let message = ENTRY_MESSAGE_KEYS
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|m| !m.is_empty())?;

    let timestamp = match lookup(obj, ENTRY_TIME_KEYS) {
        Some(v) => match parse_time(v) {
            Some(ts) => format_timestamp(ts),
            None => v.as_str().map(|s| s.trim().to_string()).unwrap_or_else(|| v.to_string()),
        },
        None => format_timestamp(Utc::now()),
    };
    let level = lookup(obj, ENTRY_LEVEL_KEYS)
        .and_then(Value::as_str)
        .map(|l| l.trim().to_ascii_uppercase())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| LogLevel::Remote.as_str().to_string());

    Some(format_line(&timestamp, &level, message))
}

fn raw_lines(raw_text: &str) -> Vec<String> {
    raw_text.lines().filter_map(format_plain).collect()
}
