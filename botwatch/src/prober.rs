//! Bounded-timeout HTTP requests against ranked candidate paths.
//!
//! The backend's route layout is unknown, so each operation walks an ordered
//! path list and the first acceptable response wins. Exhausting the list
//! yields [`ProbeError::Exhausted`] carrying the last failure.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::endpoint;
use crate::error::ProbeError;
use crate::reconcile::{extract_logs, recognize_snapshot};
use crate::state::Store;
use crate::types::{ConnectionState, EndpointConfig, Snapshot};

pub const PROBE_TIMEOUT: Duration = Duration::from_millis(4500);
/// Minimum spacing between probes triggered by snapshot fetches.
pub const PROBE_COOLDOWN: Duration = Duration::from_secs(15);

pub const HEALTH_PATHS: &[&str] = &["/health", "/api/health", "/status", "/api/status", "/"];
pub const SNAPSHOT_PATHS: &[&str] = &[
    "/snapshot",
    "/api/snapshot",
    "/api/bot/snapshot",
    "/status",
    "/api/status",
];
pub const LOG_PATHS: &[&str] = &["/logs", "/api/logs", "/api/bot/logs"];
pub const ACTION_PATHS: &[&str] = &["/action", "/api/action", "/api/bot/action", "/control"];

/// "Server exists and answered": 2xx-4xx except 404.
pub fn is_reachable_status(code: u16) -> bool {
    (200..500).contains(&code) && code != 404
}

/// Winning candidate of a ranked request.
#[derive(Debug, Clone)]
pub struct Hit<T> {
    pub value: T,
    pub url: String,
    pub latency: Duration,
}

/// Remote acknowledgement of an action.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAck {
    pub snapshot: Option<Snapshot>,
    pub message: Option<String>,
}

#[derive(Clone)]
pub struct Prober {
    client: reqwest::Client,
    store: Store,
    timeout: Duration,
    last_probe: Arc<Mutex<Option<Instant>>>,
}

impl Prober {
    pub fn new(store: Store) -> Self {
        Self::with_timeout(store, PROBE_TIMEOUT)
    }

    pub fn with_timeout(store: Store, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "falling back to default http client");
                reqwest::Client::new()
            });
        Self {
            client,
            store,
            timeout,
            last_probe: Arc::new(Mutex::new(None)),
        }
    }

    /// Checks reachability and publishes the reachability fields.
    pub async fn probe(&self, config: &EndpointConfig) -> ConnectionState {
        *self.last_probe.lock().await = Some(Instant::now());
        let base = endpoint::normalize_http(&config.api_endpoint);

        let result = self
            .first_success(&base, HEALTH_PATHS, |url| {
                let client = self.client.clone();
                let timeout = self.timeout;
                async move {
                    let resp = client
                        .get(&url)
                        .timeout(timeout)
                        .send()
                        .await
                        .map_err(|e| describe(&url, &e, timeout))?;
                    let status = resp.status();
                    if is_reachable_status(status.as_u16()) {
                        Ok(status.as_u16())
                    } else {
                        Err(format!("{url} responded with HTTP {status}"))
                    }
                }
            })
            .await;

        let now = Utc::now();
        match result {
            Ok(hit) => {
                let latency_ms = u64::try_from(hit.latency.as_millis()).unwrap_or(u64::MAX);
                info!(url = %hit.url, status = hit.value, latency_ms, "backend reachable");
                self.store
                    .update_connection(|c| {
                        c.api_reachable = true;
                        c.api_endpoint = base;
                        c.api_latency_ms = Some(latency_ms);
                        c.last_check = Some(now);
                        c.last_error = None;
                    })
                    .await
            }
            Err(e) => {
                warn!(endpoint = %base, error = %e, "backend unreachable");
                let detail = match e {
                    ProbeError::EmptyEndpoint => e.to_string(),
                    ProbeError::Exhausted { last_error } => last_error,
                };
                self.store
                    .update_connection(|c| {
                        c.api_reachable = false;
                        c.api_endpoint = base;
                        c.api_latency_ms = None;
                        c.last_check = Some(now);
                        c.last_error = Some(detail);
                    })
                    .await
            }
        }
    }

    /// True when no probe ran within [`PROBE_COOLDOWN`].
    pub async fn probe_due(&self) -> bool {
        let last = *self.last_probe.lock().await;
        last.map_or(true, |at| at.elapsed() >= PROBE_COOLDOWN)
    }

    /// Fetches and caches the current snapshot, re-probing first when the
    /// cooldown has passed.
    pub async fn fetch_snapshot(&self, config: &EndpointConfig) -> Result<Snapshot, ProbeError> {
        if self.probe_due().await {
            self.probe(config).await;
        }
        let base = endpoint::normalize_http(&config.api_endpoint);
        let previous = self.store.snapshot().await;

        let hit = self
            .first_success(&base, SNAPSHOT_PATHS, |url| {
                let client = self.client.clone();
                let timeout = self.timeout;
                let previous = previous.clone();
                async move {
                    let text = get_text(&client, &url, timeout).await?;
                    let payload: Value = serde_json::from_str(&text)
                        .map_err(|_| format!("{url} returned no JSON"))?;
                    recognize_snapshot(&payload, &previous)
                        .ok_or_else(|| format!("{url} returned no usable snapshot"))
                }
            })
            .await?;

        debug!(url = %hit.url, "snapshot fetched");
        self.store.replace_snapshot(hit.value.clone()).await;
        Ok(hit.value)
    }

    /// Fetches remote log lines. The local cache is left untouched.
    pub async fn fetch_logs(&self, config: &EndpointConfig) -> Result<Vec<String>, ProbeError> {
        let base = endpoint::normalize_http(&config.api_endpoint);
        let hit = self
            .first_success(&base, LOG_PATHS, |url| {
                let client = self.client.clone();
                let timeout = self.timeout;
                async move {
                    let text = get_text(&client, &url, timeout).await?;
                    let payload: Option<Value> = serde_json::from_str(&text).ok();
                    let lines = extract_logs(payload.as_ref(), &text);
                    if lines.is_empty() {
                        Err(format!("{url} returned no log lines"))
                    } else {
                        Ok(lines)
                    }
                }
            })
            .await?;
        Ok(hit.value)
    }

    /// Posts `{"action": action}`. The snapshot comes from the response body
    /// when it carries one, otherwise from a follow-up fetch.
    pub async fn send_action(
        &self,
        config: &EndpointConfig,
        action: &str,
    ) -> Result<RemoteAck, ProbeError> {
        let base = endpoint::normalize_http(&config.api_endpoint);
        let hit = self
            .first_success(&base, ACTION_PATHS, |url| {
                let client = self.client.clone();
                let timeout = self.timeout;
                let body = json!({ "action": action });
                async move {
                    let resp = client
                        .post(&url)
                        .timeout(timeout)
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| describe(&url, &e, timeout))?;
                    let status = resp.status();
                    if !status.is_success() {
                        return Err(format!("{url} responded with HTTP {status}"));
                    }
                    Ok(resp.text().await.unwrap_or_default())
                }
            })
            .await?;

        info!(url = %hit.url, action, "remote action accepted");
        let payload: Option<Value> = serde_json::from_str(&hit.value).ok();
        let message = payload
            .as_ref()
            .and_then(|p| p.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let previous = self.store.snapshot().await;
        let snapshot = match payload.as_ref().and_then(|p| recognize_snapshot(p, &previous)) {
            Some(snapshot) => {
                self.store.replace_snapshot(snapshot.clone()).await;
                Some(snapshot)
            }
            None => self.fetch_snapshot(config).await.ok(),
        };
        Ok(RemoteAck { snapshot, message })
    }

    async fn first_success<T, F, Fut>(
        &self,
        base: &str,
        paths: &[&str],
        mut attempt: F,
    ) -> Result<Hit<T>, ProbeError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, String>>,
    {
        if base.is_empty() {
            return Err(ProbeError::EmptyEndpoint);
        }
        let mut last_error = String::from("no candidate paths");
        for path in paths {
            let url = endpoint::join(base, path);
            let started = Instant::now();
            match attempt(url.clone()).await {
                Ok(value) => {
                    return Ok(Hit {
                        value,
                        url,
                        latency: started.elapsed(),
                    })
                }
                Err(e) => {
                    debug!(%url, error = %e, "candidate failed");
                    last_error = e;
                }
            }
        }
        Err(ProbeError::Exhausted { last_error })
    }
}

async fn get_text(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<String, String> {
    let resp = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| describe(url, &e, timeout))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(format!("{url} responded with HTTP {status}"));
    }
    resp.text().await.map_err(|e| describe(url, &e, timeout))
}

fn describe(url: &str, e: &reqwest::Error, timeout: Duration) -> String {
    if e.is_timeout() {
        format!("{url} timed out after {}ms", timeout.as_millis())
    } else if e.is_connect() {
        format!("{url} connection failed: {e}")
    } else {
        format!("{url}: {e}")
    }
}
