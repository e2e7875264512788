//! WebSocket session lifecycle: connect, receive, close and scheduled reconnect.
//!
//! At most one session and one reconnect timer exist at a time. Each session
//! carries a generation number; callbacks from a replaced session see a newer
//! generation and drop their updates. Lock order is lifecycle, then store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::endpoint;
use crate::reconcile::{extract_logs, recognize_snapshot};
use crate::state::Store;
use crate::types::{ConnectionState, EndpointConfig, LogLevel, StreamPhase};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long `connect` waits for the first handshake before reporting `Pending`.
pub const FIRST_CONNECT_WAIT: Duration = Duration::from_millis(2200);
/// Same, for attempts started by the reconnect timer.
pub const RECONNECT_WAIT: Duration = Duration::from_millis(1400);
pub const MIN_RECONNECT_DELAY_MS: u64 = 2_000;
pub const MAX_RECONNECT_DELAY_MS: u64 = 30_000;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Reconnect delay for a polling interval, clamped to [2s, 30s].
pub fn reconnect_delay(polling_interval_ms: u64) -> Duration {
    Duration::from_millis(polling_interval_ms.clamp(MIN_RECONNECT_DELAY_MS, MAX_RECONNECT_DELAY_MS))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Initial,
    Reconnect,
}

impl Attempt {
    pub fn wait(self) -> Duration {
        match self {
            Attempt::Initial => FIRST_CONNECT_WAIT,
            Attempt::Reconnect => RECONNECT_WAIT,
        }
    }
}

/// What `connect` observed before returning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Connected,
    /// The handshake is still in flight; the session keeps trying in the background.
    Pending,
    Failed(String),
    NotConfigured,
    /// A timer-driven attempt found the operator had disconnected; nothing was opened.
    Cancelled,
}

struct ActiveSession {
    generation: u64,
    // Sending asks the session to close and run close handling; dropping
    // detaches it silently.
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

struct ReconnectTimer {
    generation: u64,
    delay: Duration,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Lifecycle {
    generation: u64,
    active: Option<ActiveSession>,
    reconnect: Option<ReconnectTimer>,
    manual_disconnect: bool,
}

impl Lifecycle {
    // Idempotent.
    fn cancel_reconnect(&mut self) -> bool {
        match self.reconnect.take() {
            Some(timer) => {
                timer.task.abort();
                true
            }
            None => false,
        }
    }
}

#[derive(Clone)]
pub struct SessionManager {
    store: Store,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl SessionManager {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            lifecycle: Arc::new(Mutex::new(Lifecycle::default())),
        }
    }

    /// Operator-initiated connect. Clears the manual-disconnect flag, then
    /// replaces any existing session.
    pub async fn connect(&self, config: &EndpointConfig) -> SessionOutcome {
        self.lifecycle.lock().await.manual_disconnect = false;
        self.open(config.clone(), Attempt::Initial).await
    }

    /// Operator-initiated disconnect; suppresses auto-reconnect until the next `connect`.
    pub async fn disconnect(&self) -> ConnectionState {
        let mut lc = self.lifecycle.lock().await;
        lc.manual_disconnect = true;
        if lc.cancel_reconnect() {
            debug!("pending reconnect cancelled by disconnect");
        }
        if let Some(active) = lc.active.take() {
            let _ = active.stop.send(());
        }
        let state = self
            .store
            .update_connection(|c| {
                c.stream_connected = false;
                c.stream_phase = StreamPhase::Disconnected;
                c.reconnect_scheduled = false;
            })
            .await;
        self.store
            .push_log(LogLevel::Info, "Stream disconnected by operator")
            .await;
        info!("stream disconnected by operator");
        state
    }

    /// Teardown: cancels the timer and closes the session, waiting briefly for it.
    pub async fn shutdown(&self) {
        let task = {
            let mut lc = self.lifecycle.lock().await;
            lc.manual_disconnect = true;
            lc.cancel_reconnect();
            lc.active.take().map(|active| {
                let _ = active.stop.send(());
                active.task
            })
        };
        if let Some(task) = task {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                debug!("stream session did not finish within shutdown grace");
            }
        }
        self.store
            .update_connection(|c| {
                c.stream_connected = false;
                c.stream_phase = StreamPhase::Disconnected;
                c.reconnect_scheduled = false;
            })
            .await;
    }

    pub async fn reconnect_pending(&self) -> bool {
        self.lifecycle.lock().await.reconnect.is_some()
    }

    pub async fn pending_reconnect_delay(&self) -> Option<Duration> {
        self.lifecycle.lock().await.reconnect.as_ref().map(|t| t.delay)
    }

    async fn open(&self, config: EndpointConfig, attempt: Attempt) -> SessionOutcome {
        let target = endpoint::derive_stream(
            &endpoint::normalize_http(&config.api_endpoint),
            Some(config.stream_endpoint.as_str()),
        );

        let mut lc = self.lifecycle.lock().await;
        if attempt == Attempt::Reconnect && lc.manual_disconnect {
            drop(lc);
            debug!("scheduled reconnect dropped: stream disconnected by operator");
            return SessionOutcome::Cancelled;
        }
        lc.cancel_reconnect();
        if let Some(old) = lc.active.take() {
            debug!(generation = old.generation, "detaching previous stream session");
        }
        lc.generation += 1;
        let generation = lc.generation;

        if target.is_empty() {
            self.store
                .update_connection(|c| {
                    c.stream_connected = false;
                    c.stream_phase = StreamPhase::Disconnected;
                    c.stream_endpoint = String::new();
                    c.reconnect_scheduled = false;
                    c.last_error = Some("Stream endpoint is not configured".to_string());
                })
                .await;
            drop(lc);
            warn!("stream connect skipped: no endpoint configured");
            return SessionOutcome::NotConfigured;
        }

        self.store
            .update_connection(|c| {
                c.stream_connected = false;
                c.stream_phase = StreamPhase::Connecting;
                c.stream_endpoint = target.clone();
                c.reconnect_scheduled = false;
            })
            .await;

        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(self.clone().run(generation, target, config, ready_tx, stop_rx));
        lc.active = Some(ActiveSession {
            generation,
            stop: stop_tx,
            task,
        });
        drop(lc);

        match tokio::time::timeout(attempt.wait(), ready_rx).await {
            Ok(Ok(Ok(()))) => SessionOutcome::Connected,
            Ok(Ok(Err(e))) => SessionOutcome::Failed(e),
            Ok(Err(_)) => SessionOutcome::Failed("stream session ended before opening".to_string()),
            Err(_) => {
                debug!(?attempt, "stream handshake still pending");
                SessionOutcome::Pending
            }
        }
    }

    async fn run(
        self,
        generation: u64,
        target: String,
        config: EndpointConfig,
        ready: oneshot::Sender<Result<(), String>>,
        mut stop: oneshot::Receiver<()>,
    ) {
        info!(endpoint = %target, generation, "opening stream session");
        let connected = tokio::select! {
            res = connect_async(target.as_str()) => res,
            _ = &mut stop => return,
        };
        let ws: WsStream = match connected {
            Ok((ws, _)) => ws,
            Err(e) => {
                let msg = format!("stream connect to {target} failed: {e}");
                self.on_error(generation, &msg).await;
                // Close handling first, so `connect` returns with the retry already scheduled.
                self.on_close(generation, &target, &config, false).await;
                let _ = ready.send(Err(msg));
                return;
            }
        };

        self.on_open(generation, &target).await;
        let _ = ready.send(Ok(()));

        let (mut write, mut read) = ws.split();
        loop {
            tokio::select! {
                stopped = &mut stop => {
                    let _ = write.close().await;
                    if stopped.is_ok() {
                        self.on_close(generation, &target, &config, true).await;
                    }
                    return;
                }
                incoming = read.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.on_message(generation, &text).await,
                    Some(Ok(Message::Binary(bytes))) => {
                        if let Ok(text) = String::from_utf8(bytes) {
                            self.on_message(generation, &text).await;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "stream closed by server");
                        self.on_close(generation, &target, &config, true).await;
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        self.on_error(generation, &format!("stream error: {e}")).await;
                        self.on_close(generation, &target, &config, true).await;
                        return;
                    }
                    None => {
                        self.on_close(generation, &target, &config, true).await;
                        return;
                    }
                }
            }
        }
    }

    async fn on_open(&self, generation: u64, target: &str) {
        let lc = self.lifecycle.lock().await;
        if lc.generation != generation {
            return;
        }
        let now = Utc::now();
        self.store
            .update_connection(|c| {
                c.stream_connected = true;
                c.stream_phase = StreamPhase::Connected;
                c.stream_endpoint = target.to_string();
                c.last_error = None;
                c.last_event_at = Some(now);
            })
            .await;
        self.store
            .push_log(LogLevel::Info, format!("Stream connected to {target}"))
            .await;
        info!(endpoint = %target, "stream connected");
    }

    async fn on_message(&self, generation: u64, text: &str) {
        let lc = self.lifecycle.lock().await;
        if lc.generation != generation {
            return;
        }
        let payload: Option<Value> = serde_json::from_str(text).ok();
        if let Some(p) = payload.as_ref() {
            let previous = self.store.snapshot().await;
            if let Some(snapshot) = recognize_snapshot(p, &previous) {
                self.store.replace_snapshot(snapshot).await;
            }
        }
        // Raw text only feeds log extraction for non-JSON frames.
        let raw = if payload.is_none() { text } else { "" };
        self.store.append_lines(extract_logs(payload.as_ref(), raw)).await;

        let now = Utc::now();
        self.store
            .update_connection(|c| {
                c.last_event_at = Some(now);
                c.api_reachable = true;
            })
            .await;
        drop(lc);
    }

    async fn on_error(&self, generation: u64, message: &str) {
        let lc = self.lifecycle.lock().await;
        if lc.generation != generation {
            return;
        }
        warn!(error = %message, "stream error");
        self.store
            .update_connection(|c| c.last_error = Some(message.to_string()))
            .await;
    }

    async fn on_close(
        &self,
        generation: u64,
        target: &str,
        config: &EndpointConfig,
        was_connected: bool,
    ) {
        let mut lc = self.lifecycle.lock().await;
        if lc.generation != generation {
            return;
        }
        if lc.active.as_ref().is_some_and(|a| a.generation == generation) {
            lc.active = None;
        }

        let schedule = !lc.manual_disconnect && config.auto_reconnect;
        let delay = reconnect_delay(config.polling_interval_ms);
        if schedule {
            lc.cancel_reconnect();
            let timer = self.clone().reconnect_after(delay, generation, config.clone());
            let task = tokio::spawn(timer);
            lc.reconnect = Some(ReconnectTimer {
                generation,
                delay,
                task,
            });
        }

        self.store
            .update_connection(|c| {
                c.stream_connected = false;
                c.stream_phase = StreamPhase::Disconnected;
                c.reconnect_scheduled = schedule;
            })
            .await;
        if was_connected {
            self.store
                .push_log(LogLevel::Warn, format!("Stream disconnected from {target}"))
                .await;
        }
        if schedule {
            info!(delay_ms = delay.as_millis() as u64, "stream reconnect scheduled");
            self.store
                .push_log(
                    LogLevel::Info,
                    format!("Reconnecting stream in {}ms", delay.as_millis()),
                )
                .await;
        }
    }

    // Boxed so the session task and the timer task do not form a recursive future type.
    fn reconnect_after(
        self,
        delay: Duration,
        generation: u64,
        config: EndpointConfig,
    ) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            {
                let mut lc = self.lifecycle.lock().await;
                match lc.reconnect.as_ref() {
                    Some(timer) if timer.generation == generation => {}
                    _ => return,
                }
                // Detach our own handle so the connect below does not abort this task.
                // `open` rechecks the manual-disconnect flag under its own lock.
                lc.reconnect = None;
            }
            let outcome = self.open(config, Attempt::Reconnect).await;
            debug!(?outcome, "scheduled reconnect attempt finished");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> EndpointConfig {
        EndpointConfig::new("http://127.0.0.1:9", None, 5_000, true)
    }

    #[tokio::test]
    async fn timer_attempt_after_operator_disconnect_opens_nothing() {
        let store = Store::new();
        let session = SessionManager::new(store.clone());
        session.disconnect().await;
        let generation = session.lifecycle.lock().await.generation;

        // The timer has already detached itself and lost the lock to `disconnect`.
        let outcome = session.open(unreachable_config(), Attempt::Reconnect).await;
        assert_eq!(outcome, SessionOutcome::Cancelled);

        let lc = session.lifecycle.lock().await;
        assert!(lc.active.is_none());
        assert!(lc.reconnect.is_none());
        assert_eq!(lc.generation, generation);
        drop(lc);
        let state = store.connection().await;
        assert_eq!(state.stream_phase, StreamPhase::Disconnected);
        assert!(!state.stream_connected);
    }

    #[tokio::test]
    async fn operator_connect_clears_the_disconnect_flag() {
        let session = SessionManager::new(Store::new());
        session.disconnect().await;
        let outcome = session.connect(&unreachable_config()).await;
        assert_ne!(outcome, SessionOutcome::Cancelled);
        assert!(!session.lifecycle.lock().await.manual_disconnect);
        session.shutdown().await;
    }
}
