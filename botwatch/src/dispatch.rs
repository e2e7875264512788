//! Operator actions: remote first, deterministic local simulation as fallback.

use std::str::FromStr;

use chrono::Utc;
use tracing::{info, warn};

use crate::prober::Prober;
use crate::state::Store;
use crate::types::{ActionResult, ActionSource, BotStatus, EndpointConfig, LogLevel, Snapshot};

const MAX_SIM_WORKERS: u32 = 8;
const MAX_SIM_SUCCESS_RATE: f64 = 99.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotAction {
    Start,
    Pause,
    Resume,
    Stop,
    Sync,
}

impl BotAction {
    pub fn as_str(self) -> &'static str {
        match self {
            BotAction::Start => "start",
            BotAction::Pause => "pause",
            BotAction::Resume => "resume",
            BotAction::Stop => "stop",
            BotAction::Sync => "sync",
        }
    }
}

impl FromStr for BotAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(BotAction::Start),
            "pause" => Ok(BotAction::Pause),
            "resume" => Ok(BotAction::Resume),
            "stop" => Ok(BotAction::Stop),
            "sync" => Ok(BotAction::Sync),
            other => Err(format!("unknown action '{other}'")),
        }
    }
}

/// Local state transition for `action`. Every action is accepted from every status.
pub fn simulate(current: &Snapshot, action: BotAction) -> Snapshot {
    let mut next = current.clone();
    match action {
        BotAction::Start => {
            next.status = BotStatus::Running;
            next.active_workers = current.active_workers.saturating_add(1).min(MAX_SIM_WORKERS);
        }
        BotAction::Pause => next.status = BotStatus::Paused,
        BotAction::Resume => next.status = BotStatus::Running,
        BotAction::Stop => {
            next.status = BotStatus::Stopped;
            next.active_workers = 0;
        }
        BotAction::Sync => {
            next.queue_depth = current.queue_depth.saturating_sub(2);
            next.jobs_processed = current.jobs_processed.saturating_add(3);
            next.success_rate = (current.success_rate + 0.1).min(MAX_SIM_SUCCESS_RATE);
        }
    }
    next.last_heartbeat = Utc::now();
    next
}

#[derive(Clone)]
pub struct Dispatcher {
    prober: Prober,
    store: Store,
}

impl Dispatcher {
    pub fn new(prober: Prober, store: Store) -> Self {
        Self { prober, store }
    }

    pub async fn perform_action(&self, config: &EndpointConfig, action: &str) -> ActionResult {
        let name = action.trim().to_ascii_lowercase();

        match self.prober.send_action(config, &name).await {
            Ok(ack) => {
                let snapshot = match ack.snapshot {
                    Some(s) => s,
                    None => self.store.snapshot().await,
                };
                let message = ack
                    .message
                    .unwrap_or_else(|| format!("Remote action '{name}' accepted"));
                self.store
                    .push_log(LogLevel::Info, format!("Action '{name}' sent to remote: {message}"))
                    .await;
                ActionResult {
                    ok: true,
                    message,
                    snapshot,
                    source: ActionSource::Remote,
                }
            }
            Err(e) => {
                warn!(action = %name, error = %e, "remote action failed; simulating locally");
                self.simulate_locally(&name, &e.to_string()).await
            }
        }
    }

    async fn simulate_locally(&self, name: &str, reason: &str) -> ActionResult {
        let current = self.store.snapshot().await;
        let (snapshot, message) = match name.parse::<BotAction>() {
            Ok(action) => {
                let next = simulate(&current, action);
                self.store.replace_snapshot(next.clone()).await;
                let message = format!(
                    "Local simulation: '{}' applied, status {}",
                    action.as_str(),
                    next.status
                );
                self.store
                    .push_log(LogLevel::Warn, format!("{message} (remote unavailable: {reason})"))
                    .await;
                info!(action = action.as_str(), status = %next.status, "local simulation applied");
                (next, message)
            }
            Err(_) => {
                let message = format!("Ignored unknown action '{name}'");
                self.store.push_log(LogLevel::Warn, message.clone()).await;
                (current, message)
            }
        };
        ActionResult {
            ok: true,
            message,
            snapshot,
            source: ActionSource::Local,
        }
    }
}
