//! Console façade: the calls the presentation layer makes, wired to the
//! prober, session manager, dispatcher and shared store.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::{self, ConsoleConfig};
use crate::dispatch::Dispatcher;
use crate::endpoint::{derive_stream, normalize_http};
use crate::error::ConfigError;
use crate::logfile::LocalLog;
use crate::prober::Prober;
use crate::reconcile::MAX_LOG_LINES;
use crate::session::{SessionManager, SessionOutcome};
use crate::state::Store;
use crate::types::{ActionResult, ConnectionState, EndpointConfig, LogLevel, Snapshot};

/// Files whose presence marks a directory as a bot checkout.
const ENTRY_POINTS: &[&str] = &[
    "package.json",
    "index.js",
    "main.py",
    "bot.py",
    "app.py",
    "Cargo.toml",
    "main.go",
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppMeta {
    pub name: String,
    pub version: String,
    pub description: String,
    pub platform: String,
    pub config_path: String,
    pub log_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SetupCheck {
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

impl SetupCheck {
    fn new(name: &str, ok: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            ok,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SetupReport {
    pub ok: bool,
    pub checks: Vec<SetupCheck>,
}

/// One `watch` iteration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchTick {
    pub snapshot: Snapshot,
    pub connection: ConnectionState,
    pub new_logs: Vec<String>,
}

pub struct Console {
    config_path: PathBuf,
    config: RwLock<ConsoleConfig>,
    store: Store,
    prober: Prober,
    session: SessionManager,
    dispatcher: Dispatcher,
}

impl Console {
    /// Loads the config at `config_path` and logs beside it.
    pub fn open(config_path: PathBuf) -> Self {
        let cfg = config::load_config(&config_path);
        Self::with_config(config_path, cfg)
    }

    pub fn with_config(config_path: PathBuf, cfg: ConsoleConfig) -> Self {
        let store = Store::with_local_log(LocalLog::new(config::log_path_for(&config_path)));
        let prober = Prober::new(store.clone());
        Self::with_store(config_path, cfg, store, prober)
    }

    /// Fully explicit wiring; tests use it to shorten the probe timeout.
    pub fn with_store(
        config_path: PathBuf,
        cfg: ConsoleConfig,
        store: Store,
        prober: Prober,
    ) -> Self {
        let session = SessionManager::new(store.clone());
        let dispatcher = Dispatcher::new(prober.clone(), store.clone());
        Self {
            config_path,
            config: RwLock::new(cfg),
            store,
            prober,
            session,
            dispatcher,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub async fn endpoint_config(&self) -> EndpointConfig {
        self.config.read().await.endpoint_config()
    }

    pub fn app_meta(&self) -> AppMeta {
        AppMeta {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: env!("CARGO_PKG_DESCRIPTION").to_string(),
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            config_path: self.config_path.display().to_string(),
            log_path: self
                .store
                .local_log()
                .map(|l| l.path().display().to_string()),
        }
    }

    pub async fn read_config(&self) -> ConsoleConfig {
        self.config.read().await.clone()
    }

    /// Normalizes, persists and adopts `cfg`. Returns what was stored.
    pub async fn save_config(&self, cfg: ConsoleConfig) -> Result<ConsoleConfig, ConfigError> {
        let cfg = cfg.normalized();
        config::save_config(&self.config_path, &cfg)?;
        *self.config.write().await = cfg.clone();
        info!(path = %self.config_path.display(), "configuration saved");
        self.store
            .push_log(LogLevel::Info, format!("Configuration saved ({})", cfg.api_endpoint))
            .await;
        Ok(cfg)
    }

    pub async fn run_setup_checks(&self, bot_path: &str) -> SetupReport {
        let cfg = self.read_config().await;
        let mut checks = Vec::new();

        let bot_path = bot_path.trim();
        let path = Path::new(bot_path);
        checks.push(SetupCheck::new(
            "bot path provided",
            !bot_path.is_empty(),
            if bot_path.is_empty() {
                "no bot path given".to_string()
            } else {
                bot_path.to_string()
            },
        ));
        let exists = !bot_path.is_empty() && path.exists();
        checks.push(SetupCheck::new(
            "bot path exists",
            exists,
            if exists { "found" } else { "path does not exist" },
        ));
        let is_dir = exists && path.is_dir();
        checks.push(SetupCheck::new(
            "bot path is a directory",
            is_dir,
            if is_dir { "directory" } else { "not a directory" },
        ));
        let entry = if is_dir {
            ENTRY_POINTS.iter().find(|name| path.join(name).is_file())
        } else {
            None
        };
        checks.push(SetupCheck::new(
            "entry point present",
            entry.is_some(),
            match entry {
                Some(name) => format!("found {name}"),
                None => format!("none of {} found", ENTRY_POINTS.join(", ")),
            },
        ));

        let api = normalize_http(&cfg.api_endpoint);
        checks.push(SetupCheck::new(
            "api endpoint valid",
            !api.is_empty(),
            if api.is_empty() {
                format!("cannot parse '{}'", cfg.api_endpoint)
            } else {
                api.clone()
            },
        ));
        let explicit = Some(cfg.stream_endpoint.as_str()).filter(|s| !s.trim().is_empty());
        let stream = derive_stream(&api, explicit);
        checks.push(SetupCheck::new(
            "stream endpoint derivable",
            !stream.is_empty(),
            if stream.is_empty() { "no stream endpoint".to_string() } else { stream },
        ));

        let (writable, detail) = match config_dir_writable(&self.config_path) {
            Ok(()) => (true, "writable".to_string()),
            Err(e) => (false, e.to_string()),
        };
        checks.push(SetupCheck::new("config directory writable", writable, detail));

        let ok = checks.iter().all(|c| c.ok);
        debug!(ok, "setup checks finished");
        SetupReport { ok, checks }
    }

    /// Remote snapshot when available, else the cached one.
    pub async fn get_snapshot(&self) -> Snapshot {
        let ep = self.endpoint_config().await;
        match self.prober.fetch_snapshot(&ep).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!(error = %e, "using cached snapshot");
                self.store.snapshot().await
            }
        }
    }

    pub async fn perform_bot_action(&self, action: &str) -> ActionResult {
        let ep = self.endpoint_config().await;
        self.dispatcher.perform_action(&ep, action).await
    }

    /// Remote logs, else the local log file, else the in-memory cache.
    pub async fn get_logs(&self) -> Vec<String> {
        let ep = self.endpoint_config().await;
        match self.prober.fetch_logs(&ep).await {
            Ok(lines) => lines,
            Err(e) => {
                debug!(error = %e, "remote logs unavailable");
                let local = self
                    .store
                    .local_log()
                    .map(|l| l.tail(MAX_LOG_LINES))
                    .unwrap_or_default();
                if local.is_empty() {
                    self.store.logs().await
                } else {
                    local
                }
            }
        }
    }

    /// Forced reachability probe, ignoring the cooldown.
    pub async fn test_connection(&self) -> ConnectionState {
        let ep = self.endpoint_config().await;
        self.prober.probe(&ep).await
    }

    pub async fn connection_status(&self) -> ConnectionState {
        self.store.connection().await
    }

    pub async fn connect_stream(&self) -> ConnectionState {
        let ep = self.endpoint_config().await;
        let outcome = self.session.connect(&ep).await;
        debug!(?outcome, "connect_stream");
        if let SessionOutcome::Failed(e) = &outcome {
            self.store
                .push_log(LogLevel::Error, format!("Stream connect failed: {e}"))
                .await;
        }
        self.store.connection().await
    }

    pub async fn disconnect_stream(&self) -> ConnectionState {
        self.session.disconnect().await
    }

    /// Polls the snapshot every polling interval and hands each tick to
    /// `on_tick`. Runs until the caller drops the future.
    pub async fn watch<F>(&self, mut on_tick: F)
    where
        F: FnMut(WatchTick),
    {
        let mut seen = 0u64;
        loop {
            let snapshot = self.get_snapshot().await;
            let (new_logs, next_seen) = self.store.logs_since(seen).await;
            seen = next_seen;
            on_tick(WatchTick {
                snapshot,
                connection: self.store.connection().await,
                new_logs,
            });
            let interval = self.config.read().await.polling_interval_ms;
            let interval = interval.max(config::MIN_POLLING_INTERVAL_MS);
            tokio::time::sleep(Duration::from_millis(interval)).await;
        }
    }

    /// Teardown hook: cancels timers and closes the stream.
    pub async fn shutdown(&self) {
        self.session.shutdown().await;
    }
}

fn config_dir_writable(config_path: &Path) -> std::io::Result<()> {
    let dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&dir)?;
    let probe = dir.join(".botwatch-write-test");
    fs::write(&probe, b"ok")?;
    fs::remove_file(&probe)
}
