//! Console configuration: endpoints, polling policy, bot path and UI preferences.
//! Stored under XDG config dir: $XDG_CONFIG_HOME/botwatch/config.json
//! (fallback ~/.config/botwatch/config.json)

use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::endpoint::{derive_stream, normalize_http};
use crate::error::ConfigError;
use crate::types::EndpointConfig;

pub const DEFAULT_API_ENDPOINT: &str = "http://127.0.0.1:5050";
pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 5_000;
pub const MIN_POLLING_INTERVAL_MS: u64 = 1_000;
pub const MAX_POLLING_INTERVAL_MS: u64 = 600_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UiPreferences {
    pub theme: String,
    pub compact_mode: bool,
    pub show_notifications: bool,
}

impl Default for UiPreferences {
    fn default() -> Self {
        Self {
            theme: "dark".into(),
            compact_mode: false,
            show_notifications: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsoleConfig {
    pub api_endpoint: String,
    /// Explicit stream endpoint; empty means "derive from `api_endpoint`".
    pub stream_endpoint: String,
    pub polling_interval_ms: u64,
    pub auto_reconnect: bool,
    pub bot_path: String,
    pub preferences: UiPreferences,
    pub version: u32,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api_endpoint: DEFAULT_API_ENDPOINT.into(),
            stream_endpoint: String::new(),
            polling_interval_ms: DEFAULT_POLLING_INTERVAL_MS,
            auto_reconnect: true,
            bot_path: String::new(),
            preferences: UiPreferences::default(),
            version: 1,
        }
    }
}

impl ConsoleConfig {
    pub fn endpoint_config(&self) -> EndpointConfig {
        let explicit = Some(self.stream_endpoint.as_str()).filter(|s| !s.trim().is_empty());
        EndpointConfig::new(
            &self.api_endpoint,
            explicit,
            self.polling_interval_ms,
            self.auto_reconnect,
        )
    }

    /// Canonical form written on save: endpoints normalized, interval clamped.
    pub fn normalized(mut self) -> Self {
        self.api_endpoint = normalize_http(&self.api_endpoint);
        let explicit = self.stream_endpoint.trim().to_string();
        self.stream_endpoint = if explicit.is_empty() {
            String::new()
        } else {
            derive_stream(&self.api_endpoint, Some(explicit.as_str()))
        };
        self.polling_interval_ms = self
            .polling_interval_ms
            .clamp(MIN_POLLING_INTERVAL_MS, MAX_POLLING_INTERVAL_MS);
        self.bot_path = self.bot_path.trim().to_string();
        self
    }
}

pub fn config_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join("botwatch")
    } else {
        dirs_next::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("botwatch")
    }
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Local log file kept beside the config file.
pub fn log_path_for(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("console.log")
}

/// Missing or unreadable config reads as defaults.
pub fn load_config(path: &Path) -> ConsoleConfig {
    match fs::read_to_string(path) {
        Ok(s) => serde_json::from_str(&s).unwrap_or_default(),
        Err(_) => ConsoleConfig::default(),
    }
}

pub fn save_config(path: &Path, config: &ConsoleConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_vec_pretty(config)?;
    fs::write(path, data)?;
    Ok(())
}
