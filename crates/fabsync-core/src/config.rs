//! Configuration resolution for fabsync.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/fabsync/settings.json)
//! 3. Project config (.fabsync/settings.json)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Default API root of the equipment-management service.
pub const DEFAULT_API_URL: &str = "https://fabman.io/api/v1";

/// Page size requested from the resources endpoint.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Default poll interval (seconds).
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Accepted poll interval range (seconds).
pub const POLL_INTERVAL_RANGE: std::ops::RangeInclusive<u64> = 10..=3600;

/// Complete fabsync configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Remote API access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub url: String,
    pub token: Option<String>,
    pub page_limit: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_API_URL.to_string(),
            token: None,
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// Periodic synchronisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enable_periodic_sync: bool,
    pub poll_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enable_periodic_sync: true,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl SyncConfig {
    /// Poll interval, or `None` when periodic sync is turned off.
    pub fn poll_interval(&self) -> Option<Duration> {
        self.enable_periodic_sync
            .then(|| Duration::from_secs(self.poll_interval_secs))
    }
}

/// Daemon HTTP server and logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8124)),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Check values a file or environment could have set out of range.
    pub fn validate(&self) -> Result<()> {
        if self.api.token.as_deref().is_none_or(str::is_empty) {
            return Err(Error::Config("api.token is required".into()));
        }
        if self.api.url.trim().is_empty() {
            return Err(Error::Config("api.url is empty".into()));
        }
        if self.api.page_limit == 0 {
            return Err(Error::Config("api.page_limit must be positive".into()));
        }
        if !POLL_INTERVAL_RANGE.contains(&self.sync.poll_interval_secs) {
            return Err(Error::Config(format!(
                "sync.poll_interval_secs must be within {}..={} (got {})",
                POLL_INTERVAL_RANGE.start(),
                POLL_INTERVAL_RANGE.end(),
                self.sync.poll_interval_secs
            )));
        }
        Ok(())
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    // Load global config
    if let Some(global_path) = global_config_path()
        && global_path.exists()
    {
        let global = load_config_file(&global_path)?;
        merge_config(&mut config, global);
    }

    // Load project config
    if let Some(dir) = project_dir {
        let project_path = dir.join(".fabsync").join("settings.json");
        if project_path.exists() {
            let project = load_config_file(&project_path)?;
            merge_config(&mut config, project);
        }
    }

    // Apply environment overrides
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".fabsync").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/fabsync/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("fabsync").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

/// Read one settings file.
pub fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Overlay `overlay` onto `base`. A token is only replaced when the overlay
/// carries one, so a project file need not repeat the global secret.
pub fn merge_config(base: &mut Config, overlay: Config) {
    base.api.url = overlay.api.url;
    base.api.page_limit = overlay.api.page_limit;
    if overlay.api.token.is_some() {
        base.api.token = overlay.api.token;
    }

    base.sync = overlay.sync;
    base.server = overlay.server;
}

/// Apply `FABSYNC_*` overrides read through `lookup`.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("FABSYNC_API_URL") {
        config.api.url = val;
    }
    if let Some(val) = lookup("FABSYNC_API_TOKEN") {
        config.api.token = Some(val);
    }
    if let Some(n) = lookup("FABSYNC_PAGE_LIMIT").and_then(|v| v.parse().ok()) {
        config.api.page_limit = n;
    }
    if let Some(flag) = lookup("FABSYNC_PERIODIC_SYNC").and_then(|v| parse_flag(&v)) {
        config.sync.enable_periodic_sync = flag;
    }
    if let Some(n) = lookup("FABSYNC_POLL_INTERVAL").and_then(|v| v.parse().ok()) {
        config.sync.poll_interval_secs = n;
    }
    if let Some(addr) = lookup("FABSYNC_ADDR").and_then(|v| v.parse().ok()) {
        config.server.addr = addr;
    }
    if let Some(val) = lookup("FABSYNC_LOG_LEVEL") {
        config.server.log_level = val;
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
