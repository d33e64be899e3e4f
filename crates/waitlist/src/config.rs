//! Configuration loading
//!
//! # Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Global config: ~/.config/waitlist/config.toml
//! 3. Project config: ./waitlist.toml, or the file given with `--config`
//! 4. Environment variables: WAITLIST_*
//!
//! # Example Config
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8080"
//!
//! [database]
//! url = "sqlite:/var/lib/waitlist/waitlist.db"
//!
//! [queue]
//! claim_window_secs = 300
//! sweep_interval_secs = 30
//!
//! [notify]
//! webhook_url = "https://notify.internal/turn"
//! ```

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use waitlist_core::{Error, QueueSettings, Result};

const PROJECT_CONFIG_FILE: &str = "waitlist.toml";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub notify: NotifyConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address for the HTTP API
    pub bind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `sqlite:` URL; `sqlite::memory:` for a throwaway database
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// How long a notified member has to claim
    pub claim_window_secs: i64,
    /// Period of the expiry sweep
    pub sweep_interval_secs: u64,
    /// Upper bound on one notification delivery
    pub notify_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// POST turn notices here; log them when unset
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default `tracing` directive, overridden by `RUST_LOG`
    pub level: String,
}

/// One config file. Only the keys it actually sets override earlier layers,
/// so a file can put a value back to its default.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigLayer {
    server: ServerLayer,
    database: DatabaseLayer,
    queue: QueueLayer,
    notify: NotifyLayer,
    log: LogLayer,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ServerLayer {
    bind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DatabaseLayer {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct QueueLayer {
    claim_window_secs: Option<i64>,
    sweep_interval_secs: Option<u64>,
    notify_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct NotifyLayer {
    /// An empty string disables a webhook set by an earlier layer
    webhook_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LogLayer {
    level: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════
// DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:waitlist.db".to_string(),
            max_connections: 1,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            claim_window_secs: QueueSettings::DEFAULT_CLAIM_WINDOW_SECS,
            sweep_interval_secs: 30,
            notify_timeout_ms: QueueSettings::DEFAULT_NOTIFY_TIMEOUT_MS,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Load configuration from all sources with hierarchy
///
/// `explicit` replaces the project config lookup and must exist.
///
/// # Errors
///
/// Returns error if:
/// - A config file is unreadable or malformed TOML
/// - An environment override does not parse
/// - Config values fail validation
pub async fn load_config(explicit: Option<&Path>) -> Result<Config> {
    // 1. Start with built-in defaults
    let mut config = Config::default();

    // 2. Load global config if exists
    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            let global = load_toml_file(&global_path).await?;
            config.apply(global);
        }
    }

    // 3. Project config, or the one asked for on the command line
    match explicit {
        Some(path) => {
            let project = load_toml_file(path).await?;
            config.apply(project);
        }
        None => {
            let project_path = project_config_path()?;
            if project_path.exists() {
                let project = load_toml_file(&project_path).await?;
                config.apply(project);
            }
        }
    }

    // 4. Apply environment variable overrides
    config.apply_env_vars()?;

    // 5. Validate
    config.validate()?;

    Ok(config)
}

impl Config {
    /// Coordinator settings derived from the `[queue]` section
    pub fn queue_settings(&self) -> Result<QueueSettings> {
        QueueSettings::from_secs(self.queue.claim_window_secs, self.queue.notify_timeout_ms)
    }

    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.queue.sweep_interval_secs)
    }

    #[must_use]
    pub const fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.queue.notify_timeout_ms)
    }

    /// Overlay every key the layer sets
    fn apply(&mut self, layer: ConfigLayer) {
        set(&mut self.server.bind, layer.server.bind);
        set(&mut self.database.url, layer.database.url);
        set(&mut self.database.max_connections, layer.database.max_connections);
        set(&mut self.queue.claim_window_secs, layer.queue.claim_window_secs);
        set(&mut self.queue.sweep_interval_secs, layer.queue.sweep_interval_secs);
        set(&mut self.queue.notify_timeout_ms, layer.queue.notify_timeout_ms);
        if let Some(url) = layer.notify.webhook_url {
            self.notify.webhook_url = Some(url).filter(|url| !url.trim().is_empty());
        }
        set(&mut self.log.level, layer.log.level);
    }

    /// Apply environment variable overrides
    ///
    /// # Errors
    ///
    /// Returns error if environment variable values are invalid
    fn apply_env_vars(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var("WAITLIST_BIND") {
            self.server.bind = value;
        }

        if let Ok(value) = std::env::var("WAITLIST_DATABASE_URL") {
            self.database.url = value;
        }

        if let Ok(value) = std::env::var("WAITLIST_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("WAITLIST_DATABASE_MAX_CONNECTIONS", &value)?;
        }

        if let Ok(value) = std::env::var("WAITLIST_CLAIM_WINDOW_SECS") {
            self.queue.claim_window_secs = parse_env("WAITLIST_CLAIM_WINDOW_SECS", &value)?;
        }

        if let Ok(value) = std::env::var("WAITLIST_SWEEP_INTERVAL_SECS") {
            self.queue.sweep_interval_secs = parse_env("WAITLIST_SWEEP_INTERVAL_SECS", &value)?;
        }

        if let Ok(value) = std::env::var("WAITLIST_NOTIFY_TIMEOUT_MS") {
            self.queue.notify_timeout_ms = parse_env("WAITLIST_NOTIFY_TIMEOUT_MS", &value)?;
        }

        // Empty disables the webhook
        if let Ok(value) = std::env::var("WAITLIST_WEBHOOK_URL") {
            self.notify.webhook_url = Some(value).filter(|url| !url.trim().is_empty());
        }

        if let Ok(value) = std::env::var("WAITLIST_LOG_LEVEL") {
            self.log.level = value;
        }

        Ok(())
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any values are out of range or invalid
    fn validate(&self) -> Result<()> {
        self.server.bind.parse::<SocketAddr>().map_err(|e| {
            Error::InvalidConfig(format!("server.bind '{}': {e}", self.server.bind))
        })?;

        if !self.database.url.starts_with("sqlite:") {
            return Err(Error::InvalidConfig(format!(
                "database.url must be a sqlite: URL, got '{}'",
                self.database.url
            )));
        }

        if self.database.max_connections == 0 {
            return Err(Error::InvalidConfig(
                "database.max_connections must be at least 1".to_string(),
            ));
        }

        if self.queue.sweep_interval_secs == 0 {
            return Err(Error::InvalidConfig(
                "queue.sweep_interval_secs must be at least 1".to_string(),
            ));
        }

        // Range checks for claim window and notify timeout
        self.queue_settings()?;

        if let Some(url) = &self.notify.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::InvalidConfig(format!(
                    "notify.webhook_url must be an http(s) URL, got '{url}'"
                )));
            }
        }

        self.log.level.parse::<tracing_subscriber::filter::Directive>().map_err(|e| {
            Error::InvalidConfig(format!("log.level '{}': {e}", self.log.level))
        })?;

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// HELPER FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════

/// Get path to project config file
fn project_config_path() -> Result<PathBuf> {
    std::env::current_dir()
        .map(|dir| dir.join(PROJECT_CONFIG_FILE))
        .map_err(|e| Error::InvalidConfig(format!("Failed to get current directory: {e}")))
}

/// Get path to global config file
fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "waitlist")
        .map(|proj_dirs| proj_dirs.config_dir().join("config.toml"))
}

/// Load a TOML file as one config layer
async fn load_toml_file(path: &Path) -> Result<ConfigLayer> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::InvalidConfig(format!(
            "Failed to read config file {}: {e}",
            path.display()
        ))
    })?;

    toml::from_str(&content).map_err(|e| {
        Error::InvalidConfig(format!("Failed to parse config: {}: {e}", path.display()))
    })
}

fn parse_env<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::InvalidConfig(format!("Invalid {name} value: {e}")))
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
