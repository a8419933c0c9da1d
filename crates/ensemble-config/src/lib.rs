//! # Ensemble Config
//!
//! Unified single-file configuration management for Ensemble.
//! A single `ensemble.yaml` configures the server surface, logging, the task
//! store, the plugin runtime, completion providers, and the scheduler.

mod loader;
mod providers;

pub use loader::{load_config, load_providers_config, ConfigError, ConfigManager, ConfigWatcher};
pub use providers::{ApiKeyError, ProviderSpec, ProvidersConfig};

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level configuration schema for Ensemble.
#[derive(Debug, Clone, Deserialize)]
pub struct EnsembleConfig {
    /// Config schema version.
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            server: ServerConfig::default(),
            log: LogConfig::default(),
            store: StoreConfig::default(),
            plugins: PluginsConfig::default(),
            providers: ProvidersConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// HTTP bind address for the server binary.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8900
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Task store backend selection.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// `memory` or `sqlite`.
    #[serde(default = "default_store_backend")]
    pub backend: String,
    /// Connection URL for database backends, e.g. `sqlite://ensemble.db`.
    #[serde(default)]
    pub connection_url: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            connection_url: None,
        }
    }
}

fn default_store_backend() -> String {
    "memory".to_string()
}

/// Plugin runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginsConfig {
    /// Directory scanned for plugin subdirectories.
    #[serde(default = "default_plugins_root")]
    pub root: PathBuf,
    /// Run discovery automatically on manager start.
    #[serde(default = "default_true")]
    pub auto_discover: bool,
    /// Interpreter used for `.py` entry files.
    #[serde(default = "default_python_bin")]
    pub python_bin: String,
    /// Deadline for one `describe` handshake.
    #[serde(default = "default_describe_timeout_ms")]
    pub describe_timeout_ms: u64,
    /// Deadline for one function invocation.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Run the declared dependency installer during discovery.
    #[serde(default)]
    pub install_dependencies: bool,
    /// Installer command executed inside the plugin directory.
    #[serde(default)]
    pub installer: Option<String>,
    /// Re-discover plugins when the root directory changes on disk.
    #[serde(default)]
    pub watch: bool,
    /// Interval of the manager's background health check.
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            root: default_plugins_root(),
            auto_discover: true,
            python_bin: default_python_bin(),
            describe_timeout_ms: default_describe_timeout_ms(),
            call_timeout_ms: default_call_timeout_ms(),
            install_dependencies: false,
            installer: None,
            watch: false,
            health_check_interval_secs: default_health_check_interval_secs(),
        }
    }
}

fn default_plugins_root() -> PathBuf {
    PathBuf::from("plugins")
}

fn default_true() -> bool {
    true
}

fn default_python_bin() -> String {
    "python3".to_string()
}

fn default_describe_timeout_ms() -> u64 {
    10_000
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

fn default_health_check_interval_secs() -> u64 {
    60
}

/// Periodic task scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduler passes.
    #[serde(default = "default_scheduler_interval_secs")]
    pub interval_secs: u64,
    /// Pending tasks fetched per page within one pass.
    #[serde(default = "default_scheduler_page_size")]
    pub page_size: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_scheduler_interval_secs(),
            page_size: default_scheduler_page_size(),
        }
    }
}

fn default_scheduler_interval_secs() -> u64 {
    5
}

fn default_scheduler_page_size() -> u32 {
    10
}
