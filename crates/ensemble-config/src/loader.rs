//! Configuration loading and hot-reload support.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::{EnsembleConfig, ProvidersConfig};

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("File watch error: {0}")]
    Notify(#[from] notify::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Load full Ensemble configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<EnsembleConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: EnsembleConfig = serde_yaml::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load only the providers section from the unified config file.
pub fn load_providers_config(path: &Path) -> Result<ProvidersConfig, ConfigError> {
    let config = load_config(path)?;
    Ok(config.providers)
}

fn validate_config(config: &EnsembleConfig) -> Result<(), ConfigError> {
    if config.version == 0 {
        return Err(ConfigError::Invalid(
            "version must be greater than 0".to_string(),
        ));
    }

    if config.server.host.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "server.host must not be empty".to_string(),
        ));
    }

    match config.store.backend.as_str() {
        "memory" => {}
        "sqlite" => {
            if config.store.connection_url.is_none() {
                return Err(ConfigError::Invalid(
                    "store.connection_url must be set when store.backend is 'sqlite'".to_string(),
                ));
            }
        }
        other => {
            return Err(ConfigError::Invalid(format!(
                "store.backend '{other}' must be 'memory' or 'sqlite'"
            )));
        }
    }

    if config.plugins.call_timeout_ms == 0 {
        return Err(ConfigError::Invalid(
            "plugins.call_timeout_ms must be > 0".to_string(),
        ));
    }

    if config.plugins.describe_timeout_ms == 0 {
        return Err(ConfigError::Invalid(
            "plugins.describe_timeout_ms must be > 0".to_string(),
        ));
    }

    if config.plugins.install_dependencies && config.plugins.installer.is_none() {
        return Err(ConfigError::Invalid(
            "plugins.installer must be set when plugins.install_dependencies is enabled"
                .to_string(),
        ));
    }

    if config.scheduler.interval_secs == 0 {
        return Err(ConfigError::Invalid(
            "scheduler.interval_secs must be > 0".to_string(),
        ));
    }

    if config.scheduler.page_size == 0 || config.scheduler.page_size > 100 {
        return Err(ConfigError::Invalid(
            "scheduler.page_size must be in 1..=100".to_string(),
        ));
    }

    validate_providers(&config.providers)?;

    Ok(())
}

fn validate_providers(config: &ProvidersConfig) -> Result<(), ConfigError> {
    for backend in &config.backends {
        if backend.name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "providers.backends[].name must not be empty".to_string(),
            ));
        }
        if backend.kind.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "providers.backends[].kind must not be empty".to_string(),
            ));
        }
        if backend.model.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "providers.backends[{}].model must not be empty",
                backend.name
            )));
        }
    }

    // Unconfigured names in preferred/fallbacks are skipped at call time,
    // not rejected here.
    Ok(())
}

/// Manages unified configuration with hot-reload support.
pub struct ConfigManager {
    path: PathBuf,
    config: Arc<RwLock<EnsembleConfig>>,
}

impl ConfigManager {
    /// Create a new config manager.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config: Arc::new(RwLock::new(EnsembleConfig::default())),
        }
    }

    /// Get a reference to the current config.
    pub fn config(&self) -> Arc<RwLock<EnsembleConfig>> {
        self.config.clone()
    }

    /// Load configuration from file.
    pub async fn load(&self) -> Result<(), ConfigError> {
        let config = load_config(&self.path)?;
        let mut current = self.config.write().await;
        *current = config;
        Ok(())
    }

    /// Start watching for config file changes.
    pub fn start_watching(self: &Arc<Self>) -> Result<ConfigWatcher, ConfigError> {
        let manager = Arc::clone(self);
        let handle = tokio::runtime::Handle::current();

        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                if let Ok(event) = res {
                    if matches!(
                        event.kind,
                        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                    ) {
                        let manager = Arc::clone(&manager);
                        handle.spawn(async move {
                            if let Err(e) = manager.load().await {
                                tracing::error!("Failed to reload config: {}", e);
                            } else {
                                tracing::info!("Config reloaded successfully");
                            }
                        });
                    }
                }
            })?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        Ok(ConfigWatcher { _watcher: watcher })
    }
}

/// Keeps the file watcher alive.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}
