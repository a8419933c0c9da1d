//! Plugin manager: lifecycle façade and the single invocation gateway.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use ensemble_config::PluginsConfig;
use ensemble_core::types::PluginRegistration;

use crate::discovery::PluginDiscovery;
use crate::environment::PluginEnvironment;
use crate::host::ProcessHost;
use crate::loader::PluginLoader;
use crate::protocol::{InvokeRequest, InvokeResponse};
use crate::registry::PluginRegistry;

/// Failure modes of [`PluginManager::call`]. Nothing escapes this boundary
/// as a panic or a raw process error.
#[derive(Debug, Error)]
pub enum PluginCallError {
    #[error("plugin '{0}' not found")]
    PluginNotFound(String),
    #[error("function '{function}' not found in plugin '{plugin}'")]
    FunctionNotFound { plugin: String, function: String },
    #[error("invocation of '{function}' failed: {message}")]
    Invocation { function: String, message: String },
}

/// Lifecycle façade over discovery, loading, the registry and invocation.
pub struct PluginManager {
    config: PluginsConfig,
    discovery: PluginDiscovery,
    loader: PluginLoader,
    registry: RwLock<PluginRegistry>,
    host: ProcessHost,
    shutdown: CancellationToken,
}

impl PluginManager {
    pub fn new(config: PluginsConfig) -> Self {
        Self {
            discovery: PluginDiscovery::new(&config),
            loader: PluginLoader::new(),
            registry: RwLock::new(PluginRegistry::new()),
            host: ProcessHost::new(config.python_bin.clone()),
            shutdown: CancellationToken::new(),
            config,
        }
    }

    /// Plugins root this manager discovers from.
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Start the manager: auto-discovery (when enabled) plus the background
    /// health-check task.
    pub async fn start(self: &Arc<Self>) {
        info!(root = %self.config.root.display(), "starting plugin manager");
        if self.config.auto_discover {
            self.discover_and_register().await;
        }

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.health_check_loop().await;
        });
    }

    /// Signal discovery and the health-check task to stop. A plugin call
    /// already in flight is allowed to finish.
    pub fn stop(&self) {
        info!("stopping plugin manager");
        self.discovery.stop();
        self.shutdown.cancel();
    }

    /// Drop all registrations and re-run discovery. Identity is preserved:
    /// a plugin re-discovered at a known path keeps its id.
    pub async fn reload(&self) -> usize {
        info!("reloading plugins");
        // Registrations are not cleared up front; re-registering by path
        // replaces them in place, and plugins that vanished from disk are
        // swept afterwards.
        let results = self.discovery.start().await;
        let mut registry = self.registry.write().await;
        let mut seen = Vec::with_capacity(results.len());
        for discovered in &results {
            let registration = self.loader.load_plugin(discovered);
            seen.push(registration.path.clone());
            registry.register(registration);
        }
        let stale: Vec<String> = registry
            .registrations()
            .filter(|r| !seen.contains(&r.path))
            .map(|r| r.id.clone())
            .collect();
        for id in stale {
            let _ = registry.unregister(&id);
        }
        registry.len()
    }

    /// Install (or update) the plugin at `path`. Returns whether a plugin
    /// was registered; never raises.
    pub async fn install(&self, path: &Path) -> bool {
        let results = self.discovery.start().await;
        for discovered in &results {
            if discovered.path == path {
                let registration = self.loader.load_plugin(discovered);
                let id = self.registry.write().await.register(registration);
                info!(plugin_id = %id, path = %path.display(), "plugin installed");
                return true;
            }
        }
        warn!(path = %path.display(), "install found no plugin at path");
        false
    }

    /// Remove a plugin from the registry. Returns whether it existed.
    pub async fn uninstall(&self, plugin_id: &str) -> bool {
        match self.registry.write().await.unregister(plugin_id) {
            Ok(_) => {
                info!(plugin_id, "plugin uninstalled");
                true
            }
            Err(e) => {
                error!(plugin_id, error = %e, "uninstall failed");
                false
            }
        }
    }

    /// Invoke one plugin function.
    ///
    /// `plugin` may be a registry id or a plugin name (the name lookup
    /// covers steps holding stale ids after a hot reload). Every failure
    /// mode is converted into a [`PluginCallError`] at this boundary.
    pub async fn call(
        &self,
        plugin: &str,
        function_name: &str,
        params: Value,
    ) -> Result<Value, PluginCallError> {
        let registration = self
            .resolve(plugin)
            .await
            .ok_or_else(|| PluginCallError::PluginNotFound(plugin.to_string()))?;

        if registration.find_function(function_name).is_none() {
            return Err(PluginCallError::FunctionNotFound {
                plugin: registration.name(),
                function: function_name.to_string(),
            });
        }

        let invocation_error = |message: String| PluginCallError::Invocation {
            function: function_name.to_string(),
            message,
        };

        let environment = PluginEnvironment::enter(&registration.path)
            .map_err(|e| invocation_error(format!("failed to enter plugin environment: {e}")))?;
        let request = serde_json::to_string(&InvokeRequest::new(function_name, &params))
            .map_err(|e| invocation_error(e.to_string()))?;

        debug!(
            plugin_id = %registration.id,
            function = function_name,
            "invoking plugin function"
        );
        let response: InvokeResponse = self
            .host
            .exchange_json(
                &registration.entry_file,
                environment.child_env(),
                &request,
                Duration::from_millis(self.config.call_timeout_ms),
            )
            .await
            .map_err(|e| invocation_error(e.to_string()))?;

        match response {
            InvokeResponse::Ok { ok } => Ok(ok),
            InvokeResponse::Error { error } => Err(invocation_error(error)),
        }
    }

    /// Registered plugin ids.
    pub async fn list(&self) -> Vec<String> {
        self.registry.read().await.list()
    }

    pub async fn get_info(&self, plugin_id: &str) -> Option<PluginRegistration> {
        self.registry.read().await.get(plugin_id).cloned()
    }

    pub async fn get_by_name(&self, name: &str) -> Option<PluginRegistration> {
        self.registry.read().await.get_by_name(name).cloned()
    }

    /// Plugins that are both loaded and enabled.
    pub async fn list_available(&self) -> Vec<PluginRegistration> {
        self.registry
            .read()
            .await
            .registrations()
            .filter(|p| p.is_available())
            .cloned()
            .collect()
    }

    async fn resolve(&self, plugin: &str) -> Option<PluginRegistration> {
        let registry = self.registry.read().await;
        registry
            .get(plugin)
            .or_else(|| registry.get_by_name(plugin))
            .cloned()
    }

    async fn discover_and_register(&self) {
        let results = self.discovery.start().await;
        let mut registry = self.registry.write().await;
        for discovered in &results {
            let registration = self.loader.load_plugin(discovered);
            registry.register(registration);
        }
        info!(registered = registry.len(), "plugin discovery registered");
    }

    /// Periodic health-check extension point. Currently only traces; a
    /// future revision can re-probe plugin entry files here.
    async fn health_check_loop(&self) {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.health_check_interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("health check loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let registry = self.registry.read().await;
                    trace!(plugins = registry.len(), "plugin health check tick");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ensemble_core::types::LoadStatus;
    use serde_json::json;

    const CAMERA_SCRIPT: &str = concat!(
        "read -r line\n",
        "case \"$line\" in\n",
        "  *'\"op\":\"describe\"'*)\n",
        "    printf '{\"services\":[{\"name\":\"camera\",\"config\":{},",
        "\"functions\":[{\"name\":\"take_photo\",\"description\":\"snap\"}]}]}\\n' ;;\n",
        "  *'\"function\":\"take_photo\"'*)\n",
        "    printf '{\"ok\":{\"file\":\"photo.jpg\"}}\\n' ;;\n",
        "  *)\n",
        "    printf '{\"error\":\"unknown function\"}\\n' ;;\n",
        "esac\n",
    );

    fn setup_root() -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("camera-sim");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("main.sh"), CAMERA_SCRIPT).unwrap();
        root
    }

    fn manager_for(root: &Path) -> Arc<PluginManager> {
        Arc::new(PluginManager::new(PluginsConfig {
            root: root.to_path_buf(),
            ..PluginsConfig::default()
        }))
    }

    #[test]
    fn test_start_registers_discovered_plugins() {
        tokio_test::block_on(async {
            let root = setup_root();
            let manager = manager_for(root.path());
            manager.start().await;

            let ids = manager.list().await;
            assert_eq!(ids.len(), 1);
            let info = manager.get_info(&ids[0]).await.unwrap();
            assert_eq!(info.load_status, LoadStatus::Loaded);
            assert_eq!(manager.list_available().await.len(), 1);
            manager.stop();
        });
    }

    #[test]
    fn test_call_resolves_by_id_and_by_name() {
        tokio_test::block_on(async {
            let root = setup_root();
            let manager = manager_for(root.path());
            manager.start().await;
            let id = manager.list().await.remove(0);

            let by_id = manager.call(&id, "take_photo", json!({})).await.unwrap();
            assert_eq!(by_id["file"], "photo.jpg");

            let by_name = manager
                .call("camera-sim", "take_photo", json!({}))
                .await
                .unwrap();
            assert_eq!(by_name["file"], "photo.jpg");
            manager.stop();
        });
    }

    #[test]
    fn test_call_error_modes_are_typed() {
        tokio_test::block_on(async {
            let root = setup_root();
            let manager = manager_for(root.path());
            manager.start().await;

            let missing_plugin = manager.call("ghost", "take_photo", json!({})).await;
            assert!(matches!(
                missing_plugin,
                Err(PluginCallError::PluginNotFound(_))
            ));

            let missing_function = manager.call("camera-sim", "levitate", json!({})).await;
            assert!(matches!(
                missing_function,
                Err(PluginCallError::FunctionNotFound { .. })
            ));
            manager.stop();
        });
    }

    #[test]
    fn test_reload_preserves_plugin_identity() {
        tokio_test::block_on(async {
            let root = setup_root();
            let manager = manager_for(root.path());
            manager.start().await;
            let before = manager.list().await.remove(0);

            manager.reload().await;
            let after = manager.list().await.remove(0);
            assert_eq!(before, after);
            manager.stop();
        });
    }

    #[test]
    fn test_reload_sweeps_removed_plugins() {
        tokio_test::block_on(async {
            let root = setup_root();
            let manager = manager_for(root.path());
            manager.start().await;
            assert_eq!(manager.list().await.len(), 1);

            std::fs::remove_dir_all(root.path().join("camera-sim")).unwrap();
            manager.reload().await;
            assert!(manager.list().await.is_empty());
            manager.stop();
        });
    }

    #[test]
    fn test_install_and_uninstall_report_booleans() {
        tokio_test::block_on(async {
            let root = setup_root();
            let manager = manager_for(root.path());
            manager.start().await;

            assert!(!manager.install(Path::new("/nowhere")).await);
            assert!(manager.install(&root.path().join("camera-sim")).await);

            let id = manager.list().await.remove(0);
            assert!(manager.uninstall(&id).await);
            assert!(!manager.uninstall(&id).await);
            manager.stop();
        });
    }
}
