//! Plugin discovery: walks the plugins root and harvests service exports.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use ensemble_config::PluginsConfig;

use crate::environment::PluginEnvironment;
use crate::host::ProcessHost;
use crate::protocol::{DescribeRequest, DescribeResponse, RawServiceExport};

/// Entry files probed in order inside each plugin directory.
const ENTRY_CANDIDATES: [&str; 2] = ["main.py", "main.sh"];

/// Raw outcome of discovering one plugin directory.
///
/// A failed describe handshake still yields a result (with `error` set) so
/// the registry can record the failed load; only directories without an
/// entry file are skipped entirely.
#[derive(Debug, Clone)]
pub struct DiscoveredPlugin {
    pub path: PathBuf,
    pub entry_file: PathBuf,
    pub exports: Vec<RawServiceExport>,
    pub error: Option<String>,
}

/// Walks the plugins root and performs the describe handshake per plugin.
pub struct PluginDiscovery {
    root: PathBuf,
    host: ProcessHost,
    describe_timeout: Duration,
    install_dependencies: bool,
    installer: Option<String>,
    plugins: Mutex<Vec<DiscoveredPlugin>>,
    scanning: AtomicBool,
    stop_requested: AtomicBool,
}

impl PluginDiscovery {
    pub fn new(config: &PluginsConfig) -> Self {
        Self {
            root: config.root.clone(),
            host: ProcessHost::new(config.python_bin.clone()),
            describe_timeout: Duration::from_millis(config.describe_timeout_ms),
            install_dependencies: config.install_dependencies,
            installer: config.installer.clone(),
            plugins: Mutex::new(Vec::new()),
            scanning: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan the plugins root. Idempotent: a call while a scan is already in
    /// progress returns the last completed results instead of re-entering.
    pub async fn start(&self) -> Vec<DiscoveredPlugin> {
        if self.scanning.swap(true, Ordering::SeqCst) {
            debug!("plugin discovery already scanning, returning last results");
            return self.plugins.lock().await.clone();
        }
        self.stop_requested.store(false, Ordering::SeqCst);

        let results = self.scan().await;
        info!(count = results.len(), root = %self.root.display(), "plugin discovery finished");

        let mut plugins = self.plugins.lock().await;
        *plugins = results.clone();
        self.scanning.store(false, Ordering::SeqCst);
        results
    }

    /// Request a cooperative stop. The flag is checked once per plugin
    /// directory; a directory already being processed finishes normally.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Results of the last completed scan.
    pub async fn plugins(&self) -> Vec<DiscoveredPlugin> {
        self.plugins.lock().await.clone()
    }

    async fn scan(&self) -> Vec<DiscoveredPlugin> {
        let mut entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect::<Vec<_>>(),
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "plugins root is not readable");
                return Vec::new();
            }
        };
        entries.sort();

        let mut results = Vec::new();
        for plugin_dir in entries {
            if self.stop_requested.load(Ordering::SeqCst) {
                info!("plugin discovery stop requested, aborting scan");
                break;
            }
            if let Some(result) = self.scan_plugin_dir(&plugin_dir).await {
                results.push(result);
            }
        }
        results
    }

    /// Discover one plugin directory. `None` only when no entry file exists.
    async fn scan_plugin_dir(&self, plugin_dir: &Path) -> Option<DiscoveredPlugin> {
        let entry_file = match probe_entry_file(plugin_dir) {
            Some(entry) => entry,
            None => {
                warn!(
                    plugin_dir = %plugin_dir.display(),
                    "no entry file ({}), skipping directory",
                    ENTRY_CANDIDATES.join(" or ")
                );
                return None;
            }
        };

        if self.install_dependencies {
            self.install_declared_dependencies(plugin_dir).await;
        }

        let environment = match PluginEnvironment::enter(plugin_dir) {
            Ok(environment) => environment,
            Err(e) => {
                return Some(DiscoveredPlugin {
                    path: plugin_dir.to_path_buf(),
                    entry_file,
                    exports: Vec::new(),
                    error: Some(format!("failed to enter plugin environment: {e}")),
                });
            }
        };

        let request = match serde_json::to_string(&DescribeRequest::new()) {
            Ok(request) => request,
            Err(e) => {
                return Some(DiscoveredPlugin {
                    path: plugin_dir.to_path_buf(),
                    entry_file,
                    exports: Vec::new(),
                    error: Some(format!("failed to serialize describe request: {e}")),
                });
            }
        };

        let described: Result<DescribeResponse, _> = self
            .host
            .exchange_json(
                &entry_file,
                environment.child_env(),
                &request,
                self.describe_timeout,
            )
            .await;

        match described {
            Ok(response) => {
                debug!(
                    plugin_dir = %plugin_dir.display(),
                    namespace = environment.namespace(),
                    services = response.services.len(),
                    "describe handshake succeeded"
                );
                Some(DiscoveredPlugin {
                    path: plugin_dir.to_path_buf(),
                    entry_file,
                    exports: response.services,
                    error: None,
                })
            }
            Err(e) => {
                warn!(plugin_dir = %plugin_dir.display(), error = %e, "describe handshake failed");
                Some(DiscoveredPlugin {
                    path: plugin_dir.to_path_buf(),
                    entry_file,
                    exports: Vec::new(),
                    error: Some(e.to_string()),
                })
            }
        }
    }

    /// Run the configured installer inside the plugin directory.
    /// Installation failure is logged and never aborts discovery.
    async fn install_declared_dependencies(&self, plugin_dir: &Path) {
        let Some(installer) = &self.installer else {
            return;
        };
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(installer)
            .current_dir(plugin_dir)
            .kill_on_drop(true)
            .output()
            .await;
        match output {
            Ok(output) if output.status.success() => {
                debug!(plugin_dir = %plugin_dir.display(), "plugin dependencies installed");
            }
            Ok(output) => {
                warn!(
                    plugin_dir = %plugin_dir.display(),
                    status = %output.status,
                    stderr = %String::from_utf8_lossy(&output.stderr),
                    "dependency installer failed, continuing without it"
                );
            }
            Err(e) => {
                warn!(
                    plugin_dir = %plugin_dir.display(),
                    error = %e,
                    "could not run dependency installer, continuing without it"
                );
            }
        }
    }
}

fn probe_entry_file(plugin_dir: &Path) -> Option<PathBuf> {
    ENTRY_CANDIDATES
        .iter()
        .map(|name| plugin_dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIBE_SCRIPT: &str = concat!(
        "read -r line\n",
        "printf '{\"services\":[{\"name\":\"camera\",\"config\":{},",
        "\"functions\":[{\"name\":\"take_photo\",\"description\":\"snap\"}]}]}\\n'\n",
    );

    fn config_for(root: &Path) -> PluginsConfig {
        PluginsConfig {
            root: root.to_path_buf(),
            ..PluginsConfig::default()
        }
    }

    fn add_plugin(root: &Path, name: &str, script: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("main.sh"), script).unwrap();
    }

    #[test]
    fn test_discovery_harvests_exports() {
        tokio_test::block_on(async {
            let root = tempfile::tempdir().unwrap();
            add_plugin(root.path(), "camera-sim", DESCRIBE_SCRIPT);

            let discovery = PluginDiscovery::new(&config_for(root.path()));
            let results = discovery.start().await;

            assert_eq!(results.len(), 1);
            let plugin = &results[0];
            assert!(plugin.error.is_none());
            assert!(plugin.entry_file.ends_with("main.sh"));
            assert_eq!(plugin.exports.len(), 1);
            assert_eq!(plugin.exports[0].name.as_deref(), Some("camera"));
        });
    }

    #[test]
    fn test_directory_without_entry_file_is_skipped() {
        tokio_test::block_on(async {
            let root = tempfile::tempdir().unwrap();
            add_plugin(root.path(), "camera-sim", DESCRIBE_SCRIPT);
            std::fs::create_dir_all(root.path().join("not-a-plugin")).unwrap();
            std::fs::write(root.path().join("not-a-plugin/README.md"), "docs").unwrap();

            let discovery = PluginDiscovery::new(&config_for(root.path()));
            let results = discovery.start().await;
            assert_eq!(results.len(), 1);
        });
    }

    #[test]
    fn test_one_failing_plugin_does_not_abort_the_rest() {
        tokio_test::block_on(async {
            let root = tempfile::tempdir().unwrap();
            add_plugin(root.path(), "a-broken", "exit 7\n");
            add_plugin(root.path(), "b-works", DESCRIBE_SCRIPT);

            let discovery = PluginDiscovery::new(&config_for(root.path()));
            let results = discovery.start().await;

            assert_eq!(results.len(), 2);
            assert!(results[0].error.is_some());
            assert!(results[1].error.is_none());
        });
    }

    #[test]
    fn test_missing_root_yields_empty_scan() {
        tokio_test::block_on(async {
            let root = tempfile::tempdir().unwrap();
            let missing = root.path().join("nope");
            let discovery = PluginDiscovery::new(&config_for(&missing));
            assert!(discovery.start().await.is_empty());
        });
    }

    #[test]
    fn test_new_scan_clears_previous_stop_request() {
        tokio_test::block_on(async {
            let root = tempfile::tempdir().unwrap();
            add_plugin(root.path(), "camera-sim", DESCRIBE_SCRIPT);

            let discovery = PluginDiscovery::new(&config_for(root.path()));
            discovery.stop();
            let results = discovery.start().await;
            assert_eq!(results.len(), 1);
        });
    }
}
