//! Scoped execution environment for one plugin.
//!
//! Entering an environment allocates everything one plugin's child processes
//! need to stay isolated from the host and from other plugins: a unique
//! namespace prefix, a private scratch directory, and the sanitized
//! environment map the child is spawned with. Dropping the environment
//! removes the scratch directory on every exit path.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// Environment variables forwarded from the host to plugin processes.
const PASSTHROUGH_VARS: [&str; 4] = ["PATH", "HOME", "LANG", "TMPDIR"];

/// Scoped-resource guard around one plugin's execution context.
#[derive(Debug)]
pub struct PluginEnvironment {
    namespace: String,
    plugin_dir: PathBuf,
    scratch_dir: PathBuf,
    child_env: HashMap<String, String>,
}

impl PluginEnvironment {
    /// Enter a fresh environment for the plugin at `plugin_dir`.
    ///
    /// The namespace prefix is globally unique, so two plugins with the same
    /// directory name (or two loads of the same plugin) never share state.
    pub fn enter(plugin_dir: &Path) -> io::Result<Self> {
        let dir_label = plugin_dir
            .file_name()
            .map(|n| n.to_string_lossy().replace('-', "_"))
            .unwrap_or_else(|| "unknown".to_string());
        let namespace = format!("plugin_{}_{}", dir_label, uuid::Uuid::new_v4().simple());

        let scratch_dir = std::env::temp_dir().join(&namespace);
        std::fs::create_dir_all(&scratch_dir)?;

        let mut child_env = HashMap::new();
        for key in PASSTHROUGH_VARS {
            if let Ok(value) = std::env::var(key) {
                child_env.insert(key.to_string(), value);
            }
        }
        child_env.insert(
            "ENSEMBLE_PLUGIN_NAMESPACE".to_string(),
            namespace.clone(),
        );
        child_env.insert(
            "ENSEMBLE_PLUGIN_DIR".to_string(),
            plugin_dir.to_string_lossy().into_owned(),
        );
        child_env.insert(
            "ENSEMBLE_PLUGIN_SCRATCH".to_string(),
            scratch_dir.to_string_lossy().into_owned(),
        );

        Ok(Self {
            namespace,
            plugin_dir: plugin_dir.to_path_buf(),
            scratch_dir,
            child_env,
        })
    }

    /// Globally-unique namespace prefix assigned to this plugin.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    /// Private scratch directory, removed when the environment is dropped.
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Sanitized environment map for child processes of this plugin.
    pub fn child_env(&self) -> &HashMap<String, String> {
        &self.child_env
    }
}

impl Drop for PluginEnvironment {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.scratch_dir) {
            tracing::warn!(
                namespace = %self.namespace,
                scratch_dir = %self.scratch_dir.display(),
                error = %e,
                "failed to remove plugin scratch directory"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_allocates_unique_namespace_and_scratch() {
        let plugin_dir = tempfile::tempdir().unwrap();
        let a = PluginEnvironment::enter(plugin_dir.path()).unwrap();
        let b = PluginEnvironment::enter(plugin_dir.path()).unwrap();

        assert_ne!(a.namespace(), b.namespace());
        assert_ne!(a.scratch_dir(), b.scratch_dir());
        assert!(a.scratch_dir().is_dir());
        assert!(b.scratch_dir().is_dir());
    }

    #[test]
    fn test_child_env_carries_namespace_vars() {
        let plugin_dir = tempfile::tempdir().unwrap();
        let env = PluginEnvironment::enter(plugin_dir.path()).unwrap();

        let vars = env.child_env();
        assert_eq!(
            vars.get("ENSEMBLE_PLUGIN_NAMESPACE"),
            Some(&env.namespace().to_string())
        );
        assert!(vars.contains_key("ENSEMBLE_PLUGIN_DIR"));
        assert!(vars.contains_key("ENSEMBLE_PLUGIN_SCRATCH"));
        // Host-only secrets are not forwarded wholesale.
        assert!(!vars.contains_key("ENSEMBLE_TEST_SECRET"));
    }

    #[test]
    fn test_drop_removes_scratch_dir() {
        let plugin_dir = tempfile::tempdir().unwrap();
        let scratch = {
            let env = PluginEnvironment::enter(plugin_dir.path()).unwrap();
            std::fs::write(env.scratch_dir().join("note.txt"), "x").unwrap();
            env.scratch_dir().to_path_buf()
        };
        assert!(!scratch.exists());
    }
}
