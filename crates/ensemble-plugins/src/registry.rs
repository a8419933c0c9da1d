//! Plugin registry: the authoritative id → registration map.

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

use ensemble_core::types::PluginRegistration;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("plugin '{0}' is not registered")]
    NotRegistered(String),
}

/// Owns every [`PluginRegistration`]. Not internally synchronized; the
/// manager wraps it in a lock and is the only writer.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, PluginRegistration>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin, returning its id.
    ///
    /// At most one registration exists per filesystem path: re-registering
    /// the same path replaces the old registration and the incoming one
    /// inherits its id, keeping plugin identity stable across hot reloads.
    pub fn register(&mut self, mut registration: PluginRegistration) -> String {
        if let Some(existing_id) = self.find_by_path(&registration.path) {
            debug!(
                plugin_id = %existing_id,
                path = %registration.path.display(),
                "re-registering plugin path, reusing id"
            );
            self.plugins.remove(&existing_id);
            registration.id = existing_id;
        }
        let id = registration.id.clone();
        info!(plugin_id = %id, name = %registration.name(), "plugin registered");
        self.plugins.insert(id.clone(), registration);
        id
    }

    /// Remove a registration. Unknown ids are a caller error.
    pub fn unregister(&mut self, plugin_id: &str) -> Result<PluginRegistration, RegistryError> {
        self.plugins
            .remove(plugin_id)
            .ok_or_else(|| RegistryError::NotRegistered(plugin_id.to_string()))
    }

    pub fn get(&self, plugin_id: &str) -> Option<&PluginRegistration> {
        self.plugins.get(plugin_id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&PluginRegistration> {
        self.plugins.values().find(|p| p.name() == name)
    }

    /// Registered plugin ids.
    pub fn list(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    pub fn registrations(&self) -> impl Iterator<Item = &PluginRegistration> {
        self.plugins.values()
    }

    pub fn clear(&mut self) {
        self.plugins.clear();
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    fn find_by_path(&self, path: &Path) -> Option<String> {
        self.plugins
            .values()
            .find(|p| p.path == path)
            .map(|p| p.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(path: &str) -> PluginRegistration {
        PluginRegistration::new(path, format!("{path}/main.sh"))
    }

    #[test]
    fn test_reregistering_same_path_reuses_id() {
        let mut registry = PluginRegistry::new();
        let first_id = registry.register(registration("/plugins/camera"));
        let second_id = registry.register(registration("/plugins/camera"));

        assert_eq!(first_id, second_id);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_distinct_paths_get_distinct_ids() {
        let mut registry = PluginRegistry::new();
        let a = registry.register(registration("/plugins/camera"));
        let b = registry.register(registration("/plugins/echo"));

        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unregister_unknown_id_is_an_error() {
        let mut registry = PluginRegistry::new();
        let err = registry.unregister("nope").unwrap_err();
        assert!(matches!(err, RegistryError::NotRegistered(_)));

        let id = registry.register(registration("/plugins/camera"));
        assert!(registry.unregister(&id).is_ok());
        assert!(registry.get(&id).is_none());
    }

    #[test]
    fn test_lookup_by_name_uses_directory_fallback() {
        let mut registry = PluginRegistry::new();
        registry.register(registration("/plugins/camera-sim"));
        assert!(registry.get_by_name("camera-sim").is_some());
        assert!(registry.get_by_name("unknown").is_none());
    }
}
