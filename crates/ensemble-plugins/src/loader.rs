//! Plugin loader: turns raw discovery output into validated registrations.
//!
//! Probes each exported service for its three optional capabilities (config
//! mapping, function catalog, invocation channel), reads the `plugin.toml`
//! descriptor, and produces a registration. `load_plugin` never fails to its
//! caller: every internal problem is recorded on the registration instead.

use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use ensemble_core::types::{FunctionDescriptor, PluginManifest, PluginRegistration, PluginService};

use crate::discovery::DiscoveredPlugin;
use crate::protocol::RawServiceExport;

/// Descriptor file probed inside each plugin directory.
pub const DESCRIPTOR_FILE: &str = "plugin.toml";

#[derive(Debug, Default)]
pub struct PluginLoader;

impl PluginLoader {
    pub fn new() -> Self {
        Self
    }

    /// Build a registration from one discovery result.
    ///
    /// A discovery-level error, a missing descriptor, or unusable service
    /// exports all still produce a registration; its `load_status`/`error`
    /// fields carry the outcome.
    pub fn load_plugin(&self, discovered: &DiscoveredPlugin) -> PluginRegistration {
        let mut registration =
            PluginRegistration::new(&discovered.path, &discovered.entry_file);

        if let Some(error) = &discovered.error {
            registration.mark_failed(error.clone());
            return registration;
        }

        let manifest = read_manifest(&discovered.path);
        let plugin_name = manifest
            .project
            .name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| registration.name());

        let mut services = Vec::new();
        for (index, export) in discovered.exports.iter().enumerate() {
            match normalize_service(export, index, &plugin_name) {
                Some(service) => services.push(service),
                None => warn!(
                    plugin = %plugin_name,
                    service_index = index,
                    "dropping service export without a usable function catalog"
                ),
            }
        }

        if services.is_empty() {
            registration.manifest = manifest;
            registration.mark_failed("plugin exported no usable services");
            return registration;
        }

        debug!(
            plugin = %plugin_name,
            services = services.len(),
            "plugin loaded"
        );
        registration.mark_loaded(manifest, services);
        registration
    }
}

/// Normalize one raw service export into a [`PluginService`].
///
/// Returns `None` when the function catalog is missing or empty; the
/// invocation channel is the plugin's entry file, which discovery already
/// verified exists.
fn normalize_service(
    export: &RawServiceExport,
    index: usize,
    plugin_name: &str,
) -> Option<PluginService> {
    let functions = normalize_functions(export.functions.as_ref()?, plugin_name)?;
    if functions.is_empty() {
        return None;
    }

    let config = match &export.config {
        Some(value) if value.is_object() => value.clone(),
        Some(value) => {
            warn!(
                plugin = %plugin_name,
                service_index = index,
                "service config is not a mapping ({}), dropping it",
                value_kind(value)
            );
            Value::Object(serde_json::Map::new())
        }
        None => Value::Object(serde_json::Map::new()),
    };

    let name = export
        .name
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("service_{index}"));

    Some(PluginService {
        name,
        config,
        functions,
    })
}

/// Accept a catalog as a JSON array or a serialized JSON array string, and
/// normalize both into descriptors with fully-qualified names.
fn normalize_functions(raw: &Value, plugin_name: &str) -> Option<Vec<FunctionDescriptor>> {
    let items: Vec<Value> = match raw {
        Value::Array(items) => items.clone(),
        Value::String(serialized) => match serde_json::from_str(serialized) {
            Ok(Value::Array(items)) => items,
            Ok(_) | Err(_) => {
                warn!(plugin = %plugin_name, "serialized function catalog is not a JSON array");
                return None;
            }
        },
        _ => {
            warn!(plugin = %plugin_name, "function catalog is neither an array nor a string");
            return None;
        }
    };

    let mut functions = Vec::new();
    for item in items {
        match serde_json::from_value::<FunctionDescriptor>(item) {
            Ok(mut descriptor) if !descriptor.name.is_empty() => {
                descriptor.full_method_name = format!("{plugin_name}.{}", descriptor.name);
                functions.push(descriptor);
            }
            Ok(_) => warn!(plugin = %plugin_name, "dropping catalog entry without a name"),
            Err(e) => warn!(plugin = %plugin_name, error = %e, "dropping malformed catalog entry"),
        }
    }
    Some(functions)
}

/// Read the plugin descriptor. Missing or malformed descriptors yield the
/// all-default manifest, never a load failure.
fn read_manifest(plugin_dir: &Path) -> PluginManifest {
    let descriptor = plugin_dir.join(DESCRIPTOR_FILE);
    let content = match std::fs::read_to_string(&descriptor) {
        Ok(content) => content,
        Err(_) => {
            debug!(plugin_dir = %plugin_dir.display(), "no plugin descriptor, using defaults");
            return PluginManifest::default();
        }
    };
    match toml::from_str(&content) {
        Ok(manifest) => manifest,
        Err(e) => {
            warn!(
                descriptor = %descriptor.display(),
                error = %e,
                "malformed plugin descriptor, using defaults"
            );
            PluginManifest::default()
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
