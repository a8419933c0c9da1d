//! Plugin runtime model
//!
//! A registration is the registry's authoritative record for one plugin
//! directory: identity, entry file, descriptor manifest, exported services
//! and load outcome. Registrations are owned exclusively by the registry;
//! everything else sees clones.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One callable function exported by a plugin service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema of the keyword arguments
    #[serde(default)]
    pub input_schema: Value,
    /// Fully-qualified `plugin.function` name, filled in by the loader
    #[serde(default)]
    pub full_method_name: String,
}

/// One capability unit inside a plugin: a function catalog plus the config
/// requirements its instance advertises.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginService {
    pub name: String,
    /// Arbitrary configuration mapping advertised by the plugin
    #[serde(default)]
    pub config: Value,
    pub functions: Vec<FunctionDescriptor>,
}

/// `[build-system]` table of the plugin descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ManifestBuildSystem {
    pub requires: Vec<String>,
    pub build_backend: Option<String>,
}

/// One `[[project.authors]]` entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestAuthor {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// `[project.license]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestLicense {
    pub text: Option<String>,
}

/// `[project.urls]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestUrls {
    pub repository: Option<String>,
}

/// `[project]` table of the plugin descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ManifestProject {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub authors: Vec<ManifestAuthor>,
    pub license: Option<ManifestLicense>,
    /// Minimum runtime the plugin declares it needs
    pub requires_runtime: Option<String>,
    pub keywords: Vec<String>,
    pub dependencies: Vec<String>,
    pub urls: ManifestUrls,
}

/// Read-only project descriptor of a plugin (`plugin.toml`).
///
/// A missing or malformed descriptor yields `PluginManifest::default()`,
/// never a load failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PluginManifest {
    pub build_system: ManifestBuildSystem,
    pub project: ManifestProject,
}

/// Load outcome recorded on a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Pending,
    Loaded,
    Failed,
}

/// Authoritative registry record for one plugin directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRegistration {
    /// Stable UUID; re-discovery at the same path reuses it
    pub id: String,
    /// Plugin directory
    pub path: PathBuf,
    /// Entry file executed for describe/invoke exchanges
    pub entry_file: PathBuf,
    pub manifest: PluginManifest,
    pub services: Vec<PluginService>,
    pub load_status: LoadStatus,
    #[serde(default)]
    pub error: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub is_enabled: bool,
}

impl PluginRegistration {
    /// New pending registration for a discovered plugin directory.
    pub fn new(path: impl Into<PathBuf>, entry_file: impl Into<PathBuf>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            path: path.into(),
            entry_file: entry_file.into(),
            manifest: PluginManifest::default(),
            services: Vec::new(),
            load_status: LoadStatus::Pending,
            error: None,
            registered_at: Utc::now(),
            is_enabled: true,
        }
    }

    /// Plugin name: descriptor project name, falling back to the directory name.
    pub fn name(&self) -> String {
        match self.manifest.project.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => dir_name(&self.path),
        }
    }

    pub fn description(&self) -> String {
        self.manifest.project.description.clone().unwrap_or_default()
    }

    pub fn version(&self) -> String {
        self.manifest
            .project
            .version
            .clone()
            .unwrap_or_else(|| "0.0.0".to_string())
    }

    /// Descriptor keywords double as routing tags.
    pub fn tags(&self) -> Vec<String> {
        self.manifest.project.keywords.clone()
    }

    /// Loaded and enabled, so eligible for planning and invocation.
    pub fn is_available(&self) -> bool {
        self.load_status == LoadStatus::Loaded && self.is_enabled
    }

    /// Locate a function across this plugin's services.
    pub fn find_function(&self, function_name: &str) -> Option<(&PluginService, &FunctionDescriptor)> {
        for service in &self.services {
            if let Some(descriptor) = service.functions.iter().find(|f| f.name == function_name) {
                return Some((service, descriptor));
            }
        }
        None
    }

    /// Record a successful load.
    pub fn mark_loaded(&mut self, manifest: PluginManifest, services: Vec<PluginService>) {
        self.manifest = manifest;
        self.services = services;
        self.load_status = LoadStatus::Loaded;
        self.error = None;
    }

    /// Record a failed load.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.load_status = LoadStatus::Failed;
        self.error = Some(error.into());
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_manifest_parses_descriptor_toml() {
        let raw = r#"
[build-system]
requires = ["setuptools"]
build-backend = "setuptools.build_meta"

[project]
name = "camera-sim"
version = "1.2.0"
description = "Simulated camera control"
requires-runtime = ">=3.10"
keywords = ["camera", "photo", "video"]
dependencies = []

[[project.authors]]
name = "Jo Doe"
email = "jo@example.com"

[project.license]
text = "MIT"

[project.urls]
repository = "https://example.com/camera-sim"
"#;
        let manifest: PluginManifest = toml::from_str(raw).unwrap();
        assert_eq!(manifest.project.name.as_deref(), Some("camera-sim"));
        assert_eq!(manifest.project.keywords.len(), 3);
        assert_eq!(
            manifest.build_system.build_backend.as_deref(),
            Some("setuptools.build_meta")
        );
        assert_eq!(
            manifest.project.urls.repository.as_deref(),
            Some("https://example.com/camera-sim")
        );
    }

    #[test]
    fn test_manifest_defaults_when_empty() {
        let manifest: PluginManifest = toml::from_str("").unwrap();
        assert!(manifest.project.name.is_none());
        assert!(manifest.project.keywords.is_empty());
        assert!(manifest.build_system.requires.is_empty());
    }

    #[test]
    fn test_registration_name_falls_back_to_directory() {
        let reg = PluginRegistration::new("/plugins/camera-sim", "/plugins/camera-sim/main.sh");
        assert_eq!(reg.name(), "camera-sim");
        assert_eq!(reg.version(), "0.0.0");
        assert_eq!(reg.load_status, LoadStatus::Pending);
        assert!(!reg.is_available());
    }

    #[test]
    fn test_find_function_scans_all_services() {
        let mut reg = PluginRegistration::new("/plugins/cam", "/plugins/cam/main.sh");
        reg.mark_loaded(
            PluginManifest::default(),
            vec![PluginService {
                name: "camera".to_string(),
                config: json!({}),
                functions: vec![FunctionDescriptor {
                    name: "take_photo".to_string(),
                    description: "Capture a still image".to_string(),
                    input_schema: json!({"type": "object"}),
                    full_method_name: "cam.take_photo".to_string(),
                }],
            }],
        );

        assert!(reg.is_available());
        assert!(reg.find_function("take_photo").is_some());
        assert!(reg.find_function("record_video").is_none());
    }
}
