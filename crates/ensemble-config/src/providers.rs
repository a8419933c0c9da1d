//! Completion provider configuration types.

use serde::Deserialize;
use serde_json::Value;

/// Root configuration for completion providers.
///
/// `preferred` plus `fallbacks` define the fallback chain; names are matched
/// case-insensitively against `backends`, and unconfigured names are skipped
/// at call time rather than rejected here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    /// Provider tried first.
    #[serde(default)]
    pub preferred: Option<String>,
    /// Providers tried in order after the preferred one fails.
    #[serde(default)]
    pub fallbacks: Vec<String>,
    /// Provider definitions.
    #[serde(default)]
    pub backends: Vec<ProviderSpec>,
}

impl ProvidersConfig {
    /// Get a provider by name (case-insensitive).
    pub fn get_backend(&self, name: &str) -> Option<&ProviderSpec> {
        self.backends
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// List all configured provider names.
    pub fn names(&self) -> Vec<String> {
        self.backends.iter().map(|p| p.name.clone()).collect()
    }

    /// Ordered fallback chain: preferred first, then fallbacks, then any
    /// remaining configured provider not already named.
    pub fn chain(&self) -> Vec<String> {
        let mut chain: Vec<String> = Vec::new();
        let mut push_unique = |name: &str, chain: &mut Vec<String>| {
            if !chain.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                chain.push(name.to_string());
            }
        };
        if let Some(preferred) = &self.preferred {
            push_unique(preferred, &mut chain);
        }
        for name in &self.fallbacks {
            push_unique(name, &mut chain);
        }
        for backend in &self.backends {
            push_unique(&backend.name, &mut chain);
        }
        chain
    }
}

/// One completion provider (endpoint, auth, model defaults).
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSpec {
    /// Provider identifier (e.g. "anthropic", "deepseek").
    pub name: String,
    /// Wire protocol: `anthropic` or `openai` (chat-completions compatible).
    pub kind: String,
    /// Custom endpoint URL; each kind has a default.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Environment variable name containing the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Model requested from this provider.
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-call deadline.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Provider-specific settings.
    #[serde(default)]
    pub config: Value,
}

impl ProviderSpec {
    /// Resolve the API key from the configured environment variable.
    pub fn resolve_api_key(&self) -> Result<String, ApiKeyError> {
        let env_name = self.api_key_env.as_ref().ok_or(ApiKeyError::NotConfigured)?;
        std::env::var(env_name).map_err(|_| ApiKeyError::EnvNotFound(env_name.clone()))
    }

    /// Read a provider config value as a typed object.
    pub fn get_config<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.config
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout_ms() -> u64 {
    60_000
}

/// API key resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiKeyError {
    #[error("no api_key_env configured")]
    NotConfigured,
    #[error("environment variable '{0}' not set")]
    EnvNotFound(String),
}
