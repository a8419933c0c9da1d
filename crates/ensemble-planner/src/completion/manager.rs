//! Ordered multi-provider fallback with a bounded repair round-trip.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use ensemble_config::ProvidersConfig;
use ensemble_core::types::extract_json;

use crate::prompt;

use super::{build_client, truncate_for_log, CompletionClient, CompletionError, CompletionRequest};

/// Reported state of one configured provider.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub kind: String,
    pub model: String,
    /// False when the client could not be built (bad kind, missing key env).
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Routes completion requests through the configured provider chain.
///
/// Each provider in the chain is tried in order; a provider whose output
/// carries no parseable JSON object gets exactly one repair round-trip
/// before the chain moves on. The last failure is what the caller sees.
pub struct CompletionManager {
    /// Clients keyed by lowercase provider name.
    clients: HashMap<String, Box<dyn CompletionClient>>,
    chain: Vec<String>,
    status: Vec<ProviderStatus>,
}

impl CompletionManager {
    /// Build clients for every configured backend.
    ///
    /// A backend that cannot be built (unsupported kind, missing key
    /// environment variable) is recorded as unavailable and skipped at
    /// call time; it never aborts startup.
    pub fn from_config(config: &ProvidersConfig) -> Self {
        let mut clients: HashMap<String, Box<dyn CompletionClient>> = HashMap::new();
        let mut status = Vec::with_capacity(config.backends.len());
        for spec in &config.backends {
            match build_client(spec) {
                Ok(client) => {
                    clients.insert(spec.name.to_lowercase(), client);
                    status.push(ProviderStatus {
                        name: spec.name.clone(),
                        kind: spec.kind.clone(),
                        model: spec.model.clone(),
                        available: true,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(provider = %spec.name, error = %e, "provider unavailable");
                    status.push(ProviderStatus {
                        name: spec.name.clone(),
                        kind: spec.kind.clone(),
                        model: spec.model.clone(),
                        available: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        Self {
            clients,
            chain: config.chain(),
            status,
        }
    }

    /// Build a manager directly from pre-built clients, bypassing config.
    ///
    /// Exists so callers can inject stub providers; real wiring goes through
    /// [`from_config`](Self::from_config).
    #[doc(hidden)]
    pub fn with_clients(
        chain: Vec<&str>,
        clients: Vec<(&str, Box<dyn CompletionClient>)>,
    ) -> Self {
        Self {
            clients: clients
                .into_iter()
                .map(|(name, client)| (name.to_lowercase(), client))
                .collect(),
            chain: chain.into_iter().map(String::from).collect(),
            status: Vec::new(),
        }
    }

    /// Provider names in fallback order.
    pub fn provider_names(&self) -> Vec<String> {
        self.chain.clone()
    }

    /// Per-provider availability for status reporting.
    pub fn provider_status(&self) -> &[ProviderStatus] {
        &self.status
    }

    /// True when at least one provider has a usable client.
    pub fn has_providers(&self) -> bool {
        self.chain
            .iter()
            .any(|name| self.clients.contains_key(&name.to_lowercase()))
    }

    /// Run the request through the chain until a provider returns output
    /// carrying a parseable JSON object.
    ///
    /// Unconfigured or unavailable chain entries are skipped with a warning.
    /// When every provider fails, the last failure is returned; an empty or
    /// fully-skipped chain yields [`CompletionError::NoProvider`].
    pub async fn complete_with_fallback(
        &self,
        request: &CompletionRequest,
    ) -> Result<String, CompletionError> {
        let mut last_error: Option<CompletionError> = None;
        for name in &self.chain {
            let Some(client) = self.clients.get(&name.to_lowercase()) else {
                warn!(provider = %name, "provider in chain has no usable client, skipped");
                continue;
            };
            match self.attempt(name, client.as_ref(), request).await {
                Ok(content) => {
                    debug!(provider = %name, "completion succeeded");
                    return Ok(content);
                }
                Err(e) => {
                    warn!(provider = %name, error = %e, "completion failed, trying next provider");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            CompletionError::NoProvider("provider chain is empty or fully unavailable".to_string())
        }))
    }

    /// One provider attempt: complete, validate structure, repair once.
    async fn attempt(
        &self,
        name: &str,
        client: &dyn CompletionClient,
        request: &CompletionRequest,
    ) -> Result<String, CompletionError> {
        let content = client.complete(request).await?;
        if has_json_object(&content) {
            return Ok(content);
        }

        debug!(
            provider = %name,
            preview = %truncate_for_log(&content, 200),
            "output carries no JSON object, attempting repair"
        );
        let repair = prompt::json_repair_prompt(&content);
        let repair_request = CompletionRequest {
            system: repair.system,
            user: repair.user,
            model: request.model.clone(),
        };
        let repaired = client.complete(&repair_request).await?;
        if has_json_object(&repaired) {
            return Ok(repaired);
        }
        Err(CompletionError::InvalidOutput(format!(
            "no JSON object after repair: {}",
            truncate_for_log(&repaired, 200)
        )))
    }
}

/// True when the text contains a parseable JSON object.
fn has_json_object(content: &str) -> bool {
    extract_json(content)
        .and_then(|json| serde_json::from_str::<Value>(&json).ok())
        .map(|value| value.is_object())
        .unwrap_or(false)
}
