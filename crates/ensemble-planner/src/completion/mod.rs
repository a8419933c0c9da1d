//! Completion capability: contract, providers and the fallback manager.

mod anthropic;
mod factory;
mod manager;
mod openai;

pub use anthropic::AnthropicCompletionClient;
pub use factory::build_client;
pub use manager::{CompletionManager, ProviderStatus};
pub use openai::OpenAiCompletionClient;

use async_trait::async_trait;
use thiserror::Error;

/// One completion call: prompts plus an optional model override.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    /// Overrides the provider's configured model when set.
    pub model: Option<String>,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Completion failures. Every variant participates in fallback; a timeout
/// is a failure like any other.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("http error: {0}")]
    Http(String),
    #[error("response error: {0}")]
    Response(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("unsupported provider kind: {0}")]
    UnsupportedKind(String),
    #[error("structurally invalid output: {0}")]
    InvalidOutput(String),
    #[error("no completion provider available: {0}")]
    NoProvider(String),
}

/// Completion provider contract: prompts in, raw text out.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

pub(crate) fn truncate_for_log(input: &str, max_chars: usize) -> String {
    let char_count = input.chars().count();
    if char_count <= max_chars {
        return input.to_string();
    }
    let mut preview: String = input.chars().take(max_chars).collect();
    preview.push_str(&format!("... [truncated, total_chars={}]", char_count));
    preview
}
