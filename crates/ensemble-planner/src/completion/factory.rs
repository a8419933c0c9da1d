//! Provider construction by wire protocol kind.

use ensemble_config::ProviderSpec;

use super::{AnthropicCompletionClient, CompletionClient, CompletionError, OpenAiCompletionClient};

/// Build a boxed client for one provider spec.
///
/// `kind` selects the wire protocol, not the vendor: DeepSeek and
/// locally-hosted endpoints speak the chat-completions shape and map to
/// the OpenAI client with a custom endpoint.
pub fn build_client(spec: &ProviderSpec) -> Result<Box<dyn CompletionClient>, CompletionError> {
    match spec.kind.to_ascii_lowercase().as_str() {
        "anthropic" => Ok(Box::new(AnthropicCompletionClient::from_spec(spec)?)),
        "openai" | "deepseek" | "local" => Ok(Box::new(OpenAiCompletionClient::from_spec(spec)?)),
        other => Err(CompletionError::UnsupportedKind(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn spec(kind: &str) -> ProviderSpec {
        ProviderSpec {
            name: "test".to_string(),
            kind: kind.to_string(),
            endpoint: None,
            api_key_env: None,
            model: "test-model".to_string(),
            max_tokens: 256,
            temperature: 0.2,
            timeout_ms: 5_000,
            config: Value::Null,
        }
    }

    #[test]
    fn test_known_kinds_build() {
        assert!(build_client(&spec("openai")).is_ok());
        assert!(build_client(&spec("DeepSeek")).is_ok());
        assert!(build_client(&spec("local")).is_ok());
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        match build_client(&spec("grpc")) {
            Err(CompletionError::UnsupportedKind(kind)) => assert_eq!(kind, "grpc"),
            other => panic!("expected unsupported kind, got {:?}", other.is_ok()),
        }
    }
}
