//! Anthropic messages-API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use ensemble_config::ProviderSpec;

use super::{CompletionClient, CompletionError, CompletionRequest};

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicCompletionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl AnthropicCompletionClient {
    pub fn from_spec(spec: &ProviderSpec) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(spec.timeout_ms))
            .build()
            .map_err(|e| CompletionError::Http(e.to_string()))?;
        let api_key = spec
            .resolve_api_key()
            .map_err(|e| CompletionError::Http(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: spec
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_key,
            model: spec.model.clone(),
            max_tokens: spec.max_tokens,
            temperature: spec.temperature,
        })
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl CompletionClient for AnthropicCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| CompletionError::Http(e.to_string()))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));

        let model = request.model.as_deref().unwrap_or(&self.model);
        let body = MessagesRequest {
            model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: &request.system,
            messages: vec![Message {
                role: "user",
                content: &request.user,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout(e.to_string())
                } else {
                    CompletionError::Http(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(CompletionError::Response(format!("HTTP {status}: {text}")));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Serialization(e.to_string()))?;
        parsed
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .ok_or_else(|| CompletionError::Response("empty content".to_string()))
    }
}
