//! AnthropicProvider: [`LlmProvider`] for the Anthropic Messages API.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is only exposed
//! when building request headers.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use pipeloom_core::llm::provider::{LlmEventStream, LlmProvider};
use pipeloom_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities, Usage,
};

use super::streaming::{create_anthropic_stream, parse_stop_reason, status_error};
use super::types::{AnthropicContentBlock, AnthropicMessage, AnthropicNonStreamResponse, AnthropicRequest};

/// Default Messages API endpoint host.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic Claude LLM provider.
///
/// Deliberately not `Debug`.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    capabilities: ProviderCapabilities,
}

impl AnthropicProvider {
    /// The Anthropic API version header value.
    const API_VERSION: &'static str = "2023-06-01";

    /// Create a provider for `model` (used when a request leaves `model` empty).
    pub fn new(api_key: SecretString, model: String) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300)) // long generations
            .build()
            .map_err(|e| LlmError::Provider {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        let capabilities = Self::capabilities_for_model(&model);

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model,
            capabilities,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Override the base URL (proxies, local gateways).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn capabilities_for_model(model: &str) -> ProviderCapabilities {
        let max_output_tokens = if model.contains("opus") {
            32_000
        } else if model.contains("sonnet") || model.contains("haiku") {
            8_192
        } else {
            // conservative default for unknown models
            4_096
        };
        ProviderCapabilities {
            streaming: true,
            max_context_tokens: 200_000,
            max_output_tokens,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn to_anthropic_request(&self, request: &CompletionRequest, stream: bool) -> AnthropicRequest {
        let messages = request
            .messages
            .iter()
            .map(|m| AnthropicMessage {
                role: m.role.to_string(),
                content: m.content.clone(),
            })
            .collect();

        let model = if request.model.is_empty() {
            self.model.clone()
        } else {
            request.model.clone()
        };

        AnthropicRequest {
            model,
            max_tokens: request.max_tokens,
            messages,
            system: request.system.clone(),
            stream,
            temperature: request.temperature,
        }
    }
}

impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.to_anthropic_request(request, false);
        let url = self.url("/v1/messages");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", Self::API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Provider {
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), error_body));
        }

        let anthropic_resp: AnthropicNonStreamResponse = response.json().await.map_err(|e| {
            LlmError::Deserialization(format!("failed to parse response: {e}"))
        })?;

        let content = anthropic_resp
            .content
            .iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text.as_str()),
                AnthropicContentBlock::Other => None,
            })
            .collect::<String>();

        Ok(CompletionResponse {
            id: anthropic_resp.id,
            content,
            model: anthropic_resp.model,
            stop_reason: parse_stop_reason(anthropic_resp.stop_reason.as_deref()),
            usage: Usage {
                input_tokens: anthropic_resp.usage.input_tokens,
                output_tokens: anthropic_resp.usage.output_tokens,
            },
        })
    }

    fn stream(&self, request: CompletionRequest) -> LlmEventStream {
        let body = self.to_anthropic_request(&request, true);
        let url = self.url("/v1/messages");

        create_anthropic_stream(&self.client, &url, body, &self.api_key, Self::API_VERSION)
    }
}
