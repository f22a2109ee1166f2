/*!
 * OpenRouter client (OpenAI-compatible chat completions).
 *
 * OpenRouter only offers free-text completion, so it is always wrapped as
 * `Backend::FreeTextOnly`.
 */

use async_trait::async_trait;
use log::error;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::{
    GenerationRequest, GenerationResponse, Provider, TokenUsage, classify_http_error, classify_transport_error,
};

/// Default OpenRouter API base URL
pub const DEFAULT_OPENROUTER_ENDPOINT: &str = "https://openrouter.ai/api/v1";

/// OpenRouter client
#[derive(Debug)]
pub struct OpenRouter {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// API base URL
    endpoint: String,
    /// Model identifier, e.g. "anthropic/claude-3.5-sonnet"
    model: String,
    /// Request timeout in seconds
    timeout_secs: u64,
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender (system, user, assistant)
    pub role: String,
    /// Content of the message
    #[serde(default)]
    pub content: Option<String>,
}

/// Chat completion request
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    /// Model that served the request
    #[serde(default)]
    pub model: Option<String>,
    /// Completion choices
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    /// Token usage
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

/// A completion choice
#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    /// Generated message
    pub message: ChatMessage,
    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage information
#[derive(Debug, Deserialize)]
pub struct ChatUsage {
    /// Prompt tokens
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Completion tokens
    #[serde(default)]
    pub completion_tokens: u64,
    /// Total tokens
    #[serde(default)]
    pub total_tokens: u64,
}

impl ChatRequest {
    fn from_request(model: &str, request: &GenerationRequest) -> Self {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: Some(system.clone()),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: Some(request.prompt.clone()),
        });
        Self {
            model: model.to_string(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
        }
    }
}

/// Whether an error body describes a moderation rejection rather than bad credentials
fn is_moderation_error(message: &str) -> bool {
    let lowered = message.to_lowercase();
    lowered.contains("moderation") || lowered.contains("flagged")
}

impl OpenRouter {
    /// Create a new OpenRouter client
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, endpoint: impl Into<String>, timeout_secs: u64) -> Self {
        let endpoint = endpoint.into();
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            endpoint: if endpoint.is_empty() {
                DEFAULT_OPENROUTER_ENDPOINT.to_string()
            } else {
                endpoint
            },
            model: model.into(),
            timeout_secs,
        }
    }

    /// Turn a raw response into generated text, detecting content filtering
    pub fn into_generation_response(response: ChatResponse, model: &str) -> Result<GenerationResponse, ProviderError> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ParseError("OpenRouter response contained no choices".to_string()))?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(ProviderError::ProhibitedContent {
                reason: "content_filter".to_string(),
            });
        }

        let text = choice.message.content.unwrap_or_default();
        if text.trim().is_empty() {
            return Err(ProviderError::ParseError("OpenRouter returned empty text".to_string()));
        }

        Ok(GenerationResponse {
            model: response.model.unwrap_or_else(|| model.to_string()),
            text,
            usage: response.usage.map(|usage| TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            }),
        })
    }
}

#[async_trait]
impl Provider for OpenRouter {
    fn name(&self) -> &str {
        "openrouter"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate_text(&self, request: &GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        let api_url = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));

        let response = self
            .client
            .post(&api_url)
            .header("Content-Type", "application/json")
            .bearer_auth(&self.api_key)
            .json(&ChatRequest::from_request(&self.model, request))
            .send()
            .await
            .map_err(|e| classify_transport_error(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("OpenRouter API error ({}): {}", status, error_text);
            if is_moderation_error(&error_text) {
                return Err(ProviderError::ProhibitedContent { reason: error_text });
            }
            return Err(classify_http_error(status.as_u16(), error_text));
        }

        let parsed = response
            .json::<ChatResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(format!("Failed to parse OpenRouter API response: {}", e)))?;

        Self::into_generation_response(parsed, &self.model)
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let request = GenerationRequest::new("Hello").max_output_tokens(10);
        self.generate_text(&request).await.map(|_| ())
    }
}
