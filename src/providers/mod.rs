/*!
 * Provider implementations for the LLM backends.
 *
 * This module contains client implementations for the supported backends:
 * - Gemini: Google Generative Language API and Vertex AI (native JSON schema output)
 * - OpenRouter: OpenAI-compatible chat completions (free text only)
 * - Mock: scripted provider for tests and offline runs
 *
 * Backends are tagged with their capability through `Backend`, so callers
 * branch on a known capability set instead of probing a client at runtime.
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

use crate::errors::ProviderError;

/// A single generation request, shared by every backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Prompt text sent as the user message
    pub prompt: String,

    /// Optional system instruction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl GenerationRequest {
    /// Create a new request for a prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Set the system instruction
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the output token limit
    pub fn max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }
}

/// Token counts reported by a backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u64,
    /// Tokens in the generated output
    pub completion_tokens: u64,
    /// Total tokens billed
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Create usage counts, deriving the total
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Generated output of a backend call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResponse {
    /// Model that produced the output
    pub model: String,
    /// Generated text (raw JSON text for structured calls)
    pub text: String,
    /// Token usage, when the backend reports it
    pub usage: Option<TokenUsage>,
}

/// Common trait for all LLM providers
///
/// Implementations perform exactly one HTTP exchange per call. Retries,
/// timeouts and credential rotation are the gateway's concern.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// Short backend name used in logs and usage records
    fn name(&self) -> &str;

    /// Model identifier
    fn model(&self) -> &str;

    /// Generate free text
    ///
    /// # Arguments
    /// * `request` - The generation request
    ///
    /// # Returns
    /// * `Result<GenerationResponse, ProviderError>` - The generated text or an error;
    ///   a content-safety rejection is reported as `ProviderError::ProhibitedContent`
    async fn generate_text(&self, request: &GenerationRequest) -> Result<GenerationResponse, ProviderError>;

    /// Test the connection to the provider
    async fn test_connection(&self) -> Result<(), ProviderError>;
}

/// Providers with native schema-constrained JSON output
#[async_trait]
pub trait StructuredProvider: Provider {
    /// Generate JSON text constrained to `schema` (a JSON schema object)
    async fn generate_structured(
        &self,
        request: &GenerationRequest,
        schema: &Value,
    ) -> Result<GenerationResponse, ProviderError>;
}

/// Capability-tagged backend
#[derive(Debug, Clone)]
pub enum Backend {
    /// Backend that can only complete free text
    FreeTextOnly(Arc<dyn Provider>),
    /// Backend with native structured output
    StructuredCapable(Arc<dyn StructuredProvider>),
}

impl Backend {
    /// Whether `generate_structured` is available
    pub fn supports_structured(&self) -> bool {
        matches!(self, Self::StructuredCapable(_))
    }

    /// Backend name
    pub fn name(&self) -> &str {
        match self {
            Self::FreeTextOnly(provider) => provider.name(),
            Self::StructuredCapable(provider) => provider.name(),
        }
    }

    /// Model identifier
    pub fn model(&self) -> &str {
        match self {
            Self::FreeTextOnly(provider) => provider.model(),
            Self::StructuredCapable(provider) => provider.model(),
        }
    }

    /// Generate free text with whichever provider is wrapped
    pub async fn generate_text(&self, request: &GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        match self {
            Self::FreeTextOnly(provider) => provider.generate_text(request).await,
            Self::StructuredCapable(provider) => provider.generate_text(request).await,
        }
    }

    /// Generate structured output, if the backend has the capability
    pub async fn generate_structured(
        &self,
        request: &GenerationRequest,
        schema: &Value,
    ) -> Result<GenerationResponse, ProviderError> {
        match self {
            Self::FreeTextOnly(provider) => Err(ProviderError::Unsupported(format!(
                "{} does not support structured output",
                provider.name()
            ))),
            Self::StructuredCapable(provider) => provider.generate_structured(request, schema).await,
        }
    }

    /// Test the connection to the backend
    pub async fn test_connection(&self) -> Result<(), ProviderError> {
        match self {
            Self::FreeTextOnly(provider) => provider.test_connection().await,
            Self::StructuredCapable(provider) => provider.test_connection().await,
        }
    }
}

/// Map an HTTP status and body to a provider error.
pub(crate) fn classify_http_error(status_code: u16, message: String) -> ProviderError {
    match status_code {
        401 | 403 => ProviderError::AuthenticationError(message),
        429 => ProviderError::RateLimitExceeded(message),
        _ => ProviderError::ApiError { status_code, message },
    }
}

/// Map a reqwest transport error to a provider error.
pub(crate) fn classify_transport_error(error: reqwest::Error, timeout_secs: u64) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(timeout_secs)
    } else if error.is_connect() {
        ProviderError::ConnectionError(error.to_string())
    } else {
        ProviderError::RequestFailed(error.to_string())
    }
}

pub mod gemini;
pub mod mock;
pub mod openrouter;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifyHttpError_shouldMapAuthAndRateLimit() {
        assert!(matches!(
            classify_http_error(401, "bad key".to_string()),
            ProviderError::AuthenticationError(_)
        ));
        assert!(matches!(
            classify_http_error(429, "slow down".to_string()),
            ProviderError::RateLimitExceeded(_)
        ));
        assert!(matches!(
            classify_http_error(500, "oops".to_string()),
            ProviderError::ApiError { status_code: 500, .. }
        ));
    }

    #[test]
    fn test_tokenUsage_new_shouldDeriveTotal() {
        let usage = TokenUsage::new(120, 30);
        assert_eq!(usage.total_tokens, 150);
    }
}
