/*!
 * Gemini client for the Generative Language API and Vertex AI.
 *
 * Both endpoints share the `generateContent` wire shape; they differ only in
 * URL and authentication (API key query parameter vs. bearer token).
 * Content-safety rejections are detected from `promptFeedback.blockReason`
 * or a safety-related `finishReason` and reported as `ProhibitedContent`.
 */

use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::errors::ProviderError;
use crate::providers::{
    GenerationRequest, GenerationResponse, Provider, StructuredProvider, TokenUsage, classify_http_error,
    classify_transport_error,
};

/// Default Generative Language API base URL
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";

/// Finish reasons that mean the output was withheld for policy reasons
const BLOCKING_FINISH_REASONS: &[&str] = &["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII", "RECITATION"];

/// Where requests are sent and how they are authenticated
#[derive(Debug, Clone)]
pub enum GeminiEndpoint {
    /// Generative Language API authenticated with an API key
    GenerativeLanguage {
        /// Base URL
        base_url: String,
        /// API key
        api_key: String,
    },
    /// Vertex AI authenticated with an OAuth access token
    Vertex {
        /// Google Cloud project id
        project: String,
        /// Region, e.g. "us-central1"
        location: String,
        /// Bearer access token
        access_token: String,
    },
}

/// Gemini client
#[derive(Debug)]
pub struct Gemini {
    /// HTTP client for API requests
    client: Client,
    /// Endpoint and credentials
    endpoint: GeminiEndpoint,
    /// Model name, e.g. "gemini-2.5-flash"
    model: String,
    /// Request timeout in seconds
    timeout_secs: u64,
}

/// Request body for `generateContent`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

/// Content block of a request or response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiContent {
    /// Role of the author ("user" or "model")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Parts of the content
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

/// A text part
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiPart {
    /// Text of the part
    #[serde(default)]
    pub text: String,
}

/// Generation parameters
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

/// Response body of `generateContent`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    /// Generated candidates
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    /// Feedback about the prompt itself
    #[serde(default)]
    pub prompt_feedback: Option<GeminiPromptFeedback>,
    /// Token counts
    #[serde(default)]
    pub usage_metadata: Option<GeminiUsageMetadata>,
    /// Model version that served the request
    #[serde(default)]
    pub model_version: Option<String>,
}

/// A generated candidate
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    /// Generated content
    #[serde(default)]
    pub content: Option<GeminiContent>,
    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Prompt feedback
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiPromptFeedback {
    /// Set when the prompt itself was blocked
    #[serde(default)]
    pub block_reason: Option<String>,
}

/// Token counts
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiUsageMetadata {
    /// Prompt tokens
    #[serde(default)]
    pub prompt_token_count: u64,
    /// Output tokens
    #[serde(default)]
    pub candidates_token_count: u64,
    /// Total tokens
    #[serde(default)]
    pub total_token_count: u64,
}

impl GeminiRequest {
    fn from_request(request: &GenerationRequest) -> Self {
        Self {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: request.prompt.clone(),
                }],
            }],
            system_instruction: request.system.as_ref().map(|system| GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: system.clone() }],
            }),
            generation_config: GeminiGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
                ..Default::default()
            },
        }
    }

    fn with_schema(mut self, schema: &Value) -> Self {
        self.generation_config.response_mime_type = Some("application/json".to_string());
        self.generation_config.response_schema = Some(schema.clone());
        self
    }
}

impl Gemini {
    /// Create a client for the Generative Language API
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, endpoint: impl Into<String>, timeout_secs: u64) -> Self {
        let base_url = endpoint.into();
        let base_url = if base_url.is_empty() {
            DEFAULT_GEMINI_ENDPOINT.to_string()
        } else {
            base_url
        };
        Self::with_endpoint(
            GeminiEndpoint::GenerativeLanguage {
                base_url,
                api_key: api_key.into(),
            },
            model,
            timeout_secs,
        )
    }

    /// Create a client for Vertex AI
    pub fn vertex(
        project: impl Into<String>,
        location: impl Into<String>,
        access_token: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        Self::with_endpoint(
            GeminiEndpoint::Vertex {
                project: project.into(),
                location: location.into(),
                access_token: access_token.into(),
            },
            model,
            timeout_secs,
        )
    }

    /// Create a client for an explicit endpoint
    pub fn with_endpoint(endpoint: GeminiEndpoint, model: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            endpoint,
            model: model.into(),
            timeout_secs,
        }
    }

    /// URL of the `generateContent` method
    pub fn generate_url(&self) -> Result<Url, ProviderError> {
        let raw = match &self.endpoint {
            GeminiEndpoint::GenerativeLanguage { base_url, .. } => format!(
                "{}/v1beta/models/{}:generateContent",
                base_url.trim_end_matches('/'),
                self.model
            ),
            GeminiEndpoint::Vertex { project, location, .. } => format!(
                "https://{location}-aiplatform.googleapis.com/v1/projects/{project}/locations/{location}/publishers/google/models/{}:generateContent",
                self.model
            ),
        };
        Url::parse(&raw).map_err(|e| ProviderError::RequestFailed(format!("Invalid endpoint URL {}: {}", raw, e)))
    }

    async fn send(&self, body: &GeminiRequest) -> Result<GenerationResponse, ProviderError> {
        let url = self.generate_url()?;
        let builder = self.client.post(url).header("Content-Type", "application/json");
        let builder = match &self.endpoint {
            GeminiEndpoint::GenerativeLanguage { api_key, .. } => builder.header("x-goog-api-key", api_key),
            GeminiEndpoint::Vertex { access_token, .. } => builder.bearer_auth(access_token),
        };

        let response = builder
            .json(body)
            .send()
            .await
            .map_err(|e| classify_transport_error(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Gemini API error ({}): {}", status, error_text);
            return Err(classify_http_error(status.as_u16(), error_text));
        }

        let parsed = response
            .json::<GeminiResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(format!("Failed to parse Gemini API response: {}", e)))?;

        Self::into_generation_response(parsed, &self.model)
    }

    /// Turn a raw response into generated text, detecting safety blocks
    pub fn into_generation_response(response: GeminiResponse, model: &str) -> Result<GenerationResponse, ProviderError> {
        if let Some(reason) = response.prompt_feedback.as_ref().and_then(|f| f.block_reason.as_ref()) {
            return Err(ProviderError::ProhibitedContent { reason: reason.clone() });
        }

        let candidate = response
            .candidates
            .first()
            .ok_or_else(|| ProviderError::ParseError("Gemini response contained no candidates".to_string()))?;

        if let Some(reason) = candidate.finish_reason.as_deref() {
            if BLOCKING_FINISH_REASONS.contains(&reason) {
                return Err(ProviderError::ProhibitedContent {
                    reason: reason.to_string(),
                });
            }
        }

        let text: String = candidate
            .content
            .as_ref()
            .map(|content| content.parts.iter().map(|part| part.text.as_str()).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ProviderError::ParseError(format!(
                "Gemini returned empty text (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        let usage = response.usage_metadata.map(|usage| TokenUsage {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
            total_tokens: usage.total_token_count,
        });

        debug!("Gemini finish reason: {:?}", candidate.finish_reason);

        Ok(GenerationResponse {
            model: response.model_version.unwrap_or_else(|| model.to_string()),
            text,
            usage,
        })
    }
}

#[async_trait]
impl Provider for Gemini {
    fn name(&self) -> &str {
        match self.endpoint {
            GeminiEndpoint::GenerativeLanguage { .. } => "gemini",
            GeminiEndpoint::Vertex { .. } => "vertex",
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate_text(&self, request: &GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        self.send(&GeminiRequest::from_request(request)).await
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let request = GenerationRequest::new("Hello").max_output_tokens(10);
        self.generate_text(&request).await.map(|_| ())
    }
}

#[async_trait]
impl StructuredProvider for Gemini {
    async fn generate_structured(
        &self,
        request: &GenerationRequest,
        schema: &Value,
    ) -> Result<GenerationResponse, ProviderError> {
        self.send(&GeminiRequest::from_request(request).with_schema(schema)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> GeminiResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_intoGenerationResponse_withText_shouldJoinPartsAndReadUsage() {
        let response = parse(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "안녕"}, {"text": "하세요"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 4, "totalTokenCount": 16}
        }));

        let generated = Gemini::into_generation_response(response, "gemini-2.5-flash").unwrap();

        assert_eq!(generated.text, "안녕하세요");
        assert_eq!(generated.model, "gemini-2.5-flash");
        assert_eq!(generated.usage, Some(TokenUsage::new(12, 4)));
    }

    #[test]
    fn test_intoGenerationResponse_blockedPrompt_shouldBeProhibited() {
        let response = parse(json!({"promptFeedback": {"blockReason": "PROHIBITED_CONTENT"}}));

        let result = Gemini::into_generation_response(response, "m");

        assert!(matches!(result, Err(ProviderError::ProhibitedContent { reason }) if reason == "PROHIBITED_CONTENT"));
    }

    #[test]
    fn test_intoGenerationResponse_safetyFinish_shouldBeProhibited() {
        let response = parse(json!({"candidates": [{"finishReason": "SAFETY"}]}));

        let result = Gemini::into_generation_response(response, "m");

        assert!(result.unwrap_err().is_prohibited());
    }

    #[test]
    fn test_intoGenerationResponse_emptyText_shouldBeParseError() {
        let response = parse(json!({"candidates": [{"content": {"parts": []}, "finishReason": "MAX_TOKENS"}]}));

        let result = Gemini::into_generation_response(response, "m");

        assert!(matches!(result, Err(ProviderError::ParseError(_))));
    }

    #[test]
    fn test_generateUrl_vertex_shouldIncludeProjectAndLocation() {
        let client = Gemini::vertex("my-project", "us-central1", "token", "gemini-2.5-pro", 120);

        let url = client.generate_url().unwrap();

        assert_eq!(client.name(), "vertex");
        assert!(url.as_str().starts_with("https://us-central1-aiplatform.googleapis.com/v1/projects/my-project/"));
        assert!(url.as_str().ends_with("models/gemini-2.5-pro:generateContent"));
    }

    #[test]
    fn test_requestBody_withSchema_shouldRequestJson() {
        let request = GenerationRequest::new("List names").temperature(0.2);
        let body = GeminiRequest::from_request(&request).with_schema(&json!({"type": "object"}));

        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(value["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(value["contents"][0]["parts"][0]["text"], "List names");
        assert!(value.get("systemInstruction").is_none());
    }
}
