/*!
 * Uniform gateway over the capability-tagged LLM backends.
 *
 * The gateway owns the low-level call policy shared by every caller:
 * - transient failures (network, 5xx, rate limits, timeouts) are retried up
 *   to `max_retries` times with a fixed backoff
 * - content-safety rejections are returned at once as `ProhibitedContent`
 * - authentication failures switch once to the backup credential, if any
 * - every successful call emits a usage record to the `UsageSink`
 */

use log::{debug, error, warn};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::{Backend, GenerationRequest, GenerationResponse};
use crate::translation::events::{UsageRecord, UsageSink};
use crate::translation::json_repair;

/// Call policy of the gateway
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Retries after the first attempt for transient failures
    pub max_retries: u32,
    /// Fixed delay between retries
    pub retry_backoff: Duration,
    /// Upper bound for a single call
    pub timeout: Duration,
    /// Sampling temperature sent with every request
    pub temperature: Option<f32>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff: Duration::from_millis(1000),
            timeout: Duration::from_secs(120),
            temperature: None,
        }
    }
}

/// What a single backend call asks for
#[derive(Debug, Clone, Copy)]
enum CallKind<'a> {
    Text,
    Structured(&'a Value),
}

/// Gateway over a primary backend and an optional backup credential
#[derive(Debug, Clone)]
pub struct ModelGateway {
    primary: Backend,
    backup: Option<Backend>,
    settings: GatewaySettings,
    usage_sink: Arc<dyn UsageSink>,
}

impl ModelGateway {
    /// Create a gateway over a backend
    pub fn new(primary: Backend, settings: GatewaySettings, usage_sink: Arc<dyn UsageSink>) -> Self {
        Self {
            primary,
            backup: None,
            settings,
            usage_sink,
        }
    }

    /// Set the backend used when the primary credential is rejected
    pub fn with_backup(mut self, backup: Backend) -> Self {
        self.backup = Some(backup);
        self
    }

    /// Whether native structured output is available on the primary or the backup
    pub fn supports_structured(&self) -> bool {
        self.structured_backend().is_some()
    }

    /// Backend for structured calls: the primary, else a capable backup
    fn structured_backend(&self) -> Option<&Backend> {
        std::iter::once(&self.primary)
            .chain(self.backup.as_ref())
            .find(|backend| backend.supports_structured())
    }

    /// Name of the primary backend
    pub fn backend_name(&self) -> &str {
        self.primary.name()
    }

    /// Model of the primary backend
    pub fn model(&self) -> &str {
        self.primary.model()
    }

    /// Call policy
    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    fn request(&self, prompt: &str) -> GenerationRequest {
        let request = GenerationRequest::new(prompt);
        match self.settings.temperature {
            Some(temperature) => request.temperature(temperature),
            None => request,
        }
    }

    async fn call_once(
        &self,
        backend: &Backend,
        request: &GenerationRequest,
        kind: CallKind<'_>,
    ) -> Result<GenerationResponse, ProviderError> {
        let call = async {
            match kind {
                CallKind::Text => backend.generate_text(request).await,
                CallKind::Structured(schema) => backend.generate_structured(request, schema).await,
            }
        };

        match tokio::time::timeout(self.settings.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.settings.timeout.as_secs())),
        }
    }

    async fn call_with_retry(
        &self,
        backend: &Backend,
        request: &GenerationRequest,
        kind: CallKind<'_>,
    ) -> Result<GenerationResponse, ProviderError> {
        let attempts = self.settings.max_retries + 1;
        let mut attempt = 1;

        loop {
            match self.call_once(backend, request, kind).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_prohibited() => {
                    warn!("{} rejected the prompt: {}", backend.name(), e);
                    return Err(e);
                }
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(
                        "{} transient error: {} - attempt {}/{}",
                        backend.name(),
                        e,
                        attempt,
                        attempts
                    );
                    tokio::time::sleep(self.settings.retry_backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!("{} call failed: {} - attempt {}/{}", backend.name(), e, attempt, attempts);
                    return Err(e);
                }
            }
        }
    }

    async fn execute(&self, prompt: &str, kind: CallKind<'_>) -> Result<GenerationResponse, ProviderError> {
        let request = self.request(prompt);

        let response = match self.call_with_retry(&self.primary, &request, kind).await {
            Err(e) if e.is_credential_failure() => match &self.backup {
                Some(backup) => {
                    warn!("Primary credential rejected ({}), retrying with backup credential", e);
                    self.call_with_retry(backup, &request, kind).await?
                }
                None => return Err(e),
            },
            result => result?,
        };

        self.record_usage(&response);
        Ok(response)
    }

    fn record_usage(&self, response: &GenerationResponse) {
        let Some(usage) = response.usage else {
            return;
        };
        let record = UsageRecord {
            model: response.model.clone(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        };
        if let Err(e) = self.usage_sink.record(&record) {
            debug!("Usage record dropped: {}", e);
        }
    }

    /// Generate free text.
    pub async fn generate_text(&self, prompt: &str) -> Result<String, ProviderError> {
        let response = self.execute(prompt, CallKind::Text).await?;
        Ok(response.text.trim().to_string())
    }

    /// Generate a value matching `schema` with native structured output.
    ///
    /// A free-text primary routes the call to a structured-capable backup.
    /// Fails with `ProviderError::Unsupported` when neither backend has it.
    pub async fn generate_structured(&self, prompt: &str, schema: &Value) -> Result<Value, ProviderError> {
        let kind = CallKind::Structured(schema);
        let response = if self.primary.supports_structured() {
            self.execute(prompt, kind).await?
        } else if let Some(backup) = self.structured_backend() {
            debug!("{} has no structured output, using {}", self.primary.name(), backup.name());
            let response = self.call_with_retry(backup, &self.request(prompt), kind).await?;
            self.record_usage(&response);
            response
        } else {
            return Err(ProviderError::Unsupported(format!(
                "{} does not support structured output",
                self.primary.name()
            )));
        };
        json_repair::parse_structured(&response.text, schema)
    }

    /// Generate a value matching `schema` on any backend.
    ///
    /// Uses native structured output when available, otherwise asks for JSON
    /// in free text and parses it with the same repair and schema checks.
    pub async fn generate_json(&self, prompt: &str, schema: &Value) -> Result<Value, ProviderError> {
        if self.supports_structured() {
            return self.generate_structured(prompt, schema).await;
        }
        let prompt = format!(
            "{}\n\nRespond with JSON only, matching this JSON schema:\n{}",
            prompt, schema
        );
        let response = self.execute(&prompt, CallKind::Text).await?;
        json_repair::parse_structured(&response.text, schema)
    }
}
