/*!
 * Mock provider implementations for testing.
 *
 * This module provides a mock provider that simulates different behaviors:
 * - `MockProvider::working()` - Always succeeds, echoing the prompt
 * - `MockProvider::failing()` - Always fails with a server error
 * - `MockProvider::blocking()` - Always rejects the prompt as prohibited content
 * - `MockProvider::with_responder(f)` - Answers through a closure
 *
 * A script of queued results takes precedence over the behavior, and every
 * call is recorded so tests can assert on prompts and call counts.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::ProviderError;
use crate::providers::{Backend, GenerationRequest, GenerationResponse, Provider, StructuredProvider, TokenUsage};

/// A recorded call
#[derive(Debug, Clone)]
pub struct MockCall {
    /// Prompt text
    pub prompt: String,
    /// Schema, for structured calls
    pub schema: Option<Value>,
}

/// Closure producing a response for a call
pub type MockResponder = Arc<dyn Fn(&MockCall) -> Result<String, ProviderError> + Send + Sync>;

/// Behavior mode for the mock provider
#[derive(Clone)]
pub enum MockBehavior {
    /// Always succeeds, echoing the prompt
    Working,
    /// Always fails with a server error
    Failing,
    /// Always rejects the prompt as prohibited content
    Blocking,
    /// Simulates a slow response (for timeout testing)
    Slow {
        /// Delay before answering
        delay_ms: u64,
    },
    /// Answers through a closure
    Responder(MockResponder),
}

impl fmt::Debug for MockBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Working => write!(f, "Working"),
            Self::Failing => write!(f, "Failing"),
            Self::Blocking => write!(f, "Blocking"),
            Self::Slow { delay_ms } => write!(f, "Slow {{ delay_ms: {} }}", delay_ms),
            Self::Responder(_) => write!(f, "Responder"),
        }
    }
}

/// Mock provider for testing translation behavior
#[derive(Debug, Clone)]
pub struct MockProvider {
    /// Provider name reported to the gateway
    name: String,
    /// Behavior mode
    behavior: MockBehavior,
    /// Results returned before the behavior applies
    script: Arc<Mutex<VecDeque<Result<String, ProviderError>>>>,
    /// Request counter, shared by clones
    request_count: Arc<AtomicUsize>,
    /// Recorded calls, shared by clones
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            name: "mock".to_string(),
            behavior,
            script: Arc::new(Mutex::new(VecDeque::new())),
            request_count: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a working mock provider that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create a failing mock provider that always errors
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Create a mock provider that rejects every prompt
    pub fn blocking() -> Self {
        Self::new(MockBehavior::Blocking)
    }

    /// Create a mock provider that answers after a delay
    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Create a mock provider answering through a closure
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&MockCall) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self::new(MockBehavior::Responder(Arc::new(responder)))
    }

    /// Queue results returned, in order, before the behavior applies
    pub fn with_script(self, results: Vec<Result<String, ProviderError>>) -> Self {
        self.script.lock().extend(results);
        self
    }

    /// Set the provider name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of calls made so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Calls made so far
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Number of recorded prompts containing `needle`
    pub fn count_prompts_containing(&self, needle: &str) -> usize {
        self.calls.lock().iter().filter(|call| call.prompt.contains(needle)).count()
    }

    /// Wrap as a free-text-only backend
    pub fn into_text_backend(self) -> Backend {
        Backend::FreeTextOnly(Arc::new(self))
    }

    /// Wrap as a structured-capable backend
    pub fn into_structured_backend(self) -> Backend {
        Backend::StructuredCapable(Arc::new(self))
    }

    async fn respond(&self, request: &GenerationRequest, schema: Option<&Value>) -> Result<GenerationResponse, ProviderError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        let call = MockCall {
            prompt: request.prompt.clone(),
            schema: schema.cloned(),
        };
        self.calls.lock().push(call.clone());

        let scripted = self.script.lock().pop_front();
        let text = match scripted {
            Some(result) => result?,
            None => match &self.behavior {
                MockBehavior::Working => format!("[TRANSLATED] {}", request.prompt),
                MockBehavior::Failing => {
                    return Err(ProviderError::ApiError {
                        status_code: 500,
                        message: "Simulated provider failure".to_string(),
                    });
                }
                MockBehavior::Blocking => {
                    return Err(ProviderError::ProhibitedContent {
                        reason: "SAFETY".to_string(),
                    });
                }
                MockBehavior::Slow { delay_ms } => {
                    tokio::time::sleep(tokio::time::Duration::from_millis(*delay_ms)).await;
                    format!("[TRANSLATED] {}", request.prompt)
                }
                MockBehavior::Responder(responder) => responder(&call)?,
            },
        };

        let usage = TokenUsage::new(
            (request.prompt.chars().count() / 4) as u64,
            (text.chars().count() / 4) as u64,
        );
        Ok(GenerationResponse {
            model: format!("{}-model", self.name),
            text,
            usage: Some(usage),
        })
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn generate_text(&self, request: &GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        self.respond(request, None).await
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        match self.behavior {
            MockBehavior::Failing => Err(ProviderError::ConnectionError("Simulated connection failure".to_string())),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl StructuredProvider for MockProvider {
    async fn generate_structured(
        &self,
        request: &GenerationRequest,
        schema: &Value,
    ) -> Result<GenerationResponse, ProviderError> {
        self.respond(request, Some(schema)).await
    }
}
