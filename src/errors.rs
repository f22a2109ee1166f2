/*!
 * Error types for the litrans application.
 *
 * This module contains custom error types for the different layers of the
 * translation pipeline, using the thiserror crate for ergonomic definitions:
 * - `ProviderError`: a single model call (gateway level)
 * - `TranslationError`: a translation job (orchestrator level)
 * - `AppError`: everything surfacing to the CLI
 */

use thiserror::Error;

use crate::translation::state::{CharacterStyleMap, Glossary};

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication or permissions
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The backend refused to generate because of its content-safety policy
    #[error("Prohibited content: {reason}")]
    ProhibitedContent {
        /// Block reason reported by the backend
        reason: String,
    },

    /// The call did not complete within the configured bound
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// The backend does not offer the requested capability
    #[error("Unsupported capability: {0}")]
    Unsupported(String),
}

impl ProviderError {
    /// Whether the gateway may retry this error with the same request.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionError(_) | Self::RateLimitExceeded(_) | Self::Timeout(_) => true,
            Self::RequestFailed(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }

    /// Whether a backup credential may fix this error.
    pub fn is_credential_failure(&self) -> bool {
        match self {
            Self::AuthenticationError(_) => true,
            Self::ApiError { status_code, .. } => *status_code == 401 || *status_code == 403,
            _ => false,
        }
    }

    /// Whether this is a content-safety rejection.
    pub fn is_prohibited(&self) -> bool {
        matches!(self, Self::ProhibitedContent { .. })
    }
}

/// Diagnostic context attached to an unrecoverable content-safety failure
#[derive(Debug, Clone)]
pub struct SafetyFailure {
    /// Index of the segment that could not be translated
    pub segment_index: usize,
    /// Number of generation attempts made, including the last resort
    pub attempts: u32,
    /// Prompt of the last attempt
    pub prompt: String,
    /// Source text of the segment
    pub source_text: String,
    /// Glossary at the time of failure
    pub glossary: Glossary,
    /// Character styles at the time of failure
    pub character_styles: CharacterStyleMap,
    /// The provider error that ended the ladder
    pub cause: ProviderError,
}

/// Errors that can occur during a translation job
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Non-safety error from the provider, after gateway retries
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Every softening attempt and the minimal prompt were blocked
    #[error(
        "Segment {} blocked by content policy after {} attempts: {}",
        .0.segment_index, .0.attempts, .0.cause
    )]
    ProhibitedContent(Box<SafetyFailure>),

    /// Missing credentials, malformed templates, schema mismatches
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A checkpoint could not be written or read
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Source and translated sequences disagree
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// The job referenced by the caller does not exist
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// The job was cancelled between segments
    #[error("Job cancelled after segment {last_completed:?}")]
    Cancelled {
        /// Last segment whose checkpoint was written
        last_completed: Option<usize>,
    },

    /// Error reading the source or writing the output
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
