use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::translation::gateway::GatewaySettings;
use crate::translation::orchestrator::OrchestratorSettings;

/// Settings read from `conf.json`: languages, provider credentials and the
/// pipeline knobs of a translation run
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code (ISO)
    pub source_language: String,

    /// Target language code (ISO)
    pub target_language: String,

    /// Translation config
    pub translation: TranslationConfig,

    /// Segmentation, retry ladder and guide settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation provider type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    // @provider: Gemini through the Generative Language API
    #[default]
    Gemini,
    // @provider: OpenRouter (OpenAI-compatible chat completions)
    OpenRouter,
    // @provider: Gemini through Vertex AI
    Vertex,
}

impl TranslationProvider {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Gemini => "Gemini",
            Self::OpenRouter => "OpenRouter",
            Self::Vertex => "Vertex AI",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Gemini => "gemini".to_string(),
            Self::OpenRouter => "openrouter".to_string(),
            Self::Vertex => "vertex".to_string(),
        }
    }

    /// Environment variable holding the credential of this provider
    pub fn credential_env_var(&self) -> &'static str {
        match self {
            Self::Gemini => "GEMINI_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
            Self::Vertex => "VERTEX_ACCESS_TOKEN",
        }
    }
}

// Implement Display trait for TranslationProvider
impl std::fmt::Display for TranslationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

// Implement FromStr trait for TranslationProvider
impl std::str::FromStr for TranslationProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openrouter" => Ok(Self::OpenRouter),
            "vertex" => Ok(Self::Vertex),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration wrapper
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    // @field: Model name
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API key (access token for Vertex)
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Second credential tried once when the first is rejected
    #[serde(default)]
    pub backup_api_key: Option<String>,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    // @field: Google Cloud project (Vertex only)
    #[serde(default)]
    pub project: Option<String>,

    // @field: Google Cloud region (Vertex only)
    #[serde(default)]
    pub location: Option<String>,
}

impl ProviderConfig {
    // @param provider_type: Provider enum
    // @returns: Provider config with defaults
    pub fn new(provider_type: TranslationProvider) -> Self {
        let (model, endpoint) = match provider_type {
            TranslationProvider::Gemini => (default_gemini_model(), default_gemini_endpoint()),
            TranslationProvider::OpenRouter => (default_openrouter_model(), default_openrouter_endpoint()),
            TranslationProvider::Vertex => (default_gemini_model(), String::new()),
        };
        let location = (provider_type == TranslationProvider::Vertex).then(default_vertex_location);

        Self {
            provider_type: provider_type.to_lowercase_string(),
            model,
            api_key: String::new(),
            backup_api_key: None,
            endpoint,
            timeout_secs: default_timeout_secs(),
            project: None,
            location,
        }
    }
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Translation provider to use
    #[serde(default)]
    pub provider: TranslationProvider,

    /// Available translation providers
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Common translation settings
    #[serde(default)]
    pub common: TranslationCommonConfig,
}

/// Common translation settings applicable to all providers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationCommonConfig {
    /// Retry count for transient failures
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Fixed delay between retries (in milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Temperature parameter for text generation (0.0 to 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for TranslationCommonConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            temperature: default_temperature(),
        }
    }
}

/// Pipeline settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Target segment size in characters
    #[serde(default = "default_target_segment_size")]
    pub target_segment_size: usize,

    /// Softened retries after a safety block, before the minimal prompt
    #[serde(default = "default_max_soft_retries")]
    pub max_soft_retries: u32,

    /// Characters of the previous segment shown as context
    #[serde(default = "default_context_tail_chars")]
    pub context_tail_chars: usize,

    /// Characters of the opening used to define the core style
    #[serde(default = "default_style_sample_chars")]
    pub style_sample_chars: usize,

    /// Narrator or protagonist whose speech registers are tracked
    #[serde(default)]
    pub protagonist_name: Option<String>,

    /// Add a world/atmosphere summary to each segment's guides
    #[serde(default)]
    pub enable_world_context: bool,

    /// JSON file overriding the built-in prompt catalog
    #[serde(default)]
    pub prompt_catalog_path: Option<PathBuf>,

    /// Replacement table for the softening step; the built-in one when absent
    #[serde(default)]
    pub euphemisms: Option<BTreeMap<String, String>>,

    /// Where content-safety escalation records are written
    #[serde(default)]
    pub diagnostics_dir: Option<PathBuf>,

    /// Job database; the per-user data directory when absent
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_segment_size: default_target_segment_size(),
            max_soft_retries: default_max_soft_retries(),
            context_tail_chars: default_context_tail_chars(),
            style_sample_chars: default_style_sample_chars(),
            protagonist_name: None,
            enable_world_context: false,
            prompt_catalog_path: None,
            euphemisms: None,
            diagnostics_dir: Some(PathBuf::from("diagnostics")),
            database_path: None,
        }
    }
}

impl PipelineConfig {
    /// Orchestrator settings derived from this section
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            max_soft_retries: self.max_soft_retries,
            context_tail_chars: self.context_tail_chars,
            style_sample_chars: self.style_sample_chars,
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Matching `log` filter
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000 // fixed, not doubled
}

fn default_temperature() -> f32 {
    0.3
}

fn default_target_segment_size() -> usize {
    15000
}

fn default_max_soft_retries() -> u32 {
    3
}

fn default_context_tail_chars() -> usize {
    500
}

fn default_style_sample_chars() -> usize {
    3000
}

fn default_gemini_endpoint() -> String {
    crate::providers::gemini::DEFAULT_GEMINI_ENDPOINT.to_string()
}

fn default_openrouter_endpoint() -> String {
    crate::providers::openrouter::DEFAULT_OPENROUTER_ENDPOINT.to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_openrouter_model() -> String {
    "google/gemini-2.5-pro".to_string()
}

fn default_vertex_location() -> String {
    "us-central1".to_string()
}

impl Config {
    /// Load a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open config file: {}", path.display()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load a configuration file, writing the defaults there first when it does not exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::from_file(path);
        }

        warn!("Config file not found at '{}', creating default config.", path.display());
        let config = Config::default();
        config.save(path)?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_json = serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;
        std::fs::write(path, config_json)
            .with_context(|| format!("Failed to write config to file: {}", path.display()))
    }

    /// Fill empty credentials from the provider's environment variable
    pub fn apply_env_credentials(&mut self) {
        let provider = self.translation.provider;
        if let Ok(value) = std::env::var(provider.credential_env_var()) {
            if !value.is_empty() {
                self.translation.set_api_key(&value);
            }
        }
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        // Validate languages
        let _source_name = crate::language_utils::get_language_name(&self.source_language)?;
        let _target_name = crate::language_utils::get_language_name(&self.target_language)?;

        if self.pipeline.target_segment_size == 0 {
            return Err(anyhow!("pipeline.target_segment_size must be greater than zero"));
        }

        let provider = self.translation.provider;
        if self.translation.get_api_key().is_empty() {
            return Err(anyhow!(
                "Translation API key is required for {} provider (set it in the config or {})",
                provider.display_name(),
                provider.credential_env_var()
            ));
        }

        if provider == TranslationProvider::Vertex {
            let project = self
                .translation
                .get_active_provider_config()
                .and_then(|p| p.project.as_deref())
                .unwrap_or_default();
            if project.is_empty() {
                return Err(anyhow!("A Google Cloud project is required for the Vertex provider"));
            }
        }

        Ok(())
    }

    /// Gateway call policy
    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            max_retries: self.translation.common.retry_count,
            retry_backoff: Duration::from_millis(self.translation.common.retry_backoff_ms),
            timeout: Duration::from_secs(self.translation.get_timeout_secs()),
            temperature: Some(self.translation.common.temperature),
        }
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: "en".to_string(),
            target_language: "ko".to_string(),
            translation: TranslationConfig::default(),
            pipeline: PipelineConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl TranslationConfig {
    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        self.get_provider_config(&self.provider)
    }

    /// Get a specific provider configuration by type
    pub fn get_provider_config(&self, provider_type: &TranslationProvider) -> Option<&ProviderConfig> {
        let provider_str = provider_type.to_lowercase_string();
        self.available_providers.iter().find(|p| p.provider_type == provider_str)
    }

    fn active_provider_config_mut(&mut self) -> &mut ProviderConfig {
        let provider_str = self.provider.to_lowercase_string();
        let position = self.available_providers.iter().position(|p| p.provider_type == provider_str);
        match position {
            Some(index) => &mut self.available_providers[index],
            None => {
                self.available_providers.push(ProviderConfig::new(self.provider));
                let last = self.available_providers.len() - 1;
                &mut self.available_providers[last]
            }
        }
    }

    /// Get the model for the active provider
    pub fn get_model(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.model.is_empty() {
                return provider_config.model.clone();
            }
        }

        // Default fallback based on provider type
        match self.provider {
            TranslationProvider::Gemini | TranslationProvider::Vertex => default_gemini_model(),
            TranslationProvider::OpenRouter => default_openrouter_model(),
        }
    }

    /// Override the model of the active provider
    pub fn set_model(&mut self, model: &str) {
        self.active_provider_config_mut().model = model.to_string();
    }

    /// Get the API key for the active provider
    pub fn get_api_key(&self) -> String {
        self.get_active_provider_config()
            .map(|p| p.api_key.clone())
            .unwrap_or_default()
    }

    /// Override the API key of the active provider
    pub fn set_api_key(&mut self, api_key: &str) {
        self.active_provider_config_mut().api_key = api_key.to_string();
    }

    /// Get the backup API key for the active provider
    pub fn get_backup_api_key(&self) -> Option<String> {
        self.get_active_provider_config()
            .and_then(|p| p.backup_api_key.clone())
            .filter(|key| !key.is_empty())
    }

    /// Get the endpoint for the active provider
    pub fn get_endpoint(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.endpoint.is_empty() {
                return provider_config.endpoint.clone();
            }
        }

        match self.provider {
            TranslationProvider::Gemini => default_gemini_endpoint(),
            TranslationProvider::OpenRouter => default_openrouter_endpoint(),
            TranslationProvider::Vertex => String::new(),
        }
    }

    /// Get the timeout for the active provider
    pub fn get_timeout_secs(&self) -> u64 {
        self.get_active_provider_config()
            .map(|p| p.timeout_secs)
            .filter(|secs| *secs > 0)
            .unwrap_or_else(default_timeout_secs)
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: TranslationProvider::default(),
            available_providers: vec![
                ProviderConfig::new(TranslationProvider::Gemini),
                ProviderConfig::new(TranslationProvider::OpenRouter),
                ProviderConfig::new(TranslationProvider::Vertex),
            ],
            common: TranslationCommonConfig::default(),
        }
    }
}
