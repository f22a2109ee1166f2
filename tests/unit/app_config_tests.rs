/*!
 * Tests for application configuration functionality
 */

use std::str::FromStr;

use litrans::app_config::{Config, LogLevel, ProviderConfig, TranslationProvider};

/// Test default configuration values
#[test]
fn test_defaultConfig_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.translation.provider, TranslationProvider::Gemini);
    assert_eq!(config.translation.available_providers.len(), 3);
    assert_eq!(config.pipeline.target_segment_size, 15000);
    assert_eq!(config.pipeline.diagnostics_dir, Some(std::path::PathBuf::from("diagnostics")));
    assert_eq!(config.log_level, LogLevel::Info);
}

#[test]
fn test_providerFromStr_withMixedCase_shouldParse() {
    assert_eq!(TranslationProvider::from_str("OpenRouter").unwrap(), TranslationProvider::OpenRouter);
    assert_eq!(TranslationProvider::from_str("vertex").unwrap(), TranslationProvider::Vertex);
    assert!(TranslationProvider::from_str("ollama").is_err());
    assert_eq!(TranslationProvider::OpenRouter.to_string(), "openrouter");
}

#[test]
fn test_validate_vertexWithProject_shouldPass() {
    let mut config = Config::default();
    config.translation.provider = TranslationProvider::Vertex;
    let mut vertex = ProviderConfig::new(TranslationProvider::Vertex);
    vertex.project = Some("my-project".to_string());
    vertex.api_key = "ya29.token".to_string();
    config.translation.available_providers.retain(|p| p.provider_type != "vertex");
    config.translation.available_providers.push(vertex);

    assert!(config.validate().is_ok());
}

#[test]
fn test_saveAndLoad_shouldKeepPipelineSettings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conf.json");
    let mut config = Config::default();
    config.pipeline.protagonist_name = Some("Holden".to_string());
    config.pipeline.enable_world_context = true;
    config.translation.set_model("gemini-2.5-flash");

    config.save(&path).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded.pipeline.protagonist_name.as_deref(), Some("Holden"));
    assert!(loaded.pipeline.enable_world_context);
    assert_eq!(loaded.translation.get_model(), "gemini-2.5-flash");
}

#[test]
fn test_orchestratorSettings_shouldMirrorPipelineConfig() {
    let mut config = Config::default();
    config.pipeline.max_soft_retries = 5;
    config.pipeline.context_tail_chars = 200;

    let settings = config.pipeline.orchestrator_settings();

    assert_eq!(settings.max_soft_retries, 5);
    assert_eq!(settings.context_tail_chars, 200);
    assert_eq!(settings.style_sample_chars, 3000);
}
