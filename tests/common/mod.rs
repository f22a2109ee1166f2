/*!
 * Common test utilities for the litrans test suite
 */

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

use litrans::app_config::Config;
use litrans::app_controller::Controller;
use litrans::errors::ProviderError;
use litrans::providers::mock::{MockCall, MockProvider};
use litrans::session::JobManager;

/// Heading right before the source text in a full translation prompt
pub const SOURCE_MARKER: &str = "## Source text\n";

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Three short paragraphs that split into one segment each at size 25
pub const THREE_PARAGRAPHS: &str =
    "Phoebe laughed at me.\n\nAllie wrote poems on his mitt.\n\nThe end came quickly.";

/// A Markdown book with two titled chapters
pub const TWO_CHAPTERS: &str = "# Chapter One\n\nPhoebe laughed at me.\n\n# Chapter Two\n\nAllie wrote poems.\n";

/// Configuration suitable for tests: fast retries, no diagnostics files
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.translation.set_api_key("test-key");
    config.translation.common.retry_count = 1;
    config.translation.common.retry_backoff_ms = 1;
    config.pipeline.diagnostics_dir = None;
    config
}

/// Controller over a structured-capable mock and a shared job manager
pub fn controller(provider: &MockProvider, jobs: &JobManager) -> Controller {
    Controller::with_parts(test_config(), provider.clone().into_structured_backend(), jobs.clone())
        .expect("Failed to create test controller")
}

/// Source section of a full translation prompt
pub fn source_of(prompt: &str) -> Option<&str> {
    if !prompt.contains("Task: literary translation") {
        return None;
    }
    prompt.rsplit_once(SOURCE_MARKER).map(|(_, source)| source)
}

/// Sources the provider was asked to translate, in call order
pub fn translated_sources(provider: &MockProvider) -> Vec<String> {
    provider
        .calls()
        .iter()
        .filter_map(|call| source_of(&call.prompt).map(str::to_string))
        .collect()
}

/// Deterministic model: names become glossary terms, translations echo the source
pub fn literary_model(call: &MockCall) -> Result<String, ProviderError> {
    let prompt = &call.prompt;
    if prompt.contains("Task: narrative style definition") {
        Ok("Deadpan first person.".to_string())
    } else if prompt.contains("Task: term extraction") {
        let terms: Vec<&str> = ["Phoebe", "Allie"]
            .into_iter()
            .filter(|name| prompt.contains(name))
            .collect();
        Ok(serde_json::json!({ "terms": terms }).to_string())
    } else if prompt.contains("Task: term translation") {
        let translations: Vec<_> = [("Phoebe", "피비"), ("Allie", "앨리")]
            .into_iter()
            .filter(|(name, _)| prompt.contains(&format!("- {}", name)))
            .map(|(term, translation)| serde_json::json!({ "term": term, "translation": translation }))
            .collect();
        Ok(serde_json::json!({ "translations": translations }).to_string())
    } else if prompt.contains("Task: dialogue register analysis") {
        Ok(serde_json::json!({ "styles": [] }).to_string())
    } else if prompt.contains("Task: style deviation") {
        Ok("NO_DEVIATION".to_string())
    } else if let Some(source) = source_of(prompt) {
        Ok(format!("[ko] {}", source))
    } else if let Some((_, source)) = prompt.split_once("\n\n") {
        Ok(format!("[ko-minimal] {}", source))
    } else {
        Ok(String::new())
    }
}

/// Working mock answering like `literary_model`
pub fn literary_provider() -> MockProvider {
    MockProvider::with_responder(literary_model)
}
