/*!
 * Prompt templates and the immutable catalog holding them.
 *
 * Templates use `{placeholder}` fields. Rendering is a single pass, so text
 * substituted into a field is never itself scanned for placeholders, and a
 * field without a value is a configuration error rather than an empty string.
 */

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use crate::errors::TranslationError;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder pattern is valid"));

/// A prompt template with `{placeholder}` fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptTemplate {
    /// The template string with placeholders
    template: String,
}

impl PromptTemplate {
    /// Create a new prompt template.
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    /// Placeholder names used by the template.
    pub fn placeholders(&self) -> BTreeSet<String> {
        PLACEHOLDER
            .captures_iter(&self.template)
            .map(|captures| captures[1].to_string())
            .collect()
    }

    /// Render the template with the given values.
    ///
    /// Every placeholder must have a value.
    pub fn render(&self, values: &BTreeMap<&str, String>) -> Result<String, TranslationError> {
        let missing: Vec<String> = self
            .placeholders()
            .into_iter()
            .filter(|name| !values.contains_key(name.as_str()))
            .collect();
        if !missing.is_empty() {
            return Err(TranslationError::Configuration(format!(
                "Prompt template has no value for: {}",
                missing.join(", ")
            )));
        }

        Ok(PLACEHOLDER
            .replace_all(&self.template, |captures: &regex::Captures| {
                values.get(&captures[1]).cloned().unwrap_or_default()
            })
            .into_owned())
    }

    /// Template text.
    pub fn as_str(&self) -> &str {
        &self.template
    }
}

/// Template for the main translation prompt
pub const TRANSLATION: &str = r#"# Task: literary translation
You are a professional literary translator. Translate the source text into {target_language}.

## Narrative style
{core_style}

## Style notes for this passage
{style_deviation}

## Glossary (use these translations exactly)
{glossary}

## How {protagonist} speaks to other characters
{character_styles}

## Immediately preceding text (context only, do not translate)
Source: {previous_source}
Translation: {previous_translation}

## Rules
- Keep paragraph breaks exactly as in the source.
- Output only the translation, without notes or explanations.

## Source text
{segment_text}"#;

/// Template for the last-resort prompt without any guides
pub const MINIMAL_TRANSLATION: &str = r#"Translate the following text into {target_language}. Output only the translation.

{segment_text}"#;

/// Template for proper noun extraction
pub const GLOSSARY_EXTRACTION: &str = r#"# Task: term extraction
Extract the proper nouns and key terms (names of people, places, organizations, invented terms) that appear in the text below.
Return a JSON object {"terms": [...]} with each term exactly as written in the text.

{segment_text}"#;

/// Template for translating newly found terms
pub const GLOSSARY_TRANSLATION: &str = r#"# Task: term translation
Translate each of the following terms into {target_language}. Keep the translations consistent with the existing glossary.

Existing glossary:
{existing_glossary}

Terms:
{terms}

Return a JSON object {"translations": [{"term": "...", "translation": "..."}]}."#;

/// Template for dialogue register analysis
pub const CHARACTER_STYLE: &str = r#"# Task: dialogue register analysis
Find dialogue in the text where {protagonist} speaks to another character. For each such character, describe the speech register {protagonist} uses toward them in {target_language} (for example: formal, casual, honorific).
Return a JSON object {"styles": [{"character": "...", "register": "..."}]}. Return an empty list if {protagonist} does not speak to anyone.

Preceding text (only for identifying speakers):
{previous_context}

Text:
{segment_text}"#;

/// Template for style deviation analysis
pub const STYLE_DEVIATION: &str = r#"# Task: style deviation
The core narrative style of this book is:
{core_style}

Describe in one or two sentences how the tone of the passage below differs from the core style. If it does not differ, answer exactly: NO_DEVIATION

{segment_text}"#;

/// Template for the one-time core style definition
pub const CORE_STYLE: &str = r#"# Task: narrative style definition
Read the opening of a book and describe, in a short paragraph, the narrative style its {target_language} translation should keep: tone, narration person, and sentence-ending conventions.

{sample_text}"#;

/// Template for world and atmosphere summaries
pub const WORLD_CONTEXT: &str = r#"# Task: world context
Summarize in one or two sentences the setting, time and atmosphere of the passage below.

{segment_text}"#;

/// All prompt templates used by a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptCatalog {
    /// Main translation prompt
    pub translation: PromptTemplate,
    /// Last-resort prompt
    pub minimal_translation: PromptTemplate,
    /// Term extraction
    pub glossary_extraction: PromptTemplate,
    /// Term translation
    pub glossary_translation: PromptTemplate,
    /// Dialogue register analysis
    pub character_style: PromptTemplate,
    /// Style deviation analysis
    pub style_deviation: PromptTemplate,
    /// Core style definition
    pub core_style: PromptTemplate,
    /// World context summary
    pub world_context: PromptTemplate,
}

impl Default for PromptCatalog {
    fn default() -> Self {
        Self {
            translation: PromptTemplate::new(TRANSLATION),
            minimal_translation: PromptTemplate::new(MINIMAL_TRANSLATION),
            glossary_extraction: PromptTemplate::new(GLOSSARY_EXTRACTION),
            glossary_translation: PromptTemplate::new(GLOSSARY_TRANSLATION),
            character_style: PromptTemplate::new(CHARACTER_STYLE),
            style_deviation: PromptTemplate::new(STYLE_DEVIATION),
            core_style: PromptTemplate::new(CORE_STYLE),
            world_context: PromptTemplate::new(WORLD_CONTEXT),
        }
    }
}

impl PromptCatalog {
    /// Fields each template must use, and may use
    fn contracts(&self) -> [(&'static str, &PromptTemplate, &'static [&'static str], &'static [&'static str]); 8] {
        [
            (
                "translation",
                &self.translation,
                &["segment_text"],
                &[
                    "target_language",
                    "core_style",
                    "style_deviation",
                    "glossary",
                    "character_styles",
                    "protagonist",
                    "previous_source",
                    "previous_translation",
                    "segment_text",
                ],
            ),
            (
                "minimal_translation",
                &self.minimal_translation,
                &["segment_text"],
                &["target_language", "segment_text"],
            ),
            ("glossary_extraction", &self.glossary_extraction, &["segment_text"], &["segment_text"]),
            (
                "glossary_translation",
                &self.glossary_translation,
                &["terms"],
                &["target_language", "existing_glossary", "terms"],
            ),
            (
                "character_style",
                &self.character_style,
                &["segment_text"],
                &["protagonist", "target_language", "previous_context", "segment_text"],
            ),
            (
                "style_deviation",
                &self.style_deviation,
                &["core_style", "segment_text"],
                &["core_style", "segment_text"],
            ),
            ("core_style", &self.core_style, &["sample_text"], &["target_language", "sample_text"]),
            ("world_context", &self.world_context, &["segment_text"], &["segment_text"]),
        ]
    }

    /// Check every template uses its required fields and no unknown ones.
    pub fn validate(&self) -> Result<(), TranslationError> {
        for (name, template, required, allowed) in self.contracts() {
            let used = template.placeholders();
            if let Some(missing) = required.iter().find(|field| !used.contains(**field)) {
                return Err(TranslationError::Configuration(format!(
                    "Prompt template '{}' must contain {{{}}}",
                    name, missing
                )));
            }
            if let Some(unknown) = used.iter().find(|field| !allowed.contains(&field.as_str())) {
                return Err(TranslationError::Configuration(format!(
                    "Prompt template '{}' uses unknown placeholder {{{}}}",
                    name, unknown
                )));
            }
        }
        Ok(())
    }

    /// Load a catalog from JSON; templates not in the file keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, TranslationError> {
        let content = fs::read_to_string(path).map_err(|e| {
            TranslationError::Configuration(format!("Failed to read prompt catalog {}: {}", path.display(), e))
        })?;
        let catalog: Self = serde_json::from_str(&content).map_err(|e| {
            TranslationError::Configuration(format!("Failed to parse prompt catalog {}: {}", path.display(), e))
        })?;
        catalog.validate()?;
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaultCatalog_shouldValidate() {
        assert!(PromptCatalog::default().validate().is_ok());
    }

    #[test]
    fn test_render_missingValue_shouldFailLoudly() {
        let template = PromptTemplate::new("Translate into {target_language}: {segment_text}");
        let values = BTreeMap::from([("segment_text", "Hello".to_string())]);

        let result = template.render(&values);

        assert!(matches!(result, Err(TranslationError::Configuration(msg)) if msg.contains("target_language")));
    }

    #[test]
    fn test_render_valueWithBraces_shouldNotBeExpandedAgain() {
        let template = PromptTemplate::new("A: {segment_text} B: {target_language}");
        let values = BTreeMap::from([
            ("segment_text", "{target_language}".to_string()),
            ("target_language", "Korean".to_string()),
        ]);

        let rendered = template.render(&values).unwrap();

        assert_eq!(rendered, "A: {target_language} B: Korean");
    }

    #[test]
    fn test_validate_templateWithoutSegmentText_shouldFail() {
        let catalog = PromptCatalog {
            translation: PromptTemplate::new("Translate into {target_language}."),
            ..PromptCatalog::default()
        };

        assert!(matches!(catalog.validate(), Err(TranslationError::Configuration(_))));
    }

    #[test]
    fn test_validate_unknownPlaceholder_shouldFail() {
        let catalog = PromptCatalog {
            minimal_translation: PromptTemplate::new("{segment_text} {tone}"),
            ..PromptCatalog::default()
        };

        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_fromJsonFile_partialOverride_shouldKeepDefaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.json");
        fs::write(&path, r#"{"minimal_translation": "Into {target_language}:\n{segment_text}"}"#).unwrap();

        let catalog = PromptCatalog::from_json_file(&path).unwrap();

        assert_eq!(catalog.minimal_translation.as_str(), "Into {target_language}:\n{segment_text}");
        assert_eq!(catalog.translation, PromptCatalog::default().translation);
    }
}
