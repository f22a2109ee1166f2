/*!
 * Deterministic rendering of the per-segment translation prompt.
 */

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::TranslationError;
use crate::translation::prompts::catalog::PromptCatalog;
use crate::translation::state::{CharacterStyleMap, Glossary};

/// Rendered in place of an empty section
const NONE_MARKER: &str = "(none)";

/// Rendered as the previous context of the first segment
const START_MARKER: &str = "(start of the document)";

/// Inputs of one translation prompt
#[derive(Debug, Clone, Copy)]
pub struct PromptInput<'a> {
    /// Job-wide narrative style
    pub core_style: &'a str,
    /// Deviation note for this segment, if any
    pub deviation_note: Option<&'a str>,
    /// Cumulative glossary (filtered to the segment while rendering)
    pub glossary: &'a Glossary,
    /// Character speech registers
    pub character_styles: &'a CharacterStyleMap,
    /// Source text of the segment
    pub source_segment: &'a str,
    /// Bounded tail of the previous segment's source
    pub previous_source_tail: Option<&'a str>,
    /// Bounded tail of the previous segment's translation
    pub previous_translation_tail: Option<&'a str>,
    /// Protagonist name
    pub protagonist_name: &'a str,
}

/// Bounded suffix of `text` starting at a word boundary.
///
/// At most `max_chars` characters are kept. When the cut falls inside a
/// word, the partial word is dropped; text without any whitespace in the
/// window is cut at the character limit.
pub fn context_tail(text: &str, max_chars: usize) -> &str {
    let text = text.trim_end();
    let total = text.chars().count();
    if total <= max_chars {
        return text.trim_start();
    }

    let cut = text
        .char_indices()
        .nth(total - max_chars)
        .map(|(position, _)| position)
        .unwrap_or(0);
    let window = &text[cut..];

    let starts_mid_word = !window.starts_with(char::is_whitespace)
        && text[..cut].chars().next_back().is_some_and(|c| !c.is_whitespace());
    if !starts_mid_word {
        return window.trim_start();
    }

    match window.find(char::is_whitespace) {
        Some(space) => window[space..].trim_start(),
        None => window,
    }
}

fn render_pairs<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    let lines: Vec<String> = pairs.map(|(key, value)| format!("- {}: {}", key, value)).collect();
    if lines.is_empty() {
        NONE_MARKER.to_string()
    } else {
        lines.join("\n")
    }
}

/// Prompt builder bound to an immutable catalog
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    catalog: Arc<PromptCatalog>,
    target_language: String,
}

impl PromptBuilder {
    /// Create a builder for a target language display name (e.g. "Korean").
    pub fn new(catalog: Arc<PromptCatalog>, target_language: &str) -> Self {
        Self {
            catalog,
            target_language: target_language.to_string(),
        }
    }

    /// Target language display name.
    pub fn target_language(&self) -> &str {
        &self.target_language
    }

    /// Render the translation prompt.
    ///
    /// Only glossary terms occurring in the source segment are included.
    pub fn build(&self, input: &PromptInput<'_>) -> Result<String, TranslationError> {
        let contextual_glossary = input.glossary.filter_for_text(input.source_segment);
        let deviation = input
            .deviation_note
            .filter(|note| !note.trim().is_empty())
            .unwrap_or(NONE_MARKER);

        let values = BTreeMap::from([
            ("target_language", self.target_language.clone()),
            ("core_style", input.core_style.to_string()),
            ("style_deviation", deviation.to_string()),
            ("glossary", render_pairs(contextual_glossary.iter())),
            ("character_styles", render_pairs(input.character_styles.iter())),
            ("protagonist", input.protagonist_name.to_string()),
            (
                "previous_source",
                input.previous_source_tail.unwrap_or(START_MARKER).to_string(),
            ),
            (
                "previous_translation",
                input.previous_translation_tail.unwrap_or(START_MARKER).to_string(),
            ),
            ("segment_text", input.source_segment.to_string()),
        ]);

        self.catalog.translation.render(&values)
    }
}
