/*!
 * Glossary growth for terminology consistency.
 *
 * Each segment goes through a two-step protocol:
 * 1. extract candidate proper nouns and key terms from the segment
 * 2. translate only the terms the glossary does not know yet
 *
 * The delta is merged additively. Growth is best-effort: any failure is
 * logged and the glossary is returned unchanged.
 */

use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

use crate::errors::TranslationError;
use crate::translation::context::AnalysisContext;
use crate::translation::state::Glossary;

/// Response of the extraction step
#[derive(Debug, Deserialize)]
struct ExtractedTerms {
    terms: Vec<String>,
}

/// Response of the translation step
#[derive(Debug, Deserialize)]
struct TranslatedTerms {
    translations: Vec<TermTranslation>,
}

#[derive(Debug, Deserialize)]
struct TermTranslation {
    term: String,
    translation: String,
}

fn extraction_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "terms": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["terms"]
    })
}

fn translation_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "translations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "term": {"type": "string"},
                        "translation": {"type": "string"}
                    },
                    "required": ["term", "translation"]
                }
            }
        },
        "required": ["translations"]
    })
}

/// Cumulative glossary manager
#[derive(Debug, Clone)]
pub struct GlossaryManager {
    context: AnalysisContext,
}

impl GlossaryManager {
    /// Create a new glossary manager.
    pub fn new(context: AnalysisContext) -> Self {
        Self { context }
    }

    /// Extract candidate terms occurring in the segment.
    pub async fn extract_terms(&self, segment_text: &str) -> Result<Vec<String>, TranslationError> {
        let values = BTreeMap::from([("segment_text", segment_text.to_string())]);
        let prompt = self.context.catalog.glossary_extraction.render(&values)?;

        let value = self.context.gateway.generate_json(&prompt, &extraction_schema()).await?;
        let extracted: ExtractedTerms = serde_json::from_value(value)
            .map_err(|e| TranslationError::Configuration(format!("Unexpected extraction response: {}", e)))?;

        Ok(extracted
            .terms
            .into_iter()
            .map(|term| term.trim().to_string())
            .filter(|term| !term.is_empty() && segment_text.contains(term.as_str()))
            .collect())
    }

    /// Translate exactly the given terms, with `known` as consistency context.
    pub async fn translate_terms(&self, terms: &[String], known: &Glossary) -> Result<Glossary, TranslationError> {
        let existing = if known.is_empty() {
            "(none)".to_string()
        } else {
            known
                .iter()
                .map(|(term, translation)| format!("- {}: {}", term, translation))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let values = BTreeMap::from([
            ("target_language", self.context.target_language.clone()),
            ("existing_glossary", existing),
            ("terms", terms.iter().map(|t| format!("- {}", t)).collect::<Vec<_>>().join("\n")),
        ]);
        let prompt = self.context.catalog.glossary_translation.render(&values)?;

        let value = self.context.gateway.generate_json(&prompt, &translation_schema()).await?;
        let translated: TranslatedTerms = serde_json::from_value(value)
            .map_err(|e| TranslationError::Configuration(format!("Unexpected term translation response: {}", e)))?;

        // Only the requested terms are accepted
        Ok(Glossary::from_pairs(
            translated
                .translations
                .into_iter()
                .filter(|entry| terms.iter().any(|t| t == entry.term.trim()))
                .map(|entry| (entry.term, entry.translation)),
        ))
    }

    async fn try_update(&self, segment_text: &str, current: &Glossary) -> Result<Glossary, TranslationError> {
        let candidates = self.extract_terms(segment_text).await?;
        let unknown = current.unknown_terms(candidates.iter().map(String::as_str));
        if unknown.is_empty() {
            debug!("No new glossary terms in segment");
            return Ok(Glossary::new());
        }

        self.translate_terms(&unknown, current).await
    }

    /// Grow the glossary with terms new in this segment.
    ///
    /// Never fails: on any error the input glossary is returned as is.
    pub async fn update(&self, segment_text: &str, current: Glossary) -> Glossary {
        match self.try_update(segment_text, &current).await {
            Ok(delta) if delta.is_empty() => current,
            Ok(delta) => {
                let mut updated = current;
                let added = updated.merge_additive(&delta);
                info!("Glossary: +{} terms ({} total)", added, updated.len());
                updated
            }
            Err(e) => {
                warn!("Glossary update skipped: {}", e);
                current
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;
    use crate::translation::context::tests::analysis_context;

    fn responder() -> MockProvider {
        MockProvider::with_responder(|call| {
            if call.prompt.contains("Task: term extraction") {
                Ok(r#"{"terms": ["Pencey Prep", "Pencey Prep", "Agerstown"]}"#.to_string())
            } else {
                Ok(r#"{"translations": [
                    {"term": "Pencey Prep", "translation": "펜시 고등학교"},
                    {"term": "Holden", "translation": "홀덴"}
                ]}"#
                .to_string())
            }
        })
    }

    #[tokio::test]
    async fn test_update_newTerm_shouldTranslateOnlyDelta() {
        let provider = responder();
        let manager = GlossaryManager::new(analysis_context(&provider));
        let text = "I was at Pencey Prep. Pencey Prep is in Agerstown, Pennsylvania.";
        let current = Glossary::from_pairs([("Agerstown", "에이저스타운"), ("Ackley", "애클리")]);

        let updated = manager.update(text, current).await;

        assert_eq!(updated.get("Pencey Prep"), Some("펜시 고등학교"));
        assert_eq!(updated.get("Agerstown"), Some("에이저스타운"));
        assert!(!updated.contains("Holden"));
        let translation_prompts: Vec<_> = provider
            .calls()
            .into_iter()
            .filter(|c| c.prompt.contains("Task: term translation"))
            .collect();
        assert_eq!(translation_prompts.len(), 1);
        assert!(translation_prompts[0].prompt.contains("- Pencey Prep"));
        assert!(!translation_prompts[0].prompt.contains("- Agerstown\n"));
        // The whole glossary is context, including terms absent from the segment
        assert!(translation_prompts[0].prompt.contains("- Ackley: 애클리"));
    }

    #[tokio::test]
    async fn test_update_allTermsKnown_shouldSkipTranslationCall() {
        let provider = responder();
        let manager = GlossaryManager::new(analysis_context(&provider));
        let current = Glossary::from_pairs([("Pencey Prep", "펜시"), ("Agerstown", "에이저스타운")]);

        let updated = manager.update("Pencey Prep, Agerstown.", current.clone()).await;

        assert_eq!(updated, current);
        assert_eq!(provider.count_prompts_containing("Task: term translation"), 0);
    }

    #[tokio::test]
    async fn test_update_providerBlocked_shouldReturnInputUnchanged() {
        let provider = MockProvider::blocking();
        let manager = GlossaryManager::new(analysis_context(&provider));
        let current = Glossary::from_pairs([("Holden", "홀든")]);

        let updated = manager.update("Holden said nothing.", current.clone()).await;

        assert_eq!(updated, current);
    }

    #[tokio::test]
    async fn test_extractTerms_hallucinatedTerm_shouldBeDropped() {
        let provider = MockProvider::working().with_script(vec![Ok(r#"{"terms": ["Phoebe", "Narnia"]}"#.to_string())]);
        let manager = GlossaryManager::new(analysis_context(&provider));

        let terms = manager.extract_terms("Phoebe was asleep.").await.unwrap();

        assert_eq!(terms, vec!["Phoebe".to_string()]);
    }
}
