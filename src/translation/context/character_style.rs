/*!
 * Speech register tracking between the protagonist and other characters.
 *
 * Structured-capable backends answer with JSON; free-text backends answer
 * with one `Character: register` line per character. A detected register
 * overwrites the previous one for the same pair.
 */

use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

use crate::errors::TranslationError;
use crate::translation::context::AnalysisContext;
use crate::translation::state::CharacterStyleMap;

/// Quotation marks that open or close dialogue
const DIALOGUE_MARKS: &[char] = &['"', '“', '”', '「', '」', '『', '』', '«', '»', '—'];

/// Instruction appended for backends without structured output
const LINE_FORMAT_INSTRUCTION: &str =
    "Instead of JSON, answer with one line per character in the form `Character: register`, or `NONE` if there is no such dialogue.";

#[derive(Debug, Deserialize)]
struct DetectedStyles {
    styles: Vec<DetectedStyle>,
}

#[derive(Debug, Deserialize)]
struct DetectedStyle {
    character: String,
    register: String,
}

fn styles_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "styles": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "character": {"type": "string"},
                        "register": {"type": "string"}
                    },
                    "required": ["character", "register"]
                }
            }
        },
        "required": ["styles"]
    })
}

/// Whether the text contains anything that looks like dialogue.
pub fn has_dialogue(text: &str) -> bool {
    text.contains(DIALOGUE_MARKS)
}

/// Parse `Character: register` lines.
pub fn parse_style_lines(response: &str) -> Vec<(String, String)> {
    response
        .lines()
        .map(|line| line.trim().trim_start_matches(['-', '*']).trim())
        .filter(|line| !line.is_empty() && !line.eq_ignore_ascii_case("none"))
        .filter_map(|line| line.split_once(':'))
        .map(|(character, register)| {
            (
                character.trim().trim_matches(['`', '*']).to_string(),
                register.trim().trim_matches(['`', '*']).to_string(),
            )
        })
        .filter(|(character, register)| !character.is_empty() && !register.is_empty())
        .collect()
}

/// Character speech style manager
#[derive(Debug, Clone)]
pub struct CharacterStyleManager {
    context: AnalysisContext,
}

impl CharacterStyleManager {
    /// Create a new manager.
    pub fn new(context: AnalysisContext) -> Self {
        Self { context }
    }

    /// Detect (character, register) pairs for dialogue of the protagonist.
    pub async fn detect(
        &self,
        segment_text: &str,
        protagonist: &str,
        previous_context: Option<&str>,
    ) -> Result<Vec<(String, String)>, TranslationError> {
        let values = BTreeMap::from([
            ("protagonist", protagonist.to_string()),
            ("target_language", self.context.target_language.clone()),
            ("previous_context", previous_context.unwrap_or("(none)").to_string()),
            ("segment_text", segment_text.to_string()),
        ]);
        let prompt = self.context.catalog.character_style.render(&values)?;

        let gateway = &self.context.gateway;
        let pairs = if gateway.supports_structured() {
            let value = gateway.generate_structured(&prompt, &styles_schema()).await?;
            let detected: DetectedStyles = serde_json::from_value(value)
                .map_err(|e| TranslationError::Configuration(format!("Unexpected style response: {}", e)))?;
            detected
                .styles
                .into_iter()
                .map(|style| (style.character, style.register))
                .collect()
        } else {
            let response = gateway
                .generate_text(&format!("{}\n\n{}", prompt, LINE_FORMAT_INSTRUCTION))
                .await?;
            parse_style_lines(&response)
        };

        Ok(pairs
            .into_iter()
            .filter(|(character, register)| {
                !character.trim().is_empty() && !register.trim().is_empty() && character.trim() != protagonist.trim()
            })
            .collect())
    }

    /// Record registers detected in this segment.
    ///
    /// Never fails: on any error the input map is returned as is.
    pub async fn update(
        &self,
        segment_text: &str,
        current: CharacterStyleMap,
        protagonist: &str,
        previous_context: Option<&str>,
    ) -> CharacterStyleMap {
        if protagonist.trim().is_empty() || !has_dialogue(segment_text) {
            return current;
        }

        match self.detect(segment_text, protagonist, previous_context).await {
            Ok(pairs) if pairs.is_empty() => {
                debug!("No protagonist dialogue detected");
                current
            }
            Ok(pairs) => {
                let mut updated = current;
                for (character, register) in pairs {
                    if let Some(previous) = updated.set(protagonist, &character, &register) {
                        if previous != register.trim() {
                            info!("Register of {} -> {} changed: {} -> {}", protagonist, character, previous, register);
                        }
                    }
                }
                updated
            }
            Err(e) => {
                warn!("Character style update skipped: {}", e);
                current
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;
    use crate::translation::context::tests::{analysis_context, text_analysis_context};

    const DIALOGUE: &str = "\"Hey, Phoebe,\" I said. \"How's it going, Mr. Antolini?\"";

    #[test]
    fn test_parseStyleLines_shouldSkipNoneAndBullets() {
        let pairs = parse_style_lines("- Phoebe: 반말\n* Mr. Antolini: 존댓말\nNONE\nnot a pair");

        assert_eq!(
            pairs,
            vec![
                ("Phoebe".to_string(), "반말".to_string()),
                ("Mr. Antolini".to_string(), "존댓말".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_update_structuredBackend_shouldOverwriteRegister() {
        let provider = MockProvider::working().with_script(vec![Ok(
            r#"{"styles": [{"character": "Phoebe", "register": "반말"}, {"character": "Mr. Antolini", "register": "존댓말"}]}"#
                .to_string(),
        )]);
        let manager = CharacterStyleManager::new(analysis_context(&provider));
        let mut current = CharacterStyleMap::new();
        current.set("Holden", "Phoebe", "존댓말");

        let updated = manager.update(DIALOGUE, current, "Holden", None).await;

        assert_eq!(updated.get("Holden", "Phoebe"), Some("반말"));
        assert_eq!(updated.get("Holden", "Mr. Antolini"), Some("존댓말"));
        assert!(provider.calls()[0].schema.is_some());
    }

    #[tokio::test]
    async fn test_update_freeTextBackend_shouldParseLines() {
        let provider = MockProvider::working().with_script(vec![Ok("Phoebe: 반말".to_string())]);
        let manager = CharacterStyleManager::new(text_analysis_context(&provider));

        let updated = manager.update(DIALOGUE, CharacterStyleMap::new(), "Holden", None).await;

        assert_eq!(updated.get("Holden", "Phoebe"), Some("반말"));
        assert!(provider.calls()[0].prompt.contains("Character: register"));
    }

    #[tokio::test]
    async fn test_update_noDialogue_shouldNotCallModel() {
        let provider = MockProvider::working();
        let manager = CharacterStyleManager::new(analysis_context(&provider));

        let updated = manager
            .update("It was a cold night and nobody spoke.", CharacterStyleMap::new(), "Holden", None)
            .await;

        assert!(updated.is_empty());
        assert_eq!(provider.request_count(), 0);
    }

    #[tokio::test]
    async fn test_update_failure_shouldReturnInputUnchanged() {
        let provider = MockProvider::failing();
        let manager = CharacterStyleManager::new(analysis_context(&provider));
        let mut current = CharacterStyleMap::new();
        current.set("Holden", "Ackley", "반말");

        let updated = manager.update(DIALOGUE, current.clone(), "Holden", None).await;

        assert_eq!(updated, current);
    }
}
