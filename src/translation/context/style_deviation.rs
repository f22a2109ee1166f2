/*!
 * Per-segment comparison of tone against the core narrative style.
 */

use log::warn;
use std::collections::BTreeMap;

use crate::errors::TranslationError;
use crate::translation::context::AnalysisContext;

/// Answer meaning the segment follows the core style
pub const NO_DEVIATION: &str = "NO_DEVIATION";

/// Stateless style deviation analyzer
#[derive(Debug, Clone)]
pub struct StyleDeviationAnalyzer {
    context: AnalysisContext,
}

impl StyleDeviationAnalyzer {
    /// Create a new analyzer.
    pub fn new(context: AnalysisContext) -> Self {
        Self { context }
    }

    async fn try_analyze(&self, segment_text: &str, core_style: &str) -> Result<Option<String>, TranslationError> {
        let values = BTreeMap::from([
            ("core_style", core_style.to_string()),
            ("segment_text", segment_text.to_string()),
        ]);
        let prompt = self.context.catalog.style_deviation.render(&values)?;
        let response = self.context.gateway.generate_text(&prompt).await?;

        let note = response.trim();
        if note.is_empty() || note.to_uppercase().contains(NO_DEVIATION) {
            Ok(None)
        } else {
            Ok(Some(note.to_string()))
        }
    }

    /// Describe how the segment's tone differs from `core_style`.
    ///
    /// `None` means no deviation; failures also yield `None`.
    pub async fn analyze(&self, segment_text: &str, core_style: &str) -> Option<String> {
        match self.try_analyze(segment_text, core_style).await {
            Ok(note) => note,
            Err(e) => {
                warn!("Style deviation analysis skipped: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;
    use crate::translation::context::tests::analysis_context;

    #[tokio::test]
    async fn test_analyze_sentinel_shouldReturnNone() {
        let provider = MockProvider::working().with_script(vec![Ok("no_deviation".to_string())]);
        let analyzer = StyleDeviationAnalyzer::new(analysis_context(&provider));

        assert_eq!(analyzer.analyze("text", "calm").await, None);
    }

    #[tokio::test]
    async fn test_analyze_note_shouldBeReturnedTrimmed() {
        let provider = MockProvider::working().with_script(vec![Ok("  More formal: a letter.  ".to_string())]);
        let analyzer = StyleDeviationAnalyzer::new(analysis_context(&provider));

        let note = analyzer.analyze("Dear Sir,", "casual first person").await;

        assert_eq!(note.as_deref(), Some("More formal: a letter."));
        assert!(provider.calls()[0].prompt.contains("casual first person"));
    }

    #[tokio::test]
    async fn test_analyze_blocked_shouldFallBackToNone() {
        let provider = MockProvider::blocking();
        let analyzer = StyleDeviationAnalyzer::new(analysis_context(&provider));

        assert_eq!(analyzer.analyze("text", "calm").await, None);
    }
}
