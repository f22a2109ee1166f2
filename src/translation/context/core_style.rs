/*!
 * One-time definition of the job-wide core narrative style.
 */

use log::{info, warn};
use std::collections::BTreeMap;

use crate::errors::TranslationError;
use crate::translation::context::AnalysisContext;
use crate::translation::document::Segment;

/// Neutral style used when the definition call is blocked
pub const DEFAULT_CORE_STYLE: &str = "Neutral literary prose. Keep the narration person of the original, \
use a consistent plain written register for narration, and natural spoken register in dialogue.";

/// Opening text of the document, at most `max_chars` characters, cut at a word boundary.
pub fn opening_sample<'a>(segments: impl IntoIterator<Item = &'a Segment>, max_chars: usize) -> String {
    let mut sample = String::new();
    let mut length = 0;

    for segment in segments {
        for ch in segment.text.chars().chain(segment.trailing_separator.chars()) {
            if length == max_chars {
                return match sample.rfind(char::is_whitespace) {
                    Some(boundary) if boundary > 0 => sample[..boundary].trim_end().to_string(),
                    _ => sample,
                };
            }
            sample.push(ch);
            length += 1;
        }
    }

    sample.trim_end().to_string()
}

/// Core narrative style definer
#[derive(Debug, Clone)]
pub struct CoreStyleDefiner {
    context: AnalysisContext,
}

impl CoreStyleDefiner {
    /// Create a new definer.
    pub fn new(context: AnalysisContext) -> Self {
        Self { context }
    }

    /// Derive the style from an opening sample.
    ///
    /// A content-safety block falls back to `DEFAULT_CORE_STYLE`; other
    /// provider errors are returned.
    pub async fn define(&self, sample_text: &str) -> Result<String, TranslationError> {
        let values = BTreeMap::from([
            ("target_language", self.context.target_language.clone()),
            ("sample_text", sample_text.to_string()),
        ]);
        let prompt = self.context.catalog.core_style.render(&values)?;

        match self.context.gateway.generate_text(&prompt).await {
            Ok(style) if !style.trim().is_empty() => {
                info!("Core narrative style defined ({} chars)", style.chars().count());
                Ok(style)
            }
            Ok(_) => {
                warn!("Empty core style response, using the default style");
                Ok(DEFAULT_CORE_STYLE.to_string())
            }
            Err(e) if e.is_prohibited() => {
                warn!("Core style definition blocked ({}), using the default style", e);
                Ok(DEFAULT_CORE_STYLE.to_string())
            }
            Err(e) => Err(TranslationError::Provider(e)),
        }
    }
}
