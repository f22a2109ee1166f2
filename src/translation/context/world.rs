/*!
 * Optional world and atmosphere summaries attached to translated segments.
 */

use log::warn;
use std::collections::BTreeMap;

use crate::translation::context::AnalysisContext;

/// World context analyzer
#[derive(Debug, Clone)]
pub struct WorldContextAnalyzer {
    context: AnalysisContext,
}

impl WorldContextAnalyzer {
    /// Create a new analyzer.
    pub fn new(context: AnalysisContext) -> Self {
        Self { context }
    }

    /// Summarize setting and atmosphere; failures yield `None`.
    pub async fn summarize(&self, segment_text: &str) -> Option<String> {
        let values = BTreeMap::from([("segment_text", segment_text.to_string())]);
        let prompt = match self.context.catalog.world_context.render(&values) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!("World context skipped: {}", e);
                return None;
            }
        };

        match self.context.gateway.generate_text(&prompt).await {
            Ok(summary) if !summary.trim().is_empty() => Some(summary.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                warn!("World context skipped: {}", e);
                None
            }
        }
    }
}
