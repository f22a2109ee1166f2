/*!
 * Per-segment dynamic guides.
 *
 * Glossary growth, character styles, style deviation and (optionally) the
 * world context are independent of each other for a given segment, so they
 * run concurrently. Each branch absorbs its own failures, so one failing
 * analyzer never discards the others' results.
 */

use log::debug;

use crate::translation::context::{
    AnalysisContext, CharacterStyleManager, GlossaryManager, StyleDeviationAnalyzer, WorldContextAnalyzer,
};
use crate::translation::state::TranslationState;

/// Result of guide building for one segment
#[derive(Debug, Clone, PartialEq)]
pub struct Guides {
    /// State including this segment's glossary and style updates
    pub state: TranslationState,
    /// Deviation from the core style, `None` when there is none
    pub deviation_note: Option<String>,
    /// World/atmosphere summary, when enabled
    pub world_context: Option<String>,
}

/// Fan-out/fan-in over the segment analyzers
#[derive(Debug, Clone)]
pub struct DynamicGuideBuilder {
    glossary: GlossaryManager,
    character_styles: CharacterStyleManager,
    deviation: StyleDeviationAnalyzer,
    world: Option<WorldContextAnalyzer>,
    protagonist: String,
}

impl DynamicGuideBuilder {
    /// Create a builder; `protagonist` may be empty to skip style tracking.
    pub fn new(context: AnalysisContext, protagonist: &str) -> Self {
        Self {
            glossary: GlossaryManager::new(context.clone()),
            character_styles: CharacterStyleManager::new(context.clone()),
            deviation: StyleDeviationAnalyzer::new(context),
            world: None,
            protagonist: protagonist.to_string(),
        }
    }

    /// Also produce world context summaries.
    pub fn with_world_context(mut self, context: AnalysisContext) -> Self {
        self.world = Some(WorldContextAnalyzer::new(context));
        self
    }

    /// Protagonist name used for style keys.
    pub fn protagonist(&self) -> &str {
        &self.protagonist
    }

    /// Build the guides for one segment from the cumulative state.
    pub async fn build(
        &self,
        segment_text: &str,
        core_style: &str,
        state: TranslationState,
        previous_context: Option<&str>,
    ) -> Guides {
        let TranslationState {
            glossary,
            character_styles,
        } = state;

        let world = async {
            match &self.world {
                Some(analyzer) => analyzer.summarize(segment_text).await,
                None => None,
            }
        };

        let (glossary, character_styles, deviation_note, world_context) = tokio::join!(
            self.glossary.update(segment_text, glossary),
            self.character_styles
                .update(segment_text, character_styles, &self.protagonist, previous_context),
            self.deviation.analyze(segment_text, core_style),
            world,
        );

        debug!(
            "Guides built: {} glossary terms, {} character styles, deviation: {}",
            glossary.len(),
            character_styles.len(),
            deviation_note.is_some()
        );

        Guides {
            state: TranslationState::new(glossary, character_styles),
            deviation_note,
            world_context,
        }
    }
}
