/*!
 * Cross-segment context for narrative consistency.
 *
 * This module provides the analyzers run before each segment is translated:
 * - Glossary growth for proper nouns and key terms
 * - Speech register tracking between the protagonist and other characters
 * - Style deviation against the job-wide core narrative style
 * - Optional world/atmosphere summaries
 * - The one-time core style definition
 */

use std::sync::Arc;

use crate::translation::gateway::ModelGateway;
use crate::translation::prompts::PromptCatalog;

pub mod character_style;
pub mod core_style;
pub mod glossary;
pub mod guide;
pub mod style_deviation;
pub mod world;

// Re-export main types
pub use character_style::CharacterStyleManager;
pub use core_style::{CoreStyleDefiner, DEFAULT_CORE_STYLE, opening_sample};
pub use glossary::GlossaryManager;
pub use guide::{DynamicGuideBuilder, Guides};
pub use style_deviation::StyleDeviationAnalyzer;
pub use world::WorldContextAnalyzer;

/// What every analyzer needs: a gateway, the prompt catalog and the target language
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    /// Model gateway
    pub gateway: ModelGateway,
    /// Prompt templates
    pub catalog: Arc<PromptCatalog>,
    /// Target language display name
    pub target_language: String,
}

impl AnalysisContext {
    /// Create an analysis context.
    pub fn new(gateway: ModelGateway, catalog: Arc<PromptCatalog>, target_language: &str) -> Self {
        Self {
            gateway,
            catalog,
            target_language: target_language.to_string(),
        }
    }
}
