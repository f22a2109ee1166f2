/*!
 * Prompt engineering for segment translation.
 *
 * This module provides:
 * - An immutable catalog of prompt templates, injected at construction
 * - Deterministic rendering of the per-segment translation prompt
 * - Progressive softening of prompts blocked by content filters
 */

pub mod builder;
pub mod catalog;
pub mod sanitizer;

// Re-export main types
pub use builder::{PromptBuilder, PromptInput, context_tail};
pub use catalog::{PromptCatalog, PromptTemplate};
pub use sanitizer::PromptSanitizer;
