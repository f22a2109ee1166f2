/*!
 * Document modeling for segment translation.
 *
 * This module provides the source/translated segment model:
 * - Immutable source segments with chapter metadata
 * - Index-aligned translated segments with annotations
 */

pub mod model;

// Re-export types used by other modules
pub use model::{ChapterInfo, Segment, SegmentAnnotations, TranslatedDocument, TranslatedSegment};
