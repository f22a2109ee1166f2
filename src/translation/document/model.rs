/*!
 * Core document model types for segment translation.
 *
 * Source segments and their translations form two index-aligned sequences;
 * `TranslatedDocument` guards that alignment while a job runs.
 */

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::errors::TranslationError;

/// Chapter metadata carried by segments of chapter-structured documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterInfo {
    /// Chapter title, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// File inside the container the chapter came from (e.g. an EPUB spine item)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
}

impl ChapterInfo {
    /// Create chapter metadata with a title.
    pub fn titled(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            source_file: None,
        }
    }

    /// Set the source file name.
    pub fn with_source_file(mut self, source_file: &str) -> Self {
        self.source_file = Some(source_file.to_string());
        self
    }
}

/// A zero-based chunk of source text, the unit of translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Position in the document
    pub index: usize,

    /// Source text
    pub text: String,

    /// Whitespace that separated this segment from the next one in the
    /// normalized source ("\n\n" between paragraphs, a space or newline
    /// inside a paragraph that had to be split)
    pub trailing_separator: String,

    /// Chapter metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter: Option<ChapterInfo>,
}

impl Segment {
    /// Create a segment ending at a paragraph boundary.
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            trailing_separator: "\n\n".to_string(),
            chapter: None,
        }
    }

    /// Length of the text in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Optional annotations attached to a segment after translation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentAnnotations {
    /// Illustration generated for the segment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub illustration_path: Option<PathBuf>,

    /// World/atmosphere summary produced while building guides
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_context: Option<String>,
}

/// The translation of the source segment with the same index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedSegment {
    /// Index of the source segment
    pub index: usize,

    /// Translated text
    pub text: String,

    /// Whether the text came from the last-resort minimal prompt
    #[serde(default)]
    pub degraded: bool,

    /// Post-translation annotations
    #[serde(default)]
    pub annotations: SegmentAnnotations,

    /// Chapter metadata copied from the source segment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter: Option<ChapterInfo>,
}

impl TranslatedSegment {
    /// Create a translated segment.
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            degraded: false,
            annotations: SegmentAnnotations::default(),
            chapter: None,
        }
    }
}

/// Ordered translated segments, aligned by index with the source sequence.
#[derive(Debug, Clone, Default)]
pub struct TranslatedDocument {
    /// Index of the first segment held (non-zero after a resume)
    start_index: usize,
    segments: Vec<TranslatedSegment>,
}

impl TranslatedDocument {
    /// Create an empty document whose first segment will have `start_index`.
    pub fn starting_at(start_index: usize) -> Self {
        Self {
            start_index,
            segments: Vec::new(),
        }
    }

    /// Append the next segment; its index must follow the previous one.
    pub fn push(&mut self, segment: TranslatedSegment) -> Result<(), TranslationError> {
        let expected = self.next_index();
        if segment.index != expected {
            return Err(TranslationError::DataIntegrity(format!(
                "translated segment {} does not follow segment {}",
                segment.index,
                expected as i64 - 1
            )));
        }
        self.segments.push(segment);
        Ok(())
    }

    /// Index the next pushed segment must have.
    pub fn next_index(&self) -> usize {
        self.start_index + self.segments.len()
    }

    /// Segments held.
    pub fn segments(&self) -> &[TranslatedSegment] {
        &self.segments
    }

    /// Number of segments held.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether nothing has been translated yet.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Check that the document covers exactly `total_segments` source segments.
    pub fn verify_complete(&self, total_segments: usize) -> Result<(), TranslationError> {
        if self.next_index() != total_segments {
            return Err(TranslationError::DataIntegrity(format!(
                "{} source segments but translations end at index {}",
                total_segments,
                self.next_index()
            )));
        }
        Ok(())
    }

    /// Consume the document, returning its segments.
    pub fn into_segments(self) -> Vec<TranslatedSegment> {
        self.segments
    }
}
