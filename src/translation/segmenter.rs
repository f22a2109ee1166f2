/*!
 * Splitting of document text into translation segments.
 *
 * Text is normalized paragraph by paragraph (hard-wrapped lines are joined,
 * blank lines separate paragraphs) and paragraphs are accumulated into
 * segments of roughly `target_size` characters. Paragraphs larger than the
 * target are broken on sentence boundaries first. A single sentence larger
 * than the target is kept whole.
 *
 * Segments are produced lazily by the `Segments` iterator, which can be
 * cloned to restart the sequence from any point.
 */

use std::collections::VecDeque;
use std::str::Lines;
use std::sync::LazyLock;

use regex::Regex;

use crate::translation::document::{ChapterInfo, Segment};

/// Separator placed between paragraphs of normalized text
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Closing quotes that may follow sentence-terminal punctuation
const CLOSING_QUOTES: &[char] = &['"', '\'', '”', '’', '»', ')', '」', '』'];

/// Sentence-terminal punctuation
const TERMINALS: &[char] = &['.', '!', '?', '。', '！', '？'];

/// Sentence boundary: latin terminals need trailing whitespace, CJK ones don't
static SENTENCE_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:[.!?]["'”’»)]*\s+)|(?:[。！？]["'”’」』)]*\s*)"#)
        .expect("sentence boundary pattern is valid")
});

/// How paragraphs are laid out in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceFormat {
    /// Paragraphs separated by blank lines, possibly hard-wrapped
    #[default]
    PlainText,
    /// Text flattened from EPUB markup: every line is a paragraph
    Epub,
}

/// A chapter of a chapter-structured document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterText {
    /// Chapter metadata attached to every segment of the chapter
    pub info: ChapterInfo,
    /// Raw chapter text
    pub text: String,
}

/// Whether `text` ends a sentence: `.`, `!` or `?` optionally followed by closing quotes.
pub fn ends_sentence(text: &str) -> bool {
    text.trim_end()
        .trim_end_matches(CLOSING_QUOTES)
        .ends_with(TERMINALS)
}

/// Lazily yields normalized paragraphs of raw text.
#[derive(Debug, Clone)]
struct Paragraphs<'a> {
    lines: Lines<'a>,
    format: SourceFormat,
}

impl<'a> Paragraphs<'a> {
    fn new(text: &'a str, format: SourceFormat) -> Self {
        Self {
            lines: text.lines(),
            format,
        }
    }
}

impl Iterator for Paragraphs<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let mut paragraph = String::new();

        for line in self.lines.by_ref() {
            let line = line.trim();
            if line.is_empty() {
                if paragraph.is_empty() {
                    continue;
                }
                break;
            }

            if self.format == SourceFormat::Epub {
                return Some(line.to_string());
            }

            if paragraph.is_empty() {
                paragraph.push_str(line);
            } else if ends_sentence(&paragraph) {
                paragraph.push('\n');
                paragraph.push_str(line);
            } else {
                paragraph.push(' ');
                paragraph.push_str(line);
            }
        }

        if paragraph.is_empty() { None } else { Some(paragraph) }
    }
}

/// Smallest piece of text the accumulator works with
#[derive(Debug, Clone)]
struct Unit {
    text: String,
    separator: String,
}

/// Split a paragraph into sentences, keeping the exact whitespace between them.
fn split_sentences(paragraph: &str) -> Vec<(String, String)> {
    let mut pieces = Vec::new();
    let mut start = 0;

    for found in SENTENCE_BOUNDARY.find_iter(paragraph) {
        let matched = found.as_str();
        let sentence_end = found.start() + matched.trim_end().len();
        pieces.push((
            paragraph[start..sentence_end].to_string(),
            paragraph[sentence_end..found.end()].to_string(),
        ));
        start = found.end();
    }

    if start < paragraph.len() {
        pieces.push((paragraph[start..].to_string(), String::new()));
    }

    pieces
}

/// Lazy, restartable sequence of segments
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    paragraphs: std::iter::Peekable<Paragraphs<'a>>,
    pending: VecDeque<Unit>,
    target_size: usize,
    next_index: usize,
    chapter: Option<ChapterInfo>,
}

impl<'a> Segments<'a> {
    fn new(text: &'a str, format: SourceFormat, target_size: usize) -> Self {
        Self {
            paragraphs: Paragraphs::new(text, format).peekable(),
            pending: VecDeque::new(),
            target_size: target_size.max(1),
            next_index: 0,
            chapter: None,
        }
    }

    fn starting_at(mut self, index: usize) -> Self {
        self.next_index = index;
        self
    }

    fn in_chapter(mut self, chapter: ChapterInfo) -> Self {
        self.chapter = Some(chapter);
        self
    }

    /// Index the next produced segment will have
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    fn next_unit(&mut self) -> Option<Unit> {
        if let Some(unit) = self.pending.pop_front() {
            return Some(unit);
        }

        let paragraph = self.paragraphs.next()?;
        let separator = if self.paragraphs.peek().is_some() {
            PARAGRAPH_SEPARATOR
        } else {
            ""
        };

        if paragraph.chars().count() <= self.target_size {
            return Some(Unit {
                text: paragraph,
                separator: separator.to_string(),
            });
        }

        let mut sentences = split_sentences(&paragraph);
        if let Some(last) = sentences.last_mut() {
            last.1 = separator.to_string();
        }
        self.pending.extend(
            sentences
                .into_iter()
                .map(|(text, separator)| Unit { text, separator }),
        );
        self.pending.pop_front()
    }
}

impl Iterator for Segments<'_> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        let mut text = String::new();
        let mut length = 0;
        let mut trailing = String::new();

        while let Some(unit) = self.next_unit() {
            let unit_length = unit.text.chars().count();
            if !text.is_empty() {
                let separator_length = trailing.chars().count();
                if length + separator_length + unit_length > self.target_size {
                    self.pending.push_front(unit);
                    break;
                }
                text.push_str(&trailing);
                length += separator_length;
            }
            text.push_str(&unit.text);
            length += unit_length;
            trailing = unit.separator;
        }

        if text.is_empty() {
            return None;
        }

        let segment = Segment {
            index: self.next_index,
            text,
            trailing_separator: trailing,
            chapter: self.chapter.clone(),
        };
        self.next_index += 1;
        Some(segment)
    }
}

/// Segments of a chapter-structured document, indexed continuously
#[derive(Debug, Clone)]
pub struct ChapterSegments<'a> {
    chapters: std::slice::Iter<'a, ChapterText>,
    current: Option<Segments<'a>>,
    format: SourceFormat,
    target_size: usize,
    next_index: usize,
}

impl Iterator for ChapterSegments<'_> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        loop {
            if let Some(segments) = self.current.as_mut() {
                if let Some(segment) = segments.next() {
                    self.next_index = segment.index + 1;
                    return Some(segment);
                }
            }

            let chapter = self.chapters.next()?;
            self.current = Some(
                Segments::new(&chapter.text, self.format, self.target_size)
                    .starting_at(self.next_index)
                    .in_chapter(chapter.info.clone()),
            );
        }
    }
}

/// Format-aware segment splitter
#[derive(Debug, Clone, Copy)]
pub struct SegmentSplitter {
    target_size: usize,
    format: SourceFormat,
}

impl SegmentSplitter {
    /// Create a splitter for plain text.
    pub fn new(target_size: usize) -> Self {
        Self {
            target_size,
            format: SourceFormat::PlainText,
        }
    }

    /// Set the source format.
    pub fn with_format(mut self, format: SourceFormat) -> Self {
        self.format = format;
        self
    }

    /// Target segment size in characters.
    pub fn target_size(&self) -> usize {
        self.target_size
    }

    /// Split text into a lazy sequence of segments.
    pub fn split<'a>(&self, text: &'a str) -> Segments<'a> {
        Segments::new(text, self.format, self.target_size)
    }

    /// Split chapters, tagging each segment with its chapter.
    ///
    /// Segments never span chapters and indices continue across them.
    pub fn split_chapters<'a>(&self, chapters: &'a [ChapterText]) -> ChapterSegments<'a> {
        ChapterSegments {
            chapters: chapters.iter(),
            current: None,
            format: self.format,
            target_size: self.target_size,
            next_index: 0,
        }
    }

    /// Normalized form of `text`, the text segments reassemble to.
    pub fn normalize(&self, text: &str) -> String {
        Paragraphs::new(text, self.format)
            .collect::<Vec<_>>()
            .join(PARAGRAPH_SEPARATOR)
    }
}

/// Concatenate segments with their separators.
pub fn reassemble<'a>(segments: impl IntoIterator<Item = &'a Segment>) -> String {
    let mut text = String::new();
    for segment in segments {
        text.push_str(&segment.text);
        text.push_str(&segment.trailing_separator);
    }
    text
}
