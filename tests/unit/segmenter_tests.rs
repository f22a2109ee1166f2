/*!
 * Tests for segment splitting through the public API
 */

use litrans::file_utils::FileManager;
use litrans::translation::segmenter::{SegmentSplitter, SourceFormat, reassemble};

use crate::common;

#[test]
fn test_split_anyTargetSize_shouldReassembleToNormalizedText() {
    let text = "Phoebe laughed at me. She always does.\n\nAllie wrote poems\non his mitt, in green ink.\n\nThe end came quickly! Or did it?";

    for size in [5, 20, 40, 1000] {
        let splitter = SegmentSplitter::new(size);
        let segments: Vec<_> = splitter.split(text).collect();

        assert_eq!(reassemble(&segments), splitter.normalize(text), "target size {}", size);
        for (position, segment) in segments.iter().enumerate() {
            assert_eq!(segment.index, position);
            assert!(!segment.text.trim().is_empty());
        }
    }
}

#[test]
fn test_split_epubFormat_shouldTreatEveryLineAsParagraph() {
    let splitter = SegmentSplitter::new(10).with_format(SourceFormat::Epub);

    let segments: Vec<_> = splitter.split("First line here\nSecond line here").collect();

    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].text, "First line here");
}

#[test]
fn test_splitChapters_markdownDocument_shouldTagAndNumberAcrossChapters() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::create_test_file(dir.path(), "book.md", common::TWO_CHAPTERS).unwrap();
    let document = FileManager::parse_document(&path).unwrap();

    let segments: Vec<_> = SegmentSplitter::new(1000).split_chapters(&document.chapters).collect();

    assert_eq!(segments.len(), 2);
    assert_eq!(segments[1].index, 1);
    let titles: Vec<_> = segments
        .iter()
        .map(|s| s.chapter.as_ref().and_then(|c| c.title.clone()))
        .collect();
    assert_eq!(titles, vec![Some("Chapter One".to_string()), Some("Chapter Two".to_string())]);
}
