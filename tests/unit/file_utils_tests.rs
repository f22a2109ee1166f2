/*!
 * Tests for file and document utilities
 */

use litrans::file_utils::{DocumentFormat, FileManager};

use crate::common;

#[test]
fn test_parseDocument_plainText_shouldProduceOneUntitledChapter() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::create_test_file(dir.path(), "book.txt", common::THREE_PARAGRAPHS).unwrap();

    let document = FileManager::parse_document(&path).unwrap();

    assert_eq!(document.format, DocumentFormat::PlainText);
    assert_eq!(document.chapters.len(), 1);
    assert!(!document.has_chapter_titles());
    assert_eq!(document.chapters[0].info.source_file.as_deref(), Some("book.txt"));
}

#[test]
fn test_parseDocument_markdown_shouldSplitAtHeadings() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::create_test_file(dir.path(), "book.md", common::TWO_CHAPTERS).unwrap();

    let document = FileManager::parse_document(&path).unwrap();

    assert!(document.has_chapter_titles());
    let titles: Vec<_> = document
        .chapters
        .iter()
        .map(|c| c.info.title.clone().unwrap_or_default())
        .collect();
    assert_eq!(titles, vec!["Chapter One", "Chapter Two"]);
    assert_eq!(document.chapters[1].text.trim(), "Allie wrote poems.");
}

#[test]
fn test_writeToFile_missingParent_shouldCreateIt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("out.txt");

    FileManager::write_to_file(&path, "content").unwrap();

    assert_eq!(FileManager::read_to_string(&path).unwrap(), "content");
    assert!(FileManager::dir_exists(dir.path().join("nested")));
}

#[test]
fn test_outputExtension_shouldKeepMarkdown() {
    assert_eq!(DocumentFormat::Markdown.output_extension(), "md");
    assert_eq!(DocumentFormat::PlainText.output_extension(), "txt");
}
