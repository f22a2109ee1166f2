use anyhow::{Result, Context, anyhow};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

use crate::translation::document::ChapterInfo;
use crate::translation::segmenter::ChapterText;

// @module: File and directory utilities

/// Level-one Markdown heading that opens a chapter
static CHAPTER_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#[ \t]+(.+?)[ \t]*#*[ \t]*$").expect("chapter heading pattern is valid"));

/// Source document format, detected from the extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Plain UTF-8 text
    PlainText,
    /// Markdown; `# ` headings split chapters
    Markdown,
    /// EPUB container
    Epub,
    /// Word document
    Docx,
    /// PDF
    Pdf,
    /// Anything else
    Unknown,
}

impl DocumentFormat {
    /// Whether documents of this format can be translated
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::PlainText | Self::Markdown)
    }

    /// Extension used for the translated output
    pub fn output_extension(&self) -> &'static str {
        match self {
            Self::Markdown => "md",
            _ => "txt",
        }
    }
}

/// A source document split into chapters
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// Detected format
    pub format: DocumentFormat,
    /// Chapters in reading order; plain text is a single untitled chapter
    pub chapters: Vec<ChapterText>,
}

impl ParsedDocument {
    /// Whether any chapter carries a title
    pub fn has_chapter_titles(&self) -> bool {
        self.chapters.iter().any(|c| c.info.title.is_some())
    }

    /// All chapter texts as one, separated by blank lines
    pub fn joined_text(&self) -> String {
        self.chapters
            .iter()
            .map(|chapter| chapter.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_file()
    }

    // @checks: Directory existence
    pub fn dir_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_dir()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        Ok(())
    }

    // @generates: Output path for a translated document
    // @params: input_file, output_dir, target_language, extension
    pub fn generate_output_path<P1: AsRef<Path>, P2: AsRef<Path>>(
        input_file: P1,
        output_dir: P2,
        target_language: &str,
        extension: &str,
    ) -> PathBuf {
        let input_file = input_file.as_ref();
        let output_dir = output_dir.as_ref();

        // Get the file stem (filename without extension)
        let stem = input_file.file_stem().unwrap_or_default();

        let mut output_filename = stem.to_string_lossy().to_string();
        output_filename.push('.');
        output_filename.push_str(target_language);
        output_filename.push('.');
        output_filename.push_str(extension);

        output_dir.join(output_filename)
    }

    /// Whether `path` looks like an output written for `target_language`
    pub fn is_translation_output<P: AsRef<Path>>(path: P, target_language: &str) -> bool {
        path.as_ref()
            .file_stem()
            .map(|stem| stem.to_string_lossy().ends_with(&format!(".{}", target_language)))
            .unwrap_or(false)
    }

    /// Find translatable documents in a directory, skipping earlier outputs
    pub fn find_documents<P: AsRef<Path>>(dir: P, target_language: &str) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();

        for entry in WalkDir::new(dir.as_ref()).follow_links(true).sort_by_file_name() {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            if path.is_file()
                && Self::detect_format(path).is_supported()
                && !Self::is_translation_output(path, target_language)
            {
                result.push(path.to_path_buf());
            }
        }

        Ok(result)
    }

    /// Read a file to a string
    pub fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String> {
        fs::read_to_string(&path)
            .with_context(|| format!("Failed to read file: {:?}", path.as_ref()))
    }

    /// Write a string to a file
    pub fn write_to_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        // Ensure the parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            Self::ensure_dir(parent)?;
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write to file: {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Detect the document format from the file extension
    pub fn detect_format<P: AsRef<Path>>(path: P) -> DocumentFormat {
        let ext = path
            .as_ref()
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "txt" | "text" => DocumentFormat::PlainText,
            "md" | "markdown" => DocumentFormat::Markdown,
            "epub" => DocumentFormat::Epub,
            "docx" => DocumentFormat::Docx,
            "pdf" => DocumentFormat::Pdf,
            _ => DocumentFormat::Unknown,
        }
    }

    /// Read a document and split it into chapters
    pub fn parse_document<P: AsRef<Path>>(path: P) -> Result<ParsedDocument> {
        let path = path.as_ref();
        let format = Self::detect_format(path);
        if !format.is_supported() {
            return Err(anyhow!("Unsupported document format {:?}: {:?}", format, path));
        }

        let text = Self::read_to_string(path)?;
        let source_file = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        let chapters = match format {
            DocumentFormat::Markdown => split_markdown_chapters(&text, &source_file),
            _ => vec![ChapterText {
                info: ChapterInfo::default().with_source_file(&source_file),
                text,
            }],
        };

        Ok(ParsedDocument { format, chapters })
    }
}

/// Split Markdown at level-one headings; text before the first heading is an untitled chapter
fn split_markdown_chapters(text: &str, source_file: &str) -> Vec<ChapterText> {
    let mut chapters = Vec::new();
    let mut title: Option<String> = None;
    let mut body_start = 0;

    let mut push = |title: Option<String>, body: &str| {
        if title.is_none() && body.trim().is_empty() {
            return;
        }
        let info = ChapterInfo {
            title,
            source_file: Some(source_file.to_string()),
        };
        chapters.push(ChapterText { info, text: body.to_string() });
    };

    for captures in CHAPTER_HEADING.captures_iter(text) {
        let (Some(heading), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        push(title.take(), &text[body_start..heading.start()]);
        title = Some(name.as_str().to_string());
        body_start = heading.end();
    }
    push(title, &text[body_start..]);

    chapters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detectFormat_shouldUseExtension() {
        assert_eq!(FileManager::detect_format("book.TXT"), DocumentFormat::PlainText);
        assert_eq!(FileManager::detect_format("book.md"), DocumentFormat::Markdown);
        assert_eq!(FileManager::detect_format("book.epub"), DocumentFormat::Epub);
        assert!(!DocumentFormat::Pdf.is_supported());
    }

    #[test]
    fn test_generateOutputPath_shouldInsertLanguage() {
        let path = FileManager::generate_output_path("/books/catcher.txt", "/out", "ko", "txt");
        assert_eq!(path, PathBuf::from("/out/catcher.ko.txt"));
        assert!(FileManager::is_translation_output(&path, "ko"));
        assert!(!FileManager::is_translation_output("/books/catcher.txt", "ko"));
    }

    #[test]
    fn test_splitMarkdownChapters_shouldTitleEachChapter() {
        let text = "Preface text.\n\n# Chapter One\n\nIf you really want to hear about it.\n\n# Chapter Two #\n\nWhere I want to start.\n";

        let chapters = split_markdown_chapters(text, "catcher.md");

        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].info.title, None);
        assert_eq!(chapters[1].info.title.as_deref(), Some("Chapter One"));
        assert_eq!(chapters[2].info.title.as_deref(), Some("Chapter Two"));
        assert!(chapters[2].text.contains("Where I want to start."));
        assert_eq!(chapters[1].info.source_file.as_deref(), Some("catcher.md"));
    }

    #[test]
    fn test_joinedText_shouldSeparateChaptersWithBlankLine() {
        let document = ParsedDocument {
            format: DocumentFormat::Markdown,
            chapters: split_markdown_chapters("# One\n\nFirst.\n\n# Two\n\nSecond.", "book.md"),
        };

        let joined = document.joined_text();

        assert!(joined.contains("First.\n\n"));
        assert!(joined.trim_end().ends_with("Second."));
        assert!(document.has_chapter_titles());
    }

    #[test]
    fn test_parseDocument_unsupportedFormat_shouldFail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        fs::write(&path, "not really an epub").unwrap();

        assert!(FileManager::parse_document(&path).is_err());
    }

    #[test]
    fn test_findDocuments_shouldSkipOutputsAndUnsupported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("a.ko.txt"), "가").unwrap();
        fs::write(dir.path().join("b.md"), "b").unwrap();
        fs::write(dir.path().join("c.pdf"), "c").unwrap();

        let found = FileManager::find_documents(dir.path(), "ko").unwrap();

        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.md"]);
    }
}
