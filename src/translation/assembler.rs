/*!
 * Output assembly.
 *
 * - `PlainTextAssembler` appends each segment to the output file as soon as
 *   it is committed, so a long job never holds the whole translation.
 * - `BufferedAssembler` keeps every segment until `finalize` and rebuilds the
 *   document in one write, adding chapter headings from segment metadata.
 *
 * Both reject out-of-order segments: output order is source order.
 */

use async_trait::async_trait;
use log::{debug, info};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::errors::TranslationError;
use crate::translation::document::{ChapterInfo, TranslatedSegment};

/// Separator written between translated segments
pub const SEGMENT_SEPARATOR: &str = "\n\n";

/// Sink for translated segments in source order
#[async_trait]
pub trait DocumentAssembler: Send + Debug {
    /// Add the next segment.
    async fn append(&mut self, segment: &TranslatedSegment) -> Result<(), TranslationError>;

    /// Complete the artifact and return its path.
    async fn finalize(&mut self) -> Result<PathBuf, TranslationError>;
}

fn check_order(expected: usize, segment: &TranslatedSegment) -> Result<(), TranslationError> {
    if segment.index != expected {
        return Err(TranslationError::DataIntegrity(format!(
            "assembler expected segment {} but received {}",
            expected, segment.index
        )));
    }
    Ok(())
}

/// Append-only plain text writer
#[derive(Debug)]
pub struct PlainTextAssembler {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    next_index: usize,
}

impl PlainTextAssembler {
    /// Create (or truncate) the output file.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, TranslationError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .await?;
        debug!("Plain text output opened at {}", path.display());

        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            next_index: 0,
        })
    }

    /// Output path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DocumentAssembler for PlainTextAssembler {
    async fn append(&mut self, segment: &TranslatedSegment) -> Result<(), TranslationError> {
        check_order(self.next_index, segment)?;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| TranslationError::DataIntegrity("assembler already finalized".to_string()))?;

        if self.next_index > 0 {
            writer.write_all(SEGMENT_SEPARATOR.as_bytes()).await?;
        }
        writer.write_all(segment.text.trim_end().as_bytes()).await?;
        writer.flush().await?;

        self.next_index += 1;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<PathBuf, TranslationError> {
        if let Some(mut writer) = self.writer.take() {
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            writer.into_inner().sync_all().await?;
        }
        info!("Wrote {} segments to {}", self.next_index, self.path.display());
        Ok(self.path.clone())
    }
}

/// Buffer-then-rebuild writer with chapter headings
#[derive(Debug)]
pub struct BufferedAssembler {
    path: PathBuf,
    segments: Vec<TranslatedSegment>,
}

impl BufferedAssembler {
    /// Create an assembler writing to `path` on finalize.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            segments: Vec::new(),
        }
    }

    /// Render the buffered document.
    pub fn render(&self) -> String {
        let mut output = String::new();
        let mut current_chapter: Option<&ChapterInfo> = None;

        for segment in &self.segments {
            if let Some(chapter) = &segment.chapter {
                if current_chapter != Some(chapter) {
                    if let Some(title) = &chapter.title {
                        if !output.is_empty() {
                            output.push_str(SEGMENT_SEPARATOR);
                        }
                        output.push_str("# ");
                        output.push_str(title);
                    }
                    current_chapter = Some(chapter);
                }
            }
            if !output.is_empty() {
                output.push_str(SEGMENT_SEPARATOR);
            }
            output.push_str(segment.text.trim_end());
        }

        output.push('\n');
        output
    }
}

#[async_trait]
impl DocumentAssembler for BufferedAssembler {
    async fn append(&mut self, segment: &TranslatedSegment) -> Result<(), TranslationError> {
        check_order(self.segments.len(), segment)?;
        self.segments.push(segment.clone());
        Ok(())
    }

    async fn finalize(&mut self) -> Result<PathBuf, TranslationError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, self.render()).await?;
        info!("Rebuilt {} segments into {}", self.segments.len(), self.path.display());
        Ok(self.path.clone())
    }
}
