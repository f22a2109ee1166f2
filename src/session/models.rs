/*!
 * Job-specific models and DTOs.
 *
 * These structures provide a higher-level abstraction over the raw
 * database records for job management operations.
 */

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::database::models::{JobRecord, JobStatus};
use crate::translation::state::JobCheckpoint;

/// Parameters for creating a new job
#[derive(Debug, Clone)]
pub struct JobCreateParams {
    /// Path to the source document
    pub source_file_path: PathBuf,
    /// Source language code
    pub source_language: String,
    /// Target language code
    pub target_language: String,
    /// Translation provider name
    pub provider: String,
    /// Model name
    pub model: String,
    /// Number of segments the document was split into
    pub total_segments: usize,
}

impl JobCreateParams {
    /// Create new job parameters
    pub fn new(
        source_file_path: PathBuf,
        source_language: &str,
        target_language: &str,
        provider: &str,
        model: &str,
        total_segments: usize,
    ) -> Self {
        Self {
            source_file_path,
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            total_segments,
        }
    }
}

/// High-level job information for display and tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    /// Job ID
    pub id: String,
    /// Source document path
    pub source_file_path: String,
    /// Source language
    pub source_language: String,
    /// Target language
    pub target_language: String,
    /// Provider used
    pub provider: String,
    /// Model used
    pub model: String,
    /// Total segments to translate
    pub total_segments: i64,
    /// Committed segments
    pub completed_segments: i64,
    /// Job status
    pub status: JobStatus,
    /// Error summary of the last failure
    pub last_error: Option<String>,
    /// Output artifact, once written
    pub output_path: Option<String>,
    /// Last update time
    pub updated_at: String,
}

impl JobInfo {
    /// Create from a job record
    pub fn from_record(record: &JobRecord) -> Self {
        Self {
            id: record.id.clone(),
            source_file_path: record.source_file_path.clone(),
            source_language: record.source_language.clone(),
            target_language: record.target_language.clone(),
            provider: record.provider.clone(),
            model: record.model.clone(),
            total_segments: record.total_segments,
            completed_segments: record.completed_segments,
            status: record.status,
            last_error: record.last_error.clone(),
            output_path: record.output_path.clone(),
            updated_at: record.updated_at.clone(),
        }
    }

    /// Calculate completion percentage
    pub fn completion_percentage(&self) -> f64 {
        if self.total_segments == 0 {
            return 0.0;
        }
        (self.completed_segments as f64 / self.total_segments as f64) * 100.0
    }

    /// Check if the job is resumable
    pub fn is_resumable(&self) -> bool {
        self.status.is_resumable()
    }

    /// First eight characters of the ID, for log lines
    pub fn short_id(&self) -> &str {
        &self.id[..8.min(self.id.len())]
    }

    /// Get a human-readable status string
    pub fn status_display(&self) -> &'static str {
        match self.status {
            JobStatus::InProgress => "In Progress",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
            JobStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for JobInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} {} -> {} ({}/{} segments, {:.1}%, {})",
            self.short_id(),
            self.source_file_path,
            self.source_language,
            self.target_language,
            self.completed_segments,
            self.total_segments,
            self.completion_percentage(),
            self.status_display()
        )
    }
}

/// Result of looking for a job to resume
#[derive(Debug)]
pub enum ResumeResult {
    /// An unfinished job for the same document and settings was found
    Resumed {
        /// The job info
        job: JobInfo,
        /// Its latest checkpoint; `None` when no segment was committed yet
        checkpoint: Option<JobCheckpoint>,
    },
    /// No matching job found, need to create new
    NotFound,
    /// The document now splits into a different number of segments
    SegmentationChanged {
        /// The existing job info
        job: JobInfo,
        /// Segment count of the current split
        total_segments: usize,
    },
}

impl ResumeResult {
    /// Get the job info if available
    pub fn job_info(&self) -> Option<&JobInfo> {
        match self {
            ResumeResult::Resumed { job, .. } => Some(job),
            ResumeResult::SegmentationChanged { job, .. } => Some(job),
            ResumeResult::NotFound => None,
        }
    }
}

/// A job ready to run, either fresh or resumed
#[derive(Debug, Clone)]
pub struct ActiveJob {
    /// The job info
    pub info: JobInfo,
    /// Checkpoint to resume from
    pub checkpoint: Option<JobCheckpoint>,
}

impl ActiveJob {
    /// Whether segments were already committed by an earlier run
    pub fn is_resumed(&self) -> bool {
        self.checkpoint.is_some()
    }
}
