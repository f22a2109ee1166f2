/*!
 * Database entity models and DTOs.
 *
 * These structures map directly to database tables and provide
 * type-safe access to persisted data.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::translation::document::TranslatedSegment;
use crate::translation::state::{CharacterStyleMap, Glossary, JobCheckpoint};

/// Job status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is running or was interrupted and can be resumed
    InProgress,
    /// All segments translated and the output written
    Completed,
    /// Unrecoverable error; resumable from its last checkpoint
    Failed,
    /// Cancelled between segments; resumable
    Cancelled,
}

impl JobStatus {
    /// Whether a job in this status can be continued
    pub fn is_resumable(&self) -> bool {
        !matches!(self, JobStatus::Completed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::InProgress => write!(f, "in_progress"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in_progress" => Ok(JobStatus::InProgress),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(anyhow::anyhow!("Invalid job status: {}", s)),
        }
    }
}

/// Translation job record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job identifier (UUID)
    pub id: String,
    /// Path to the source document
    pub source_file_path: String,
    /// SHA256 hash of the source document for change detection
    pub source_file_hash: String,
    /// Source language code
    pub source_language: String,
    /// Target language code
    pub target_language: String,
    /// Translation provider used
    pub provider: String,
    /// Model used for translation
    pub model: String,
    /// Total number of segments
    pub total_segments: i64,
    /// Number of committed segments
    pub completed_segments: i64,
    /// Current job status
    pub status: JobStatus,
    /// Core narrative style, once defined
    pub core_style: Option<String>,
    /// Error summary of the last failure
    pub last_error: Option<String>,
    /// Output artifact, once written
    pub output_path: Option<String>,
    /// Creation timestamp (ISO 8601)
    pub created_at: String,
    /// Last update timestamp (ISO 8601)
    pub updated_at: String,
    /// Completion timestamp (ISO 8601), if completed
    pub completed_at: Option<String>,
}

impl JobRecord {
    /// Create a new job record
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        source_file_path: String,
        source_file_hash: String,
        source_language: String,
        target_language: String,
        provider: String,
        model: String,
        total_segments: i64,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            source_file_path,
            source_file_hash,
            source_language,
            target_language,
            provider,
            model,
            total_segments,
            completed_segments: 0,
            status: JobStatus::InProgress,
            core_style: None,
            last_error: None,
            output_path: None,
            created_at: now.clone(),
            updated_at: now,
            completed_at: None,
        }
    }

    /// Check if the job can be resumed
    pub fn is_resumable(&self) -> bool {
        self.status.is_resumable()
    }

    /// Calculate completion percentage
    pub fn completion_percentage(&self) -> f64 {
        if self.total_segments == 0 {
            return 0.0;
        }
        (self.completed_segments as f64 / self.total_segments as f64) * 100.0
    }
}

/// Latest checkpoint of a job, with the cumulative state as JSON
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointRecord {
    pub job_id: String,
    pub last_segment_index: i64,
    pub glossary_json: String,
    pub character_styles_json: String,
}

impl CheckpointRecord {
    /// Encode a checkpoint
    pub fn from_checkpoint(job_id: &str, checkpoint: &JobCheckpoint) -> serde_json::Result<Self> {
        Ok(Self {
            job_id: job_id.to_string(),
            last_segment_index: checkpoint.last_successful_segment_index as i64,
            glossary_json: serde_json::to_string(&checkpoint.glossary)?,
            character_styles_json: serde_json::to_string(&checkpoint.character_styles)?,
        })
    }

    /// Decode the checkpoint
    pub fn to_checkpoint(&self) -> serde_json::Result<JobCheckpoint> {
        let glossary: Glossary = serde_json::from_str(&self.glossary_json)?;
        let character_styles: CharacterStyleMap = serde_json::from_str(&self.character_styles_json)?;
        Ok(JobCheckpoint {
            last_successful_segment_index: self.last_segment_index.max(0) as usize,
            glossary,
            character_styles,
        })
    }
}

/// Committed translation of one segment, stored as JSON
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedSegmentRecord {
    pub job_id: String,
    pub segment_index: i64,
    pub payload_json: String,
}

impl TranslatedSegmentRecord {
    /// Encode a translated segment
    pub fn from_segment(job_id: &str, segment: &TranslatedSegment) -> serde_json::Result<Self> {
        Ok(Self {
            job_id: job_id.to_string(),
            segment_index: segment.index as i64,
            payload_json: serde_json::to_string(segment)?,
        })
    }

    /// Decode the translated segment
    pub fn to_segment(&self) -> serde_json::Result<TranslatedSegment> {
        serde_json::from_str(&self.payload_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::state::TranslationState;

    #[test]
    fn test_jobStatus_roundTripThroughString_shouldMatch() {
        for status in [
            JobStatus::InProgress,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(status.to_string().parse::<JobStatus>().unwrap(), status);
        }
        assert!("paused".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_jobRecord_new_shouldStartInProgress() {
        let job = JobRecord::new(
            "id".to_string(),
            "/book.txt".to_string(),
            "hash".to_string(),
            "en".to_string(),
            "ko".to_string(),
            "gemini".to_string(),
            "model".to_string(),
            4,
        );

        assert_eq!(job.status, JobStatus::InProgress);
        assert!(job.is_resumable());
        assert_eq!(job.completion_percentage(), 0.0);
    }

    #[test]
    fn test_checkpointRecord_decode_shouldRestoreState() {
        let mut styles = CharacterStyleMap::new();
        styles.set("Holden", "Phoebe", "반말");
        let state = TranslationState::new(Glossary::from_pairs([("Phoebe", "피비")]), styles);
        let checkpoint = JobCheckpoint::new(12, &state);

        let record = CheckpointRecord::from_checkpoint("job", &checkpoint).unwrap();

        assert_eq!(record.last_segment_index, 12);
        assert_eq!(record.to_checkpoint().unwrap(), checkpoint);
    }
}
