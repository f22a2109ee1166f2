/*!
 * Job manager for the translation job lifecycle.
 *
 * This module handles:
 * - Creating new translation jobs
 * - Resuming interrupted or failed jobs from their checkpoint
 * - Recording completion, failure and cancellation
 */

use anyhow::{Context, Result};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use uuid::Uuid;

use crate::database::models::{JobRecord, JobStatus};
use crate::database::repository::Repository;

use super::models::{ActiveJob, JobCreateParams, JobInfo, ResumeResult};
use super::store::SqliteCheckpointStore;

/// Job manager for handling translation job lifecycle
#[derive(Debug, Clone)]
pub struct JobManager {
    /// Repository for database operations
    repo: Repository,
}

impl JobManager {
    /// Create a new job manager with the given repository
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Create a new job manager with the default database
    pub fn new_default() -> Result<Self> {
        let repo = Repository::new_default()?;
        Ok(Self::new(repo))
    }

    /// Create a new job manager with an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let repo = Repository::new_in_memory()?;
        Ok(Self::new(repo))
    }

    /// Get the underlying repository
    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Checkpoint store writing to this manager's database
    pub fn checkpoint_store(&self) -> SqliteCheckpointStore {
        SqliteCheckpointStore::new(self.repo.clone())
    }

    // =========================================================================
    // Job Creation
    // =========================================================================

    /// Create a new translation job
    pub async fn create_job(&self, params: &JobCreateParams) -> Result<JobInfo> {
        let job_id = Uuid::new_v4().to_string();
        let file_hash = self.hash_file(&params.source_file_path).await?;

        info!(
            "Creating new job {} for {} ({} segments)",
            &job_id[..8],
            params.source_file_path.display(),
            params.total_segments
        );

        let record = JobRecord::new(
            job_id,
            params.source_file_path.to_string_lossy().to_string(),
            file_hash,
            params.source_language.clone(),
            params.target_language.clone(),
            params.provider.clone(),
            params.model.clone(),
            params.total_segments as i64,
        );

        self.repo.create_job(&record).await?;

        Ok(JobInfo::from_record(&record))
    }

    /// Resume the matching unfinished job or create a new one
    pub async fn resume_or_create(&self, params: &JobCreateParams) -> Result<ActiveJob> {
        match self.try_resume(params).await? {
            ResumeResult::Resumed { job, checkpoint } => {
                info!(
                    "Resuming job {} ({}/{} segments committed)",
                    job.short_id(),
                    job.completed_segments,
                    job.total_segments
                );
                self.repo.update_job_status(&job.id, JobStatus::InProgress, None).await?;
                Ok(ActiveJob { info: job, checkpoint })
            }
            ResumeResult::NotFound => {
                let info = self.create_job(params).await?;
                Ok(ActiveJob { info, checkpoint: None })
            }
            ResumeResult::SegmentationChanged { job, total_segments } => {
                warn!(
                    "Job {} was split into {} segments, the document now has {}; starting over",
                    job.short_id(),
                    job.total_segments,
                    total_segments
                );
                self.repo
                    .update_job_status(&job.id, JobStatus::Failed, Some("segmentation changed"))
                    .await?;

                let info = self.create_job(params).await?;
                Ok(ActiveJob { info, checkpoint: None })
            }
        }
    }

    /// Look for an unfinished job of the same document and settings
    pub async fn try_resume(&self, params: &JobCreateParams) -> Result<ResumeResult> {
        let current_hash = self.hash_file(&params.source_file_path).await?;

        let existing = self
            .repo
            .find_resumable_job(
                &current_hash,
                &params.source_language,
                &params.target_language,
                &params.provider,
                &params.model,
            )
            .await?;

        let Some(record) = existing else {
            return Ok(ResumeResult::NotFound);
        };

        let job = JobInfo::from_record(&record);
        if record.total_segments != params.total_segments as i64 {
            return Ok(ResumeResult::SegmentationChanged {
                job,
                total_segments: params.total_segments,
            });
        }

        let checkpoint = self
            .repo
            .get_checkpoint(&record.id)
            .await?
            .map(|c| c.to_checkpoint())
            .transpose()
            .context("Stored checkpoint is corrupt")?;

        debug!(
            "Found resumable job {} at checkpoint {:?}",
            job.short_id(),
            checkpoint.as_ref().map(|c| c.last_successful_segment_index)
        );

        Ok(ResumeResult::Resumed { job, checkpoint })
    }

    // =========================================================================
    // Job State Management
    // =========================================================================

    /// Get job by ID
    pub async fn get_job(&self, job_id: &str) -> Result<Option<JobInfo>> {
        let record = self.repo.get_job(job_id).await?;
        Ok(record.map(|r| JobInfo::from_record(&r)))
    }

    /// Mark job as completed with its output artifact
    pub async fn complete_job(&self, job_id: &str, output_path: &Path) -> Result<()> {
        info!("Completing job {}", &job_id[..8.min(job_id.len())]);
        self.repo
            .update_output_path(job_id, &output_path.to_string_lossy())
            .await?;
        self.repo.update_job_status(job_id, JobStatus::Completed, None).await
    }

    /// Mark job as failed, keeping its checkpoint for a later resume
    pub async fn fail_job(&self, job_id: &str, error: &str) -> Result<()> {
        warn!("Marking job {} as failed", &job_id[..8.min(job_id.len())]);
        self.repo.update_job_status(job_id, JobStatus::Failed, Some(error)).await
    }

    /// Mark job as cancelled
    pub async fn cancel_job(&self, job_id: &str) -> Result<()> {
        info!("Cancelling job {}", &job_id[..8.min(job_id.len())]);
        self.repo.update_job_status(job_id, JobStatus::Cancelled, None).await
    }

    // =========================================================================
    // Job Listing and Cleanup
    // =========================================================================

    /// List all jobs
    pub async fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<JobInfo>> {
        let records = self.repo.list_jobs(status).await?;
        Ok(records.iter().map(JobInfo::from_record).collect())
    }

    /// Delete a job
    pub async fn delete_job(&self, job_id: &str) -> Result<()> {
        info!("Deleting job {}", job_id);
        self.repo.delete_job(job_id).await
    }

    // =========================================================================
    // Utility Methods
    // =========================================================================

    /// Compute SHA256 hash of a file
    async fn hash_file(&self, path: &Path) -> Result<String> {
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let mut file = std::fs::File::open(&path)
                .with_context(|| format!("Failed to open file for hashing: {:?}", path))?;

            let mut hasher = Sha256::new();
            let mut buffer = [0u8; 8192];

            loop {
                let bytes_read = file.read(&mut buffer)?;
                if bytes_read == 0 {
                    break;
                }
                hasher.update(&buffer[..bytes_read]);
            }

            Ok(format!("{:x}", hasher.finalize()))
        })
        .await
        .context("File hashing task panicked")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::store::CheckpointStore;
    use crate::translation::document::TranslatedSegment;
    use crate::translation::state::{Glossary, JobCheckpoint, TranslationState};
    use std::io::Write;
    use tempfile::NamedTempFile;

    async fn create_test_manager() -> JobManager {
        JobManager::new_in_memory().expect("Failed to create test job manager")
    }

    fn create_temp_file_with_content(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    fn params(file: &NamedTempFile, total_segments: usize) -> JobCreateParams {
        JobCreateParams::new(file.path().to_path_buf(), "en", "ko", "gemini", "gemini-2.5-pro", total_segments)
    }

    #[tokio::test]
    async fn test_resumeOrCreate_withNoExisting_shouldCreateNew() {
        let manager = create_test_manager().await;
        let file = create_temp_file_with_content("unique content 1");

        let job = manager.resume_or_create(&params(&file, 3)).await.unwrap();

        assert_eq!(job.info.total_segments, 3);
        assert!(!job.is_resumed());
    }

    #[tokio::test]
    async fn test_resumeOrCreate_afterCommittedSegment_shouldResumeFromCheckpoint() {
        let manager = create_test_manager().await;
        let file = create_temp_file_with_content("resume test content");

        let first = manager.resume_or_create(&params(&file, 3)).await.unwrap();
        let state = TranslationState::default().with_glossary(Glossary::from_pairs([("Phoebe", "피비")]));
        manager
            .checkpoint_store()
            .save(&first.info.id, &JobCheckpoint::new(0, &state), &TranslatedSegment::new(0, "영"))
            .await
            .unwrap();
        manager.fail_job(&first.info.id, "blocked").await.unwrap();

        let second = manager.resume_or_create(&params(&file, 3)).await.unwrap();

        assert_eq!(second.info.id, first.info.id);
        let checkpoint = second.checkpoint.expect("checkpoint not restored");
        assert_eq!(checkpoint.last_successful_segment_index, 0);
        assert_eq!(checkpoint.glossary.get("Phoebe"), Some("피비"));
        let stored = manager.get_job(&first.info.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::InProgress);
    }

    #[tokio::test]
    async fn test_resumeOrCreate_completedJob_shouldCreateNew() {
        let manager = create_test_manager().await;
        let file = create_temp_file_with_content("complete test");

        let first = manager.resume_or_create(&params(&file, 2)).await.unwrap();
        manager.complete_job(&first.info.id, Path::new("/out/book_ko.txt")).await.unwrap();

        let second = manager.resume_or_create(&params(&file, 2)).await.unwrap();

        assert_ne!(second.info.id, first.info.id);
        let completed = manager.get_job(&first.info.id).await.unwrap().unwrap();
        assert_eq!(completed.output_path.as_deref(), Some("/out/book_ko.txt"));
    }

    #[tokio::test]
    async fn test_resumeOrCreate_changedSegmentCount_shouldStartOver() {
        let manager = create_test_manager().await;
        let file = create_temp_file_with_content("split test");

        let first = manager.resume_or_create(&params(&file, 5)).await.unwrap();
        let second = manager.resume_or_create(&params(&file, 7)).await.unwrap();

        assert_ne!(second.info.id, first.info.id);
        let old = manager.get_job(&first.info.id).await.unwrap().unwrap();
        assert_eq!(old.status, JobStatus::Failed);
        assert_eq!(old.last_error.as_deref(), Some("segmentation changed"));
    }

    #[tokio::test]
    async fn test_listJobs_withStatusFilter_shouldReturnMatching() {
        let manager = create_test_manager().await;
        let file1 = create_temp_file_with_content("list test 1");
        let file2 = create_temp_file_with_content("list test 2");

        let job1 = manager.create_job(&params(&file1, 1)).await.unwrap();
        manager.create_job(&params(&file2, 1)).await.unwrap();
        manager.cancel_job(&job1.id).await.unwrap();

        assert_eq!(manager.list_jobs(None).await.unwrap().len(), 2);
        let cancelled = manager.list_jobs(Some(JobStatus::Cancelled)).await.unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id, job1.id);
    }

    #[tokio::test]
    async fn test_deleteJob_shouldRemoveJob() {
        let manager = create_test_manager().await;
        let file = create_temp_file_with_content("delete test");

        let job = manager.create_job(&params(&file, 1)).await.unwrap();
        manager.delete_job(&job.id).await.unwrap();

        assert!(manager.get_job(&job.id).await.unwrap().is_none());
    }
}
