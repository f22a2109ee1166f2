/*!
 * Checkpoint stores.
 *
 * A checkpoint is written after every committed segment and holds the
 * segment index plus the cumulative glossary and character styles. The
 * committed translation is stored alongside so a resumed job can rebuild
 * its output without calling the model for finished segments.
 */

use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::database::Repository;
use crate::database::models::{CheckpointRecord, TranslatedSegmentRecord};
use crate::errors::TranslationError;
use crate::translation::document::TranslatedSegment;
use crate::translation::state::JobCheckpoint;

/// Durable per-job progress
#[async_trait]
pub trait CheckpointStore: Send + Sync + Debug {
    /// Persist the checkpoint for a committed segment together with its translation.
    async fn save(
        &self,
        job_id: &str,
        checkpoint: &JobCheckpoint,
        segment: &TranslatedSegment,
    ) -> Result<(), TranslationError>;

    /// Latest checkpoint of a job, if any segment was committed.
    async fn load(&self, job_id: &str) -> Result<Option<JobCheckpoint>, TranslationError>;

    /// Committed translations of a job in index order.
    async fn load_segments(&self, job_id: &str) -> Result<Vec<TranslatedSegment>, TranslationError>;

    /// Persist the job's core narrative style.
    async fn save_core_style(&self, job_id: &str, core_style: &str) -> Result<(), TranslationError>;

    /// Core narrative style saved for a job.
    async fn load_core_style(&self, job_id: &str) -> Result<Option<String>, TranslationError>;
}

fn persistence_error(context: &str, error: impl std::fmt::Display) -> TranslationError {
    TranslationError::Persistence(format!("{}: {}", context, error))
}

#[derive(Debug, Default, Clone)]
struct StoredJob {
    checkpoint: Option<JobCheckpoint>,
    segments: Vec<TranslatedSegment>,
    core_style: Option<String>,
}

/// In-process store, for tests and one-shot runs without a database
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    jobs: Arc<Mutex<HashMap<String, StoredJob>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryCheckpointStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail with a persistence error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of checkpoints written for a job.
    pub fn saved_segment_count(&self, job_id: &str) -> usize {
        self.jobs.lock().get(job_id).map(|job| job.segments.len()).unwrap_or(0)
    }

    fn check_writable(&self) -> Result<(), TranslationError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TranslationError::Persistence("checkpoint store is read-only".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(
        &self,
        job_id: &str,
        checkpoint: &JobCheckpoint,
        segment: &TranslatedSegment,
    ) -> Result<(), TranslationError> {
        self.check_writable()?;
        let mut jobs = self.jobs.lock();
        let job = jobs.entry(job_id.to_string()).or_default();
        job.segments.retain(|stored| stored.index != segment.index);
        job.segments.push(segment.clone());
        job.segments.sort_by_key(|stored| stored.index);
        job.checkpoint = Some(checkpoint.clone());
        Ok(())
    }

    async fn load(&self, job_id: &str) -> Result<Option<JobCheckpoint>, TranslationError> {
        Ok(self.jobs.lock().get(job_id).and_then(|job| job.checkpoint.clone()))
    }

    async fn load_segments(&self, job_id: &str) -> Result<Vec<TranslatedSegment>, TranslationError> {
        Ok(self
            .jobs
            .lock()
            .get(job_id)
            .map(|job| job.segments.clone())
            .unwrap_or_default())
    }

    async fn save_core_style(&self, job_id: &str, core_style: &str) -> Result<(), TranslationError> {
        self.check_writable()?;
        self.jobs.lock().entry(job_id.to_string()).or_default().core_style = Some(core_style.to_string());
        Ok(())
    }

    async fn load_core_style(&self, job_id: &str) -> Result<Option<String>, TranslationError> {
        Ok(self.jobs.lock().get(job_id).and_then(|job| job.core_style.clone()))
    }
}

/// SQLite-backed store; jobs must be registered through the `JobManager` first
#[derive(Debug, Clone)]
pub struct SqliteCheckpointStore {
    repo: Repository,
}

impl SqliteCheckpointStore {
    /// Create a store over a repository.
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(
        &self,
        job_id: &str,
        checkpoint: &JobCheckpoint,
        segment: &TranslatedSegment,
    ) -> Result<(), TranslationError> {
        let checkpoint_record = CheckpointRecord::from_checkpoint(job_id, checkpoint)
            .map_err(|e| persistence_error("cannot encode checkpoint", e))?;
        let segment_record = TranslatedSegmentRecord::from_segment(job_id, segment)
            .map_err(|e| persistence_error("cannot encode segment", e))?;

        self.repo
            .save_checkpoint(checkpoint_record, segment_record)
            .await
            .map_err(|e| persistence_error("checkpoint write failed", e))?;

        debug!(
            "Checkpoint saved for job {} at segment {}",
            job_id, checkpoint.last_successful_segment_index
        );
        Ok(())
    }

    async fn load(&self, job_id: &str) -> Result<Option<JobCheckpoint>, TranslationError> {
        let record = self
            .repo
            .get_checkpoint(job_id)
            .await
            .map_err(|e| persistence_error("checkpoint read failed", e))?;

        record
            .map(|record| record.to_checkpoint())
            .transpose()
            .map_err(|e| persistence_error("cannot decode checkpoint", e))
    }

    async fn load_segments(&self, job_id: &str) -> Result<Vec<TranslatedSegment>, TranslationError> {
        let records = self
            .repo
            .get_translated_segments(job_id)
            .await
            .map_err(|e| persistence_error("segment read failed", e))?;

        records
            .iter()
            .map(|record| record.to_segment())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| persistence_error("cannot decode segment", e))
    }

    async fn save_core_style(&self, job_id: &str, core_style: &str) -> Result<(), TranslationError> {
        let updated = self
            .repo
            .update_core_style(job_id, core_style)
            .await
            .map_err(|e| persistence_error("core style write failed", e))?;
        if updated == 0 {
            return Err(TranslationError::JobNotFound(job_id.to_string()));
        }
        Ok(())
    }

    async fn load_core_style(&self, job_id: &str) -> Result<Option<String>, TranslationError> {
        let job = self
            .repo
            .get_job(job_id)
            .await
            .map_err(|e| persistence_error("job read failed", e))?;
        Ok(job.and_then(|job| job.core_style))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::JobRecord;
    use crate::translation::state::{Glossary, TranslationState};

    fn checkpoint(index: usize) -> JobCheckpoint {
        let state = TranslationState::default().with_glossary(Glossary::from_pairs([("Stradlater", "스트라드레이터")]));
        JobCheckpoint::new(index, &state)
    }

    #[tokio::test]
    async fn test_memoryStore_saveThenLoad_shouldReturnLatest() {
        let store = MemoryCheckpointStore::new();

        store.save("job", &checkpoint(0), &TranslatedSegment::new(0, "영")).await.unwrap();
        store.save("job", &checkpoint(1), &TranslatedSegment::new(1, "일")).await.unwrap();

        assert_eq!(store.load("job").await.unwrap(), Some(checkpoint(1)));
        assert_eq!(store.load_segments("job").await.unwrap().len(), 2);
        assert_eq!(store.load("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memoryStore_failingWrites_shouldReturnPersistenceError() {
        let store = MemoryCheckpointStore::new();
        store.set_fail_writes(true);

        let result = store.save("job", &checkpoint(0), &TranslatedSegment::new(0, "영")).await;

        assert!(matches!(result, Err(TranslationError::Persistence(_))));
    }

    #[tokio::test]
    async fn test_sqliteStore_roundTripThroughDatabase_shouldRestoreState() {
        let repo = Repository::new_in_memory().unwrap();
        repo.create_job(&JobRecord::new(
            "job-1".to_string(),
            "/books/catcher.txt".to_string(),
            "hash".to_string(),
            "en".to_string(),
            "ko".to_string(),
            "gemini".to_string(),
            "gemini-2.5-pro".to_string(),
            3,
        ))
        .await
        .unwrap();
        let store = SqliteCheckpointStore::new(repo);

        let mut degraded = TranslatedSegment::new(1, "일");
        degraded.degraded = true;
        store.save("job-1", &checkpoint(0), &TranslatedSegment::new(0, "영")).await.unwrap();
        store.save("job-1", &checkpoint(1), &degraded).await.unwrap();
        store.save_core_style("job-1", "deadpan").await.unwrap();

        assert_eq!(store.load("job-1").await.unwrap(), Some(checkpoint(1)));
        let segments = store.load_segments("job-1").await.unwrap();
        assert_eq!(segments.iter().map(|s| s.index).collect::<Vec<_>>(), vec![0, 1]);
        assert!(segments[1].degraded);
        assert_eq!(store.load_core_style("job-1").await.unwrap().as_deref(), Some("deadpan"));
    }

    #[tokio::test]
    async fn test_sqliteStore_unknownJob_shouldFail() {
        let store = SqliteCheckpointStore::new(Repository::new_in_memory().unwrap());

        assert!(matches!(
            store.save_core_style("missing", "style").await,
            Err(TranslationError::JobNotFound(_))
        ));
        assert!(store.save("missing", &checkpoint(0), &TranslatedSegment::new(0, "영")).await.is_err());
    }
}
