/*!
 * Typed queries over the job database.
 *
 * Every public method runs its SQL on the blocking pool through
 * `DatabaseConnection`; callers never see rusqlite types.
 */

use anyhow::Result;
use log::debug;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::connection::DatabaseConnection;
use super::models::{CheckpointRecord, JobRecord, JobStatus, TranslatedSegmentRecord};

/// Columns of `jobs` in the order `job_from_row` reads them
const JOB_COLUMNS: &str = r#"
    id, source_file_path, source_file_hash, source_language, target_language,
    provider, model, total_segments, completed_segments, status,
    core_style, last_error, output_path, created_at, updated_at, completed_at
"#;

fn job_from_row(row: &Row) -> rusqlite::Result<JobRecord> {
    Ok(JobRecord {
        id: row.get(0)?,
        source_file_path: row.get(1)?,
        source_file_hash: row.get(2)?,
        source_language: row.get(3)?,
        target_language: row.get(4)?,
        provider: row.get(5)?,
        model: row.get(6)?,
        total_segments: row.get(7)?,
        completed_segments: row.get(8)?,
        status: row
            .get::<_, String>(9)?
            .parse()
            .unwrap_or(JobStatus::InProgress),
        core_style: row.get(10)?,
        last_error: row.get(11)?,
        output_path: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
        completed_at: row.get(15)?,
    })
}

/// Repository for database operations
#[derive(Debug, Clone)]
pub struct Repository {
    /// Database connection
    db: DatabaseConnection,
}

impl Repository {
    /// Create a new repository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a repository with the default database location
    pub fn new_default() -> Result<Self> {
        let db = DatabaseConnection::new_default()?;
        Ok(Self::new(db))
    }

    /// Create a repository with an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let db = DatabaseConnection::new_in_memory()?;
        Ok(Self::new(db))
    }

    /// Underlying connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    // =========================================================================
    // Job Operations
    // =========================================================================

    /// Create a new translation job
    pub async fn create_job(&self, job: &JobRecord) -> Result<()> {
        let job = job.clone();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO jobs (
                        id, source_file_path, source_file_hash, source_language, target_language,
                        provider, model, total_segments, completed_segments, status,
                        core_style, last_error, output_path, created_at, updated_at, completed_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                    "#,
                    params![
                        job.id,
                        job.source_file_path,
                        job.source_file_hash,
                        job.source_language,
                        job.target_language,
                        job.provider,
                        job.model,
                        job.total_segments,
                        job.completed_segments,
                        job.status.to_string(),
                        job.core_style,
                        job.last_error,
                        job.output_path,
                        job.created_at,
                        job.updated_at,
                        job.completed_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Get a job by ID
    pub async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let job_id = job_id.to_string();

        self.db
            .execute_async(move |conn| Self::get_job_sync(conn, &job_id))
            .await
    }

    fn get_job_sync(conn: &Connection, job_id: &str) -> Result<Option<JobRecord>> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS);
        Ok(conn.query_row(&sql, [job_id], job_from_row).optional()?)
    }

    /// Find the most recent unfinished job for the given document and settings
    pub async fn find_resumable_job(
        &self,
        source_file_hash: &str,
        source_language: &str,
        target_language: &str,
        provider: &str,
        model: &str,
    ) -> Result<Option<JobRecord>> {
        let source_file_hash = source_file_hash.to_string();
        let source_language = source_language.to_string();
        let target_language = target_language.to_string();
        let provider = provider.to_string();
        let model = model.to_string();

        self.db
            .execute_async(move |conn| {
                let sql = format!(
                    r#"
                    SELECT {} FROM jobs
                    WHERE source_file_hash = ?1
                      AND source_language = ?2
                      AND target_language = ?3
                      AND provider = ?4
                      AND model = ?5
                      AND status != 'completed'
                    ORDER BY updated_at DESC
                    LIMIT 1
                    "#,
                    JOB_COLUMNS
                );
                Ok(conn
                    .query_row(
                        &sql,
                        params![source_file_hash, source_language, target_language, provider, model],
                        job_from_row,
                    )
                    .optional()?)
            })
            .await
    }

    /// Update job status, recording the error summary of a failure
    pub async fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        last_error: Option<&str>,
    ) -> Result<()> {
        let job_id = job_id.to_string();
        let last_error = last_error.map(str::to_string);
        let now = chrono::Utc::now().to_rfc3339();

        self.db
            .execute_async(move |conn| {
                let completed_at = (status == JobStatus::Completed).then(|| now.clone());

                conn.execute(
                    r#"
                    UPDATE jobs
                    SET status = ?1, last_error = ?2, updated_at = ?3,
                        completed_at = COALESCE(?4, completed_at)
                    WHERE id = ?5
                    "#,
                    params![status.to_string(), last_error, now, completed_at, job_id],
                )?;
                Ok(())
            })
            .await
    }

    /// Record the output artifact of a job
    pub async fn update_output_path(&self, job_id: &str, output_path: &str) -> Result<()> {
        let job_id = job_id.to_string();
        let output_path = output_path.to_string();
        let now = chrono::Utc::now().to_rfc3339();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    "UPDATE jobs SET output_path = ?1, updated_at = ?2 WHERE id = ?3",
                    params![output_path, now, job_id],
                )?;
                Ok(())
            })
            .await
    }

    /// Store the core narrative style; returns the number of updated jobs
    pub async fn update_core_style(&self, job_id: &str, core_style: &str) -> Result<usize> {
        let job_id = job_id.to_string();
        let core_style = core_style.to_string();
        let now = chrono::Utc::now().to_rfc3339();

        self.db
            .execute_async(move |conn| {
                Ok(conn.execute(
                    "UPDATE jobs SET core_style = ?1, updated_at = ?2 WHERE id = ?3",
                    params![core_style, now, job_id],
                )?)
            })
            .await
    }

    /// List all jobs with optional status filter
    pub async fn list_jobs(&self, status_filter: Option<JobStatus>) -> Result<Vec<JobRecord>> {
        self.db
            .execute_async(move |conn| {
                let jobs: Vec<JobRecord> = if let Some(status) = status_filter {
                    let sql = format!(
                        "SELECT {} FROM jobs WHERE status = ?1 ORDER BY updated_at DESC",
                        JOB_COLUMNS
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map([status.to_string()], job_from_row)?
                        .filter_map(|r| r.ok())
                        .collect()
                } else {
                    let sql = format!("SELECT {} FROM jobs ORDER BY updated_at DESC", JOB_COLUMNS);
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map([], job_from_row)?.filter_map(|r| r.ok()).collect()
                };

                Ok(jobs)
            })
            .await
    }

    /// Delete a job with its checkpoint and committed segments
    pub async fn delete_job(&self, job_id: &str) -> Result<()> {
        let job_id = job_id.to_string();

        self.db
            .execute_async(move |conn| {
                // Due to CASCADE, deleting the job deletes its checkpoint and segments
                conn.execute("DELETE FROM jobs WHERE id = ?1", [&job_id])?;
                Ok(())
            })
            .await
    }

    // =========================================================================
    // Checkpoint Operations
    // =========================================================================

    /// Commit a segment: its translation, the new checkpoint and the job progress
    pub async fn save_checkpoint(
        &self,
        checkpoint: CheckpointRecord,
        segment: TranslatedSegmentRecord,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();

        self.db
            .transaction_async(move |tx| {
                tx.execute(
                    r#"
                    INSERT INTO translated_segments (job_id, segment_index, payload, created_at)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(job_id, segment_index) DO UPDATE SET payload = excluded.payload
                    "#,
                    params![segment.job_id, segment.segment_index, segment.payload_json, now],
                )?;

                tx.execute(
                    r#"
                    INSERT INTO checkpoints (job_id, last_segment_index, glossary, character_styles, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(job_id) DO UPDATE SET
                        last_segment_index = excluded.last_segment_index,
                        glossary = excluded.glossary,
                        character_styles = excluded.character_styles,
                        updated_at = excluded.updated_at
                    "#,
                    params![
                        checkpoint.job_id,
                        checkpoint.last_segment_index,
                        checkpoint.glossary_json,
                        checkpoint.character_styles_json,
                        now,
                    ],
                )?;

                tx.execute(
                    r#"
                    UPDATE jobs
                    SET completed_segments = (SELECT COUNT(*) FROM translated_segments WHERE job_id = ?1),
                        updated_at = ?2
                    WHERE id = ?1
                    "#,
                    params![checkpoint.job_id, now],
                )?;

                debug!(
                    "Committed segment {} of job {}",
                    checkpoint.last_segment_index, checkpoint.job_id
                );
                Ok(())
            })
            .await
    }

    /// Latest checkpoint of a job
    pub async fn get_checkpoint(&self, job_id: &str) -> Result<Option<CheckpointRecord>> {
        let job_id = job_id.to_string();

        self.db
            .execute_async(move |conn| {
                Ok(conn
                    .query_row(
                        r#"
                        SELECT job_id, last_segment_index, glossary, character_styles
                        FROM checkpoints WHERE job_id = ?1
                        "#,
                        [&job_id],
                        |row| {
                            Ok(CheckpointRecord {
                                job_id: row.get(0)?,
                                last_segment_index: row.get(1)?,
                                glossary_json: row.get(2)?,
                                character_styles_json: row.get(3)?,
                            })
                        },
                    )
                    .optional()?)
            })
            .await
    }

    /// Committed translations of a job, ordered by segment index
    pub async fn get_translated_segments(&self, job_id: &str) -> Result<Vec<TranslatedSegmentRecord>> {
        let job_id = job_id.to_string();

        self.db
            .execute_async(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT job_id, segment_index, payload
                    FROM translated_segments
                    WHERE job_id = ?1
                    ORDER BY segment_index
                    "#,
                )?;

                let segments = stmt
                    .query_map([&job_id], |row| {
                        Ok(TranslatedSegmentRecord {
                            job_id: row.get(0)?,
                            segment_index: row.get(1)?,
                            payload_json: row.get(2)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                Ok(segments)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::document::TranslatedSegment;
    use crate::translation::state::{Glossary, JobCheckpoint, TranslationState};

    async fn create_test_repo() -> Repository {
        Repository::new_in_memory().expect("Failed to create test repository")
    }

    fn job(id: &str, hash: &str) -> JobRecord {
        JobRecord::new(
            id.to_string(),
            "/books/catcher.txt".to_string(),
            hash.to_string(),
            "en".to_string(),
            "ko".to_string(),
            "gemini".to_string(),
            "gemini-2.5-pro".to_string(),
            3,
        )
    }

    async fn commit(repo: &Repository, job_id: &str, index: usize) {
        let state = TranslationState::default().with_glossary(Glossary::from_pairs([("Ackley", "애클리")]));
        let checkpoint = CheckpointRecord::from_checkpoint(job_id, &JobCheckpoint::new(index, &state)).unwrap();
        let segment =
            TranslatedSegmentRecord::from_segment(job_id, &TranslatedSegment::new(index, format!("번역 {}", index)))
                .unwrap();
        repo.save_checkpoint(checkpoint, segment).await.unwrap();
    }

    #[tokio::test]
    async fn test_createJob_shouldInsertJob() {
        let repo = create_test_repo().await;

        repo.create_job(&job("job-1", "hash")).await.unwrap();

        let stored = repo.get_job("job-1").await.unwrap().expect("job not found");
        assert_eq!(stored.source_file_hash, "hash");
        assert_eq!(stored.status, JobStatus::InProgress);
        assert_eq!(stored.total_segments, 3);
        assert!(repo.get_job("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_findResumableJob_shouldSkipCompletedJobs() {
        let repo = create_test_repo().await;
        repo.create_job(&job("done", "hash")).await.unwrap();
        repo.update_job_status("done", JobStatus::Completed, None).await.unwrap();
        repo.create_job(&job("failed", "hash")).await.unwrap();
        repo.update_job_status("failed", JobStatus::Failed, Some("blocked")).await.unwrap();

        let found = repo
            .find_resumable_job("hash", "en", "ko", "gemini", "gemini-2.5-pro")
            .await
            .unwrap()
            .expect("resumable job not found");

        assert_eq!(found.id, "failed");
        assert_eq!(found.last_error.as_deref(), Some("blocked"));
        assert!(repo
            .find_resumable_job("hash", "en", "ja", "gemini", "gemini-2.5-pro")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_saveCheckpoint_shouldAdvanceProgress() {
        let repo = create_test_repo().await;
        repo.create_job(&job("job-1", "hash")).await.unwrap();

        commit(&repo, "job-1", 0).await;
        commit(&repo, "job-1", 1).await;

        let checkpoint = repo.get_checkpoint("job-1").await.unwrap().unwrap();
        assert_eq!(checkpoint.last_segment_index, 1);
        let segments = repo.get_translated_segments("job-1").await.unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].to_segment().unwrap().text, "번역 1");
        let stored = repo.get_job("job-1").await.unwrap().unwrap();
        assert_eq!(stored.completed_segments, 2);
    }

    #[tokio::test]
    async fn test_saveCheckpoint_sameSegmentTwice_shouldNotDuplicate() {
        let repo = create_test_repo().await;
        repo.create_job(&job("job-1", "hash")).await.unwrap();

        commit(&repo, "job-1", 0).await;
        commit(&repo, "job-1", 0).await;

        assert_eq!(repo.get_translated_segments("job-1").await.unwrap().len(), 1);
        assert_eq!(repo.get_job("job-1").await.unwrap().unwrap().completed_segments, 1);
    }

    #[tokio::test]
    async fn test_updateJobStatus_completed_shouldSetCompletedAt() {
        let repo = create_test_repo().await;
        repo.create_job(&job("job-1", "hash")).await.unwrap();

        repo.update_output_path("job-1", "/books/catcher_ko.txt").await.unwrap();
        repo.update_job_status("job-1", JobStatus::Completed, None).await.unwrap();

        let stored = repo.get_job("job-1").await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert!(stored.completed_at.is_some());
        assert_eq!(stored.output_path.as_deref(), Some("/books/catcher_ko.txt"));
    }

    #[tokio::test]
    async fn test_deleteJob_shouldRemoveCheckpointAndSegments() {
        let repo = create_test_repo().await;
        repo.create_job(&job("job-1", "hash")).await.unwrap();
        commit(&repo, "job-1", 0).await;

        repo.delete_job("job-1").await.unwrap();

        assert!(repo.get_checkpoint("job-1").await.unwrap().is_none());
        assert!(repo.get_translated_segments("job-1").await.unwrap().is_empty());
        assert!(repo.list_jobs(None).await.unwrap().is_empty());
    }
}
