/*!
 * Job management for translation runs.
 *
 * This module provides:
 * - Job creation and tracking
 * - Resume capability for interrupted or failed jobs
 * - Checkpoint stores used by the orchestrator
 */

pub mod manager;
pub mod models;
pub mod store;

// Re-export main types
pub use manager::JobManager;
pub use models::{ActiveJob, JobCreateParams, JobInfo, ResumeResult};
pub use store::{CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore};
