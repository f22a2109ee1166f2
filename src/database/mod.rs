/*!
 * Database module for persistent storage of translation jobs.
 *
 * This module provides SQLite-based persistence for:
 * - Translation jobs with their core narrative style and status
 * - The latest checkpoint of each job (glossary and character styles)
 * - Committed segment translations, so interrupted jobs can be resumed
 */

pub mod schema;
pub mod connection;
pub mod repository;
pub mod models;

// Re-export main types
pub use connection::{DatabaseConnection, DatabaseStats};
pub use models::{JobRecord, JobStatus};
pub use repository::Repository;
