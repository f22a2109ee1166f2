/*!
 * SQLite schema for jobs, checkpoints and committed segment translations.
 *
 * The schema version lives in `PRAGMA user_version`; 0 means a fresh file.
 */

use anyhow::{Result, anyhow};
use log::{debug, info};
use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    source_file_path TEXT NOT NULL,
    source_file_hash TEXT NOT NULL,
    source_language TEXT NOT NULL,
    target_language TEXT NOT NULL,
    provider TEXT NOT NULL,
    model TEXT NOT NULL,
    total_segments INTEGER NOT NULL,
    completed_segments INTEGER DEFAULT 0,
    status TEXT DEFAULT 'in_progress',
    core_style TEXT,
    last_error TEXT,
    output_path TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    completed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
CREATE INDEX IF NOT EXISTS idx_jobs_source_hash ON jobs(source_file_hash);

-- latest checkpoint, one row per job
CREATE TABLE IF NOT EXISTS checkpoints (
    job_id TEXT PRIMARY KEY REFERENCES jobs(id) ON DELETE CASCADE,
    last_segment_index INTEGER NOT NULL,
    glossary TEXT NOT NULL,
    character_styles TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS translated_segments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    segment_index INTEGER NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(job_id, segment_index)
);
CREATE INDEX IF NOT EXISTS idx_translated_segments_job ON translated_segments(job_id);
"#;

/// Prepare a freshly opened connection: pragmas, then tables when missing
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    // Foreign keys are a per-connection setting
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;

    match user_version(conn)? {
        0 => {
            info!("Creating job database schema v{}", SCHEMA_VERSION);
            // WAL keeps a committed checkpoint durable if the process dies mid-job
            let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            debug!("Journal mode: {}", mode);
            conn.execute_batch(&format!(
                "BEGIN;\n{}\nPRAGMA user_version = {};\nCOMMIT;",
                SCHEMA_V1, SCHEMA_VERSION
            ))?;
        }
        SCHEMA_VERSION => debug!("Job database schema is up to date (v{})", SCHEMA_VERSION),
        newer => {
            return Err(anyhow!(
                "Job database has schema v{}, this build only knows v{}",
                newer,
                SCHEMA_VERSION
            ));
        }
    }

    Ok(())
}

fn user_version(conn: &Connection) -> Result<i32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_connection() -> Connection {
        Connection::open_in_memory().expect("Failed to create in-memory database")
    }

    #[test]
    fn test_initializeSchema_withFreshDatabase_shouldCreateAllTables() {
        let conn = create_test_connection();

        initialize_schema(&conn).expect("Failed to initialize schema");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for table in ["jobs", "checkpoints", "translated_segments"] {
            assert!(tables.contains(&table.to_string()), "missing table {}", table);
        }
        assert_eq!(user_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_initializeSchema_calledTwice_shouldBeIdempotent() {
        let conn = create_test_connection();

        initialize_schema(&conn).expect("First initialization failed");
        initialize_schema(&conn).expect("Second initialization failed");

        assert_eq!(user_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_initializeSchema_newerVersion_shouldRefuse() {
        let conn = create_test_connection();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1).unwrap();

        assert!(initialize_schema(&conn).is_err());
    }

    #[test]
    fn test_foreignKeys_shouldRejectCheckpointOfUnknownJob() {
        let conn = create_test_connection();
        initialize_schema(&conn).expect("Failed to initialize schema");

        let result = conn.execute(
            "INSERT INTO checkpoints (job_id, last_segment_index, glossary, character_styles, updated_at)
             VALUES ('nonexistent-job', 0, '{}', '{}', datetime('now'))",
            [],
        );

        assert!(result.is_err(), "Foreign key constraint should prevent insert");
    }
}
