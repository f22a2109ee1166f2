/*!
 * SQLite connection shared by the job repository.
 *
 * rusqlite is synchronous, so every query runs on tokio's blocking pool
 * while holding the connection lock.
 */

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use parking_lot::Mutex;
use rusqlite::{Connection, Transaction};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::schema;

/// Application directory and file name under the user's data directory
const DEFAULT_DB_LOCATION: (&str, &str) = ("litrans", "jobs.db");

const IN_MEMORY: &str = ":memory:";

/// Cloneable handle to one SQLite connection
#[derive(Debug, Clone)]
pub struct DatabaseConnection {
    db_path: PathBuf,
    connection: Arc<Mutex<Connection>>,
}

impl DatabaseConnection {
    /// Open the database under the user's local data directory
    pub fn new_default() -> Result<Self> {
        Self::new(Self::default_database_path()?)
    }

    /// Open (or create) the database file at `db_path`
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
        }

        info!("Job database: {}", db_path.display());
        let conn = Connection::open(&db_path).with_context(|| format!("Failed to open database: {:?}", db_path))?;
        Self::from_connection(conn, db_path)
    }

    /// Private in-memory database, gone when the last handle drops
    pub fn new_in_memory() -> Result<Self> {
        debug!("Opening in-memory job database");
        let conn = Connection::open_in_memory().context("Failed to create in-memory database")?;
        Self::from_connection(conn, PathBuf::from(IN_MEMORY))
    }

    fn from_connection(conn: Connection, db_path: PathBuf) -> Result<Self> {
        schema::initialize_schema(&conn)?;
        Ok(Self {
            db_path,
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    /// `<data dir>/litrans/jobs.db`
    pub fn default_database_path() -> Result<PathBuf> {
        let base_dir = dirs::data_local_dir()
            .or_else(dirs::data_dir)
            .ok_or_else(|| anyhow!("Could not determine the user data directory"))?;
        let (dir, file) = DEFAULT_DB_LOCATION;
        Ok(base_dir.join(dir).join(file))
    }

    /// Database file path, `:memory:` for in-memory databases
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Run `f` with the connection on the blocking pool
    pub async fn execute_async<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.connection.clone();
        tokio::task::spawn_blocking(move || f(&conn.lock()))
            .await
            .context("Database task panicked")?
    }

    /// Run `f` inside a transaction, committing when it returns `Ok`
    pub async fn transaction_async<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.connection.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            let tx = conn.transaction()?;
            let result = f(&tx)?;
            tx.commit()?;
            Ok(result)
        })
        .await
        .context("Database transaction task panicked")?
    }

    /// Row counts and file size
    pub async fn stats(&self) -> Result<DatabaseStats> {
        let file_size_bytes = if self.db_path.as_os_str() == IN_MEMORY {
            0
        } else {
            tokio::fs::metadata(&self.db_path).await.map(|m| m.len()).unwrap_or(0)
        };

        self.execute_async(move |conn| {
            let count = |table: &str| -> Result<i64> {
                Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?)
            };
            Ok(DatabaseStats {
                job_count: count("jobs")?,
                checkpoint_count: count("checkpoints")?,
                translated_segments: count("translated_segments")?,
                file_size_bytes,
            })
        })
        .await
    }
}

/// Database statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Number of translation jobs
    pub job_count: i64,
    /// Number of jobs with a checkpoint
    pub checkpoint_count: i64,
    /// Number of committed segment translations
    pub translated_segments: i64,
    /// Database file size in bytes
    pub file_size_bytes: u64,
}

impl std::fmt::Display for DatabaseStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} jobs, {} with checkpoints, {} committed segments, {} KB",
            self.job_count,
            self.checkpoint_count,
            self.translated_segments,
            self.file_size_bytes / 1024
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stats_emptyDatabase_shouldCountNothing() {
        let db = DatabaseConnection::new_in_memory().expect("Failed to create DB");

        let stats = db.stats().await.expect("Failed to get stats");

        assert_eq!(db.path(), Path::new(":memory:"));
        assert_eq!(stats.job_count, 0);
        assert_eq!(stats.translated_segments, 0);
        assert_eq!(stats.file_size_bytes, 0);
    }

    #[tokio::test]
    async fn test_transactionAsync_failingClosure_shouldRollBack() {
        let db = DatabaseConnection::new_in_memory().expect("Failed to create DB");

        let result: Result<()> = db
            .transaction_async(|tx| {
                tx.execute(
                    "INSERT INTO jobs (id, source_file_path, source_file_hash, source_language, target_language, provider, model, total_segments, created_at, updated_at)
                     VALUES ('tx-test', '/path', 'hash', 'en', 'ko', 'gemini', 'model', 10, datetime('now'), datetime('now'))",
                    [],
                )?;
                Err(anyhow!("abort"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(db.stats().await.unwrap().job_count, 0);
    }

    #[tokio::test]
    async fn test_new_onDisk_shouldReopenExistingDatabase() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("jobs.db");

        DatabaseConnection::new(&path).expect("First open failed");
        let reopened = DatabaseConnection::new(&path).expect("Second open failed");

        assert_eq!(reopened.path(), path.as_path());
        assert!(reopened.stats().await.unwrap().file_size_bytes > 0);
    }
}
