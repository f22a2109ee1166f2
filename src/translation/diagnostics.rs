/*!
 * Records of content-safety escalations.
 *
 * A record is written whenever a segment needs the minimal-prompt last
 * resort, whether or not that last resort succeeds. Records are JSON files
 * named after the job and segment so they can be reviewed after the run.
 */

use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::translation::state::{CharacterStyleMap, Glossary};

/// How the escalation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationOutcome {
    /// The minimal prompt produced a (degraded) translation
    Recovered,
    /// The minimal prompt was blocked too
    Failed,
}

/// One content-safety escalation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProhibitedContentRecord {
    pub job_id: String,
    pub segment_index: usize,
    /// RFC 3339 timestamp
    pub recorded_at: String,
    /// Generation attempts, including the minimal prompt
    pub attempts: u32,
    /// Block reasons reported by the backend, in attempt order
    pub block_reasons: Vec<String>,
    pub outcome: EscalationOutcome,
    pub source_text: String,
    pub glossary: Glossary,
    pub character_styles: CharacterStyleMap,
}

impl ProhibitedContentRecord {
    /// Create a record stamped with the current time.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_id: &str,
        segment_index: usize,
        attempts: u32,
        block_reasons: Vec<String>,
        outcome: EscalationOutcome,
        source_text: &str,
        glossary: &Glossary,
        character_styles: &CharacterStyleMap,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            segment_index,
            recorded_at: Utc::now().to_rfc3339(),
            attempts,
            block_reasons,
            outcome,
            source_text: source_text.to_string(),
            glossary: glossary.clone(),
            character_styles: character_styles.clone(),
        }
    }

    /// File name of the record inside the diagnostics directory.
    pub fn file_name(&self) -> String {
        format!("prohibited_{}_{:05}.json", self.job_id, self.segment_index)
    }
}

/// Writer for escalation records
///
/// Without a directory, records are only logged.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsWriter {
    directory: Option<PathBuf>,
}

impl DiagnosticsWriter {
    /// Write records as JSON files under `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: Some(directory.into()),
        }
    }

    /// Only log records.
    pub fn log_only() -> Self {
        Self::default()
    }

    /// Target directory, if any.
    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// Persist a record. Failures are logged and never fail the job.
    pub async fn write(&self, record: &ProhibitedContentRecord) -> Option<PathBuf> {
        warn!(
            "Content-safety escalation for segment {} ({:?} after {} attempts)",
            record.segment_index, record.outcome, record.attempts
        );

        let directory = self.directory.as_ref()?;
        let path = directory.join(record.file_name());

        let json = match serde_json::to_string_pretty(record) {
            Ok(json) => json,
            Err(e) => {
                warn!("Could not serialize escalation record: {}", e);
                return None;
            }
        };

        if let Err(e) = tokio::fs::create_dir_all(directory).await {
            warn!("Could not create diagnostics directory {}: {}", directory.display(), e);
            return None;
        }

        match tokio::fs::write(&path, json).await {
            Ok(()) => {
                info!("Escalation record written to {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Could not write escalation record {}: {}", path.display(), e);
                None
            }
        }
    }
}
