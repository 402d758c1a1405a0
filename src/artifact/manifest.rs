use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// File inside the output directory that records every attempt.
pub const MANIFEST_FILE: &str = ".manifest.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptStatus::Running => write!(f, "running"),
            AttemptStatus::Completed => write!(f, "completed"),
            AttemptStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One status transition of one attempt. Appended, never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub attempt_id: Uuid,
    pub pipeline: String,
    pub region: String,
    /// File name of the artifact, relative to the output directory
    pub artifact: String,
    pub status: AttemptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ManifestRecord {
    pub fn new(
        attempt_id: Uuid,
        pipeline: impl Into<String>,
        region: impl Into<String>,
        artifact: impl Into<String>,
        status: AttemptStatus,
    ) -> Self {
        Self {
            attempt_id,
            pipeline: pipeline.into(),
            region: region.into(),
            artifact: artifact.into(),
            status,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Fold manifest contents into the latest record per artifact file.
///
/// Lines that fail to decode (e.g. a write cut short by a crash) are skipped.
pub fn latest_by_artifact(contents: &str) -> HashMap<String, ManifestRecord> {
    let mut latest = HashMap::new();
    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ManifestRecord>(line) {
            Ok(record) => {
                latest.insert(record.artifact.clone(), record);
            }
            Err(e) => {
                tracing::warn!(line = index + 1, error = %e, "Skipping unreadable manifest line");
            }
        }
    }
    latest
}
