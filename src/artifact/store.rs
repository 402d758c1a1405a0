use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::artifact::manifest::{latest_by_artifact, AttemptStatus, ManifestRecord, MANIFEST_FILE};
use crate::artifact::name::ArtifactName;
use crate::error::StoreError;

/// What the store knows about an artifact on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    Running,
    Completed,
    Failed,
    /// On disk with no manifest record, e.g. written before the manifest existed
    Untracked,
}

impl From<AttemptStatus> for ArtifactStatus {
    fn from(status: AttemptStatus) -> Self {
        match status {
            AttemptStatus::Running => ArtifactStatus::Running,
            AttemptStatus::Completed => ArtifactStatus::Completed,
            AttemptStatus::Failed => ArtifactStatus::Failed,
        }
    }
}

impl std::fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactStatus::Running => write!(f, "running"),
            ArtifactStatus::Completed => write!(f, "completed"),
            ArtifactStatus::Failed => write!(f, "failed"),
            ArtifactStatus::Untracked => write!(f, "untracked"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactEntry {
    pub file_name: String,
    pub name: ArtifactName,
    pub status: ArtifactStatus,
    pub error: Option<String>,
}

impl ArtifactEntry {
    /// A `running` entry means the run that wrote it never finished.
    pub fn counts_as_completed(&self) -> bool {
        matches!(
            self.status,
            ArtifactStatus::Completed | ArtifactStatus::Untracked
        )
    }
}

/// `(pipeline, region)` pairs that already have a completed artifact,
/// loaded once per run and kept current as jobs finish.
#[derive(Debug, Clone, Default)]
pub struct CompletedSet {
    pairs: HashSet<(String, String)>,
}

impl CompletedSet {
    pub fn contains(&self, pipeline: &str, region: &str) -> bool {
        self.pairs
            .contains(&(pipeline.to_string(), region.to_string()))
    }

    pub fn insert(&mut self, pipeline: impl Into<String>, region: impl Into<String>) {
        self.pairs.insert((pipeline.into(), region.into()));
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// The output directory: executed notebooks plus the status manifest.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    pub fn path_for(&self, name: &ArtifactName) -> PathBuf {
        self.dir.join(name.file_name())
    }

    /// Create the output directory. Safe to call repeatedly.
    pub async fn ensure_dir(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| self.io_error(source))
    }

    /// Every file in the output directory that follows the artifact naming
    /// pattern, oldest first, joined with its latest manifest status.
    /// A missing directory has no artifacts.
    pub async fn artifacts(&self) -> Result<Vec<ArtifactEntry>, StoreError> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(self.io_error(source)),
        };

        let mut manifest = self.manifest().await?;
        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| self.io_error(e))? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(name) = ArtifactName::parse(&file_name) else {
                continue;
            };
            let (status, error) = match manifest.remove(&file_name) {
                Some(record) => (record.status.into(), record.error),
                None => (ArtifactStatus::Untracked, None),
            };
            entries.push(ArtifactEntry {
                file_name,
                name,
                status,
                error,
            });
        }

        entries.sort_by(|a, b| {
            a.name
                .executed_at
                .cmp(&b.name.executed_at)
                .then_with(|| a.file_name.cmp(&b.file_name))
        });
        Ok(entries)
    }

    /// Every pair with a completed artifact, from a single directory listing.
    /// Failed or interrupted attempts do not count.
    pub async fn completed(&self) -> Result<CompletedSet, StoreError> {
        let mut set = CompletedSet::default();
        for entry in self.artifacts().await? {
            if entry.counts_as_completed() {
                set.insert(entry.name.pipeline, entry.name.region);
            }
        }
        Ok(set)
    }

    /// True if a completed artifact exists for exactly this pipeline and
    /// region. Lists the directory on every call; loops should use
    /// [`ArtifactStore::completed`].
    pub async fn is_completed(&self, pipeline: &str, region: &str) -> Result<bool, StoreError> {
        Ok(self.completed().await?.contains(pipeline, region))
    }

    /// Latest manifest record per artifact file name.
    pub async fn manifest(&self) -> Result<HashMap<String, ManifestRecord>, StoreError> {
        let path = self.manifest_path();
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(latest_by_artifact(&contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    pub async fn record(&self, record: &ManifestRecord) -> Result<(), StoreError> {
        let path = self.manifest_path();
        let line = record.to_line()?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
        file.flush()
            .await
            .map_err(|source| StoreError::Io { path, source })
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.dir.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn name(pipeline: &str, region: &str, second: u32) -> ArtifactName {
        let at = NaiveDate::from_ymd_opt(2020, 11, 6)
            .unwrap()
            .and_hms_opt(10, 0, second)
            .unwrap();
        ArtifactName::new(pipeline, region, at)
    }

    async fn touch(store: &ArtifactStore, name: &ArtifactName) {
        tokio::fs::write(store.path_for(name), b"{}").await.unwrap();
    }

    #[tokio::test]
    async fn missing_dir_has_no_artifacts() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path().join("nb-output"));
        assert!(store.artifacts().await.unwrap().is_empty());
        assert!(!store.is_completed("cluster", "AF").await.unwrap());
    }

    #[tokio::test]
    async fn ensure_dir_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path().join("a").join("b"));
        store.ensure_dir().await.unwrap();
        store.ensure_dir().await.unwrap();
        assert!(store.dir().is_dir());
    }

    #[tokio::test]
    async fn untracked_artifact_counts_as_completed() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path());
        touch(&store, &name("cluster", "AF", 0)).await;

        assert!(store.is_completed("cluster", "AF").await.unwrap());
        assert!(!store.is_completed("query", "AF").await.unwrap());
    }

    #[tokio::test]
    async fn region_prefix_does_not_match() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path());
        touch(&store, &name("cluster", "AFG", 0)).await;

        assert!(!store.is_completed("cluster", "AF").await.unwrap());
        assert!(store.is_completed("cluster", "AFG").await.unwrap());
    }

    #[tokio::test]
    async fn failed_and_running_attempts_do_not_count() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path());

        let failed = name("cluster", "AF", 0);
        touch(&store, &failed).await;
        store
            .record(
                &ManifestRecord::new(
                    Uuid::new_v4(),
                    "cluster",
                    "AF",
                    failed.file_name(),
                    AttemptStatus::Failed,
                )
                .with_error("kernel died"),
            )
            .await
            .unwrap();

        let running = name("query", "AF", 1);
        touch(&store, &running).await;
        store
            .record(&ManifestRecord::new(
                Uuid::new_v4(),
                "query",
                "AF",
                running.file_name(),
                AttemptStatus::Running,
            ))
            .await
            .unwrap();

        assert!(!store.is_completed("cluster", "AF").await.unwrap());
        assert!(!store.is_completed("query", "AF").await.unwrap());

        let entries = store.artifacts().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, ArtifactStatus::Failed);
        assert_eq!(entries[0].error.as_deref(), Some("kernel died"));
        assert_eq!(entries[1].status, ArtifactStatus::Running);
    }

    #[tokio::test]
    async fn completed_after_failed_counts() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path());

        let first = name("cluster", "AF", 0);
        let second = name("cluster", "AF", 30);
        touch(&store, &first).await;
        touch(&store, &second).await;
        for (artifact, status) in [
            (&first, AttemptStatus::Running),
            (&first, AttemptStatus::Failed),
            (&second, AttemptStatus::Running),
            (&second, AttemptStatus::Completed),
        ] {
            store
                .record(&ManifestRecord::new(
                    Uuid::new_v4(),
                    "cluster",
                    "AF",
                    artifact.file_name(),
                    status,
                ))
                .await
                .unwrap();
        }

        assert!(store.is_completed("cluster", "AF").await.unwrap());
    }

    #[tokio::test]
    async fn completed_set_loads_every_finished_pair_at_once() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path());
        touch(&store, &name("cluster", "AF", 0)).await;
        touch(&store, &name("query", "AFG", 1)).await;

        let failed = name("query", "KE", 2);
        touch(&store, &failed).await;
        store
            .record(&ManifestRecord::new(
                Uuid::new_v4(),
                "query",
                "KE",
                failed.file_name(),
                AttemptStatus::Failed,
            ))
            .await
            .unwrap();

        let mut completed = store.completed().await.unwrap();
        assert_eq!(completed.len(), 2);
        assert!(completed.contains("cluster", "AF"));
        assert!(completed.contains("query", "AFG"));
        assert!(!completed.contains("query", "AF"));
        assert!(!completed.contains("query", "KE"));

        // Later files are not seen until the set is updated or reloaded
        touch(&store, &name("cluster", "KE", 3)).await;
        assert!(!completed.contains("cluster", "KE"));
        completed.insert("cluster", "KE");
        assert!(completed.contains("cluster", "KE"));
    }

    #[tokio::test]
    async fn manifest_entry_without_file_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path());
        store
            .record(&ManifestRecord::new(
                Uuid::new_v4(),
                "cluster",
                "AF",
                name("cluster", "AF", 0).file_name(),
                AttemptStatus::Completed,
            ))
            .await
            .unwrap();

        assert!(!store.is_completed("cluster", "AF").await.unwrap());
        assert!(store.artifacts().await.unwrap().is_empty());
    }
}
