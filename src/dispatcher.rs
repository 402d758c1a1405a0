//! Sequential, idempotent job dispatch.
//!
//! Each job goes through existence check, pipeline resolution and engine
//! invocation, in the order the job list gives. Per-job failures are logged
//! and reported in the returned [`JobReport`]s; they never stop the batch.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{Local, Timelike};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::artifact::{
    ArtifactName, ArtifactStore, AttemptStatus, CompletedSet, ManifestRecord,
};
use crate::config::DispatchConfig;
use crate::engine::{ExecutionEngine, ExecutionRequest};
use crate::error::{DispatchError, Result, StoreError};
use crate::jobs::{JobDescriptor, PipelineKind};

/// Attempts at finding an unused artifact name before giving up.
const NAME_ATTEMPTS: usize = 3;

/// Terminal state of one job within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// A completed artifact already exists for the pair
    Skipped,
    InvalidPipeline,
    Completed { artifact: PathBuf },
    Failed {
        artifact: Option<PathBuf>,
        error: String,
    },
    /// Interrupted by shutdown, or never started because of it
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub region: String,
    pub pipeline: String,
    #[serde(flatten)]
    pub outcome: JobOutcome,
}

/// What a run would do with a job, without doing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannedAction {
    Skip,
    Run,
    InvalidPipeline,
    InvalidRegion,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedJob {
    pub region: String,
    pub pipeline: String,
    pub action: PlannedAction,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub invalid: usize,
    pub cancelled: usize,
}

impl RunSummary {
    pub fn from_reports(reports: &[JobReport]) -> Self {
        let mut summary = Self::default();
        for report in reports {
            match report.outcome {
                JobOutcome::Completed { .. } => summary.completed += 1,
                JobOutcome::Failed { .. } => summary.failed += 1,
                JobOutcome::Skipped => summary.skipped += 1,
                JobOutcome::InvalidPipeline => summary.invalid += 1,
                JobOutcome::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.completed + self.failed + self.skipped + self.invalid + self.cancelled
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} jobs: {} completed, {} failed, {} skipped, {} invalid, {} cancelled",
            self.total(),
            self.completed,
            self.failed,
            self.skipped,
            self.invalid,
            self.cancelled
        )
    }
}

pub struct Dispatcher<E> {
    config: DispatchConfig,
    store: ArtifactStore,
    engine: E,
    shutdown: CancellationToken,
}

impl<E: ExecutionEngine> Dispatcher<E> {
    pub fn new(config: DispatchConfig, engine: E) -> Self {
        let store = ArtifactStore::new(config.output_dir.clone());
        Self {
            config,
            store,
            engine,
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop dispatching when `token` is cancelled. A running engine is killed.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Dispatch every job in order. Only a failure to create or list the
    /// output directory is returned as an error; the directory is listed
    /// once, up front.
    pub async fn run(
        &self,
        jobs: Vec<JobDescriptor>,
    ) -> std::result::Result<Vec<JobReport>, StoreError> {
        self.store.ensure_dir().await?;
        let mut completed = self.store.completed().await?;

        tracing::info!(
            requests = ?jobs.iter().map(JobDescriptor::label).collect::<Vec<_>>(),
            output_dir = %self.store.dir().display(),
            "Requesting regions"
        );

        let mut reports = Vec::with_capacity(jobs.len());
        for job in jobs {
            let outcome = if self.shutdown.is_cancelled() {
                JobOutcome::Cancelled
            } else {
                self.dispatch(&job, &mut completed).await
            };
            reports.push(JobReport {
                region: job.region,
                pipeline: job.pipeline,
                outcome,
            });
        }
        Ok(reports)
    }

    /// Existence check and pipeline resolution only. Nothing is executed or
    /// written.
    pub async fn plan(
        &self,
        jobs: &[JobDescriptor],
    ) -> std::result::Result<Vec<PlannedJob>, StoreError> {
        let completed = self.store.completed().await?;
        let mut planned = Vec::with_capacity(jobs.len());
        for job in jobs {
            let action = if completed.contains(&job.pipeline, &job.region) {
                PlannedAction::Skip
            } else if job.kind().is_err() {
                PlannedAction::InvalidPipeline
            } else if ArtifactName::region_problem(&job.region).is_some() {
                PlannedAction::InvalidRegion
            } else {
                PlannedAction::Run
            };
            planned.push(PlannedJob {
                region: job.region.clone(),
                pipeline: job.pipeline.clone(),
                action,
            });
        }
        Ok(planned)
    }

    async fn dispatch(&self, job: &JobDescriptor, completed: &mut CompletedSet) -> JobOutcome {
        let (pipeline, region) = (job.pipeline.as_str(), job.region.as_str());

        if completed.contains(pipeline, region) {
            tracing::info!(pipeline, region, "Skipping, already exists");
            return JobOutcome::Skipped;
        }

        let kind = match job.kind() {
            Ok(kind) => kind,
            Err(e) => {
                tracing::warn!(pipeline, region, "{}", e);
                return JobOutcome::InvalidPipeline;
            }
        };

        // Descriptors built in code skip the config loader's region check
        if let Some(reason) = ArtifactName::region_problem(region) {
            let error = DispatchError::InvalidRegion(region.to_string());
            tracing::warn!(pipeline, region, reason, "{}", error);
            return JobOutcome::Failed {
                artifact: None,
                error: error.to_string(),
            };
        }

        tracing::info!(pipeline, region, "Processing");
        match self.execute(kind, job).await {
            Ok(artifact) => {
                tracing::info!(pipeline, region, artifact = %artifact.display(), "Done");
                completed.insert(pipeline, region);
                JobOutcome::Completed { artifact }
            }
            Err(DispatchError::Execution {
                artifact, reason, ..
            }) => {
                tracing::error!(
                    pipeline,
                    region,
                    artifact = %artifact.display(),
                    error = %reason.trim_end(),
                    "Error while executing {} pipeline notebook for region {}. \
                     Check `{}` for errors",
                    pipeline,
                    region,
                    artifact.display()
                );
                JobOutcome::Failed {
                    artifact: Some(artifact),
                    error: reason,
                }
            }
            Err(DispatchError::Cancelled { artifact, .. }) => {
                tracing::warn!(pipeline, region, artifact = %artifact.display(), "Cancelled");
                JobOutcome::Cancelled
            }
            Err(DispatchError::Unrecorded { artifact, source }) => {
                tracing::error!(
                    pipeline,
                    region,
                    artifact = %artifact.display(),
                    error = %source,
                    "Notebook executed successfully but its completion could not be recorded"
                );
                JobOutcome::Failed {
                    artifact: Some(artifact),
                    error: format!("completion could not be recorded: {source}"),
                }
            }
            Err(e) => {
                tracing::error!(pipeline, region, error = %e, "Job not attempted");
                JobOutcome::Failed {
                    artifact: None,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn execute(&self, kind: PipelineKind, job: &JobDescriptor) -> Result<PathBuf> {
        let name = self.fresh_name(kind, &job.region).await?;
        let artifact = self.store.path_for(&name);
        let file_name = name.file_name();
        let attempt_id = Uuid::new_v4();
        let record = |status| {
            ManifestRecord::new(attempt_id, kind.as_str(), &job.region, &file_name, status)
        };

        self.store.record(&record(AttemptStatus::Running)).await?;

        let request = ExecutionRequest {
            attempt_id,
            template: self.config.templates_dir.join(kind.template()),
            output: artifact.clone(),
            parameters: job.parameters.clone(),
        };

        let result = tokio::select! {
            result = self.engine.execute(&request) => Some(result),
            _ = self.shutdown.cancelled() => None,
        };

        match result {
            Some(result) if result.is_success() => {
                match self.store.record(&record(AttemptStatus::Completed)).await {
                    Ok(()) => Ok(artifact),
                    Err(source) => Err(DispatchError::Unrecorded { artifact, source }),
                }
            }
            Some(result) => {
                let reason = result
                    .error
                    .unwrap_or_else(|| format!("engine {}", result.status));
                self.record_failure(record(AttemptStatus::Failed).with_error(reason.clone()))
                    .await;
                Err(DispatchError::Execution {
                    pipeline: kind.to_string(),
                    region: job.region.clone(),
                    artifact,
                    reason,
                })
            }
            None => {
                self.record_failure(record(AttemptStatus::Failed).with_error("cancelled"))
                    .await;
                Err(DispatchError::Cancelled {
                    pipeline: kind.to_string(),
                    region: job.region.clone(),
                    artifact,
                })
            }
        }
    }

    /// The engine's error is what gets reported; a manifest write failure
    /// here is only logged.
    async fn record_failure(&self, record: ManifestRecord) {
        if let Err(e) = self.store.record(&record).await {
            tracing::error!(
                artifact = %record.artifact,
                error = %e,
                "Failed to record failed attempt"
            );
        }
    }

    /// Artifact names carry one-second resolution. If the name for this
    /// second is taken (a retry within the same second), wait for the next.
    async fn fresh_name(&self, kind: PipelineKind, region: &str) -> Result<ArtifactName> {
        let mut taken = None;
        for _ in 0..NAME_ATTEMPTS {
            let name = ArtifactName::now(kind.as_str(), region);
            let path = self.store.path_for(&name);
            let exists = tokio::fs::try_exists(&path)
                .await
                .map_err(|source| StoreError::Io {
                    path: path.clone(),
                    source,
                })?;
            if !exists {
                return Ok(name);
            }
            taken = Some(path);
            let millis = 1_000 - u64::from(Local::now().nanosecond() / 1_000_000).min(999);
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
        Err(DispatchError::ArtifactExists(taken.unwrap_or_default()))
    }
}
