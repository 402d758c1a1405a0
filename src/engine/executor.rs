use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::process::Command;
use uuid::Uuid;

use crate::config::EngineConfig;

/// Outcome of a single engine invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Completed,
    Failed,
    TimedOut,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
            ExecutionStatus::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Everything the engine needs to run one notebook.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub attempt_id: Uuid,
    pub template: PathBuf,
    pub output: PathBuf,
    pub parameters: Map<String, Value>,
}

/// Result of notebook execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub attempt_id: Uuid,
    pub status: ExecutionStatus,
    pub exit_code: Option<i32>,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn completed(attempt_id: Uuid) -> Self {
        Self {
            attempt_id,
            status: ExecutionStatus::Completed,
            exit_code: Some(0),
            output: None,
            error: None,
        }
    }

    pub fn failed(attempt_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            attempt_id,
            status: ExecutionStatus::Failed,
            exit_code: None,
            output: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}

/// Boundary to whatever actually runs the notebooks.
///
/// Implementations must not panic on execution failure; every failure is
/// reported through [`ExecutionResult`].
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult;
}

/// Runs notebooks with papermill as a child process.
///
/// Invocation: `<program> [args..] <template> <output> -y <parameters as JSON>`.
/// JSON is valid YAML, so parameter types survive the trip. The child is
/// killed if the returned future is dropped, which is how cancellation and
/// the timeout stop a hung kernel.
#[derive(Debug, Clone)]
pub struct PapermillEngine {
    config: EngineConfig,
}

impl PapermillEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    fn command(&self, request: &ExecutionRequest) -> Result<Command, serde_json::Error> {
        let parameters = serde_json::to_string(&request.parameters)?;
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .arg(&request.template)
            .arg(&request.output)
            .arg("-y")
            .arg(parameters)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }

    fn process_output(
        attempt_id: Uuid,
        result: Result<std::process::Output, std::io::Error>,
    ) -> ExecutionResult {
        match result {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let exit_code = output.status.code();

                let (status, error) = if output.status.success() {
                    (ExecutionStatus::Completed, None)
                } else {
                    (
                        ExecutionStatus::Failed,
                        Some(if stderr.trim().is_empty() {
                            format!("Exit code: {:?}", exit_code)
                        } else {
                            stderr
                        }),
                    )
                };

                tracing::debug!(
                    attempt_id = %attempt_id,
                    status = %status,
                    exit_code = ?exit_code,
                    "Engine exited"
                );

                ExecutionResult {
                    attempt_id,
                    status,
                    exit_code,
                    output: if stdout.is_empty() {
                        None
                    } else {
                        Some(stdout)
                    },
                    error,
                }
            }
            Err(e) => {
                tracing::error!(attempt_id = %attempt_id, error = %e, "Failed to start engine");
                ExecutionResult::failed(attempt_id, e.to_string())
            }
        }
    }
}

#[async_trait]
impl ExecutionEngine for PapermillEngine {
    async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        let attempt_id = request.attempt_id;
        tracing::debug!(
            attempt_id = %attempt_id,
            program = %self.config.program,
            template = %request.template.display(),
            output = %request.output.display(),
            "Invoking engine"
        );

        let mut cmd = match self.command(request) {
            Ok(cmd) => cmd,
            Err(e) => return ExecutionResult::failed(attempt_id, e.to_string()),
        };

        let run = cmd.output();
        let result = match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::error!(attempt_id = %attempt_id, timeout = ?limit, "Engine timed out");
                    return ExecutionResult {
                        attempt_id,
                        status: ExecutionStatus::TimedOut,
                        exit_code: None,
                        output: None,
                        error: Some(format!("Timed out after {:?}", limit)),
                    };
                }
            },
            None => run.await,
        };

        Self::process_output(attempt_id, result)
    }
}
