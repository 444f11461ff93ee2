//! Job runners that hand queued report jobs to the external pipeline.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::scheduler::schedule::DeliveryOptions;

/// Default timeout for a single job (10 minutes).
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("job failed: {0}")]
    Failed(String),

    #[error("job timed out after {0:?}")]
    Timeout(Duration),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything the pipeline needs to produce and deliver one report.
#[derive(Debug, Clone, Serialize)]
pub struct JobRequest {
    pub schedule_id: String,
    pub execution_id: String,
    pub schedule_name: String,
    /// Payload with relative time windows already resolved.
    pub payload: serde_json::Value,
    pub delivery: DeliveryOptions,
}

/// What the pipeline reported back for a settled job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobOutcome {
    /// Where the produced output landed.
    pub output_path: Option<String>,
    /// Delivery failure for an otherwise successful job.
    pub delivery_error: Option<String>,
}

/// Executes one report job to completion.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Run the job and wait for it to settle.
    ///
    /// `Ok` means the report was produced, even if delivery failed;
    /// `Err` means the attempt failed and is eligible for retry.
    async fn run_job(&self, request: &JobRequest) -> Result<JobOutcome, RunnerError>;

    /// Get the runner kind name.
    fn kind(&self) -> &'static str;
}

/// Runs each job as a child process of a configured pipeline command.
///
/// The [`JobRequest`] is written to the child's stdin as JSON. A zero exit
/// settles the job successfully; stdout may carry either a JSON object with
/// `output_path` and `delivery_error` fields or a bare output path on the
/// first line. A non-zero exit fails the job with stderr as the message.
#[derive(Debug)]
pub struct CommandRunner {
    command: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(
        command: PathBuf,
        args: Vec<String>,
        working_dir: Option<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            command,
            args,
            working_dir,
            timeout,
        }
    }
}

#[async_trait]
impl JobRunner for CommandRunner {
    async fn run_job(&self, request: &JobRequest) -> Result<JobOutcome, RunnerError> {
        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn()?;

        let request_json =
            serde_json::to_vec(request).map_err(|e| RunnerError::Failed(e.to_string()))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&request_json).await?;
            // Closing stdin signals the pipeline that the request is complete.
            drop(stdin);
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => return Err(RunnerError::Timeout(self.timeout)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = match stderr.trim() {
                "" => format!(
                    "job command exited with status {}",
                    output.status.code().unwrap_or(-1)
                ),
                s => s.to_string(),
            };
            return Err(RunnerError::Failed(message));
        }

        Ok(parse_outcome(&String::from_utf8_lossy(&output.stdout)))
    }

    fn kind(&self) -> &'static str {
        "command"
    }
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    #[serde(default)]
    output_path: Option<String>,
    #[serde(default)]
    delivery_error: Option<String>,
}

fn parse_outcome(stdout: &str) -> JobOutcome {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return JobOutcome::default();
    }

    if trimmed.starts_with('{')
        && let Ok(response) = serde_json::from_str::<JobResponse>(trimmed)
    {
        return JobOutcome {
            output_path: response.output_path,
            delivery_error: response.delivery_error,
        };
    }

    let first_line = trimmed.lines().next().unwrap_or_default().trim();
    JobOutcome {
        output_path: Some(first_line.to_string()),
        delivery_error: None,
    }
}
