//! Variant execution: the seam between the pipeline and the external tools.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use changegate_core::JobOutcome;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::job::JobVariant;

/// One rendered command for one variant of a job group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub group: String,
    pub variant: JobVariant,
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl Invocation {
    /// `group[label]`, used in logs and error messages.
    pub fn display_name(&self) -> String {
        format!("{}[{}]", self.group, self.variant.label())
    }
}

/// Result of a variant execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VariantResult {
    /// Variant label.
    pub label: String,

    /// Terminal outcome.
    pub outcome: JobOutcome,

    /// Exit code, when the process ran to completion.
    pub exit_code: Option<i32>,

    /// Captured stdout.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stdout: String,

    /// Captured stderr.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Why the variant did not succeed, if it did not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VariantResult {
    /// Whether this variant passed.
    pub fn passed(&self) -> bool {
        self.outcome == JobOutcome::Success
    }
}

/// Opaque capability that runs one variant of a job group.
///
/// Implementations never fail: every problem is reported as a
/// `failure` or `cancelled` outcome.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn run_variant(&self, invocation: &Invocation) -> VariantResult;
}

/// Captured output of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Runs an invocation as a child process.
pub struct CommandRunner;

impl CommandRunner {
    /// Execute an invocation and capture its output.
    pub async fn execute(invocation: &Invocation, workdir: &Path) -> Result<CommandOutput> {
        let start = Instant::now();

        let (exe, args) = invocation
            .command
            .split_first()
            .ok_or_else(|| PipelineError::EmptyCommand(invocation.group.clone()))?;

        debug!(invocation = %invocation.display_name(), command = ?invocation.command, "Spawning");

        let child = Command::new(exe)
            .args(args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PipelineError::Spawn {
                program: exe.clone(),
                source,
            })?;

        let output = if invocation.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(invocation.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| PipelineError::Timeout {
                invocation: invocation.display_name(),
                secs: invocation.timeout_secs,
            })??
        } else {
            child.wait_with_output().await?
        };

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// [`JobExecutor`] that runs commands in a working directory.
///
/// A non-zero exit or spawn error is `failure`; a timeout is `cancelled`.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    workdir: PathBuf,
}

impl ProcessExecutor {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

#[async_trait]
impl JobExecutor for ProcessExecutor {
    async fn run_variant(&self, invocation: &Invocation) -> VariantResult {
        let start = Instant::now();
        let label = invocation.variant.label();

        match CommandRunner::execute(invocation, &self.workdir).await {
            Ok(out) => {
                let outcome = if out.success {
                    JobOutcome::Success
                } else {
                    JobOutcome::Failure
                };
                let error = (!out.success).then(|| {
                    format!(
                        "'{}' exited with code {}",
                        invocation.display_name(),
                        out.exit_code
                    )
                });
                VariantResult {
                    label,
                    outcome,
                    exit_code: Some(out.exit_code),
                    stdout: out.stdout,
                    stderr: out.stderr,
                    duration_ms: out.duration_ms,
                    error,
                }
            }
            Err(e) => {
                let outcome = match &e {
                    PipelineError::Timeout { .. } => JobOutcome::Cancelled,
                    _ => JobOutcome::Failure,
                };
                VariantResult {
                    label,
                    outcome,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration_ms: start.elapsed().as_millis() as u64,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
