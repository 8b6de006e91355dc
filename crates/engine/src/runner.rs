//! Step runners execute the resolved commands of a run.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// Outcome of a step runner invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Error,
}

/// Result of executing the commands of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub run_id: String,
    pub status: StepStatus,
    /// Error messages. Empty on success.
    pub messages: Vec<String>,
}

impl StepResult {
    pub fn success(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            status: StepStatus::Success,
            messages: Vec::new(),
        }
    }

    pub fn error(run_id: impl Into<String>, messages: Vec<String>) -> Self {
        Self {
            run_id: run_id.into(),
            status: StepStatus::Error,
            messages,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}

/// Executes the command list of a run inside its run directory.
///
/// Failures are reported through the returned [`StepResult`], never as an
/// error.
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run(&self, run_id: &str, commands: &[String], run_dir: &Path, verbose: bool) -> StepResult;
}

/// Runs commands one after the other in a shell. Stops at the first command
/// that fails.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
}

impl ShellRunner {
    pub fn new(shell: impl Into<String>) -> Self {
        Self { shell: shell.into() }
    }

    async fn run_command(&self, command: &str, run_dir: &Path) -> Result<(), String> {
        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .current_dir(run_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("Failed to spawn process: {}", e))?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        if stderr.is_empty() {
            Err(format!("'{}' failed with exit code {}", command, code))
        } else {
            Err(stderr)
        }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new("bash")
    }
}

#[async_trait]
impl StepRunner for ShellRunner {
    async fn run(&self, run_id: &str, commands: &[String], run_dir: &Path, verbose: bool) -> StepResult {
        for command in commands {
            if verbose {
                tracing::info!(run_id = %run_id, command = %command, "Executing command");
            } else {
                tracing::debug!(run_id = %run_id, command = %command, "Executing command");
            }
            if let Err(message) = self.run_command(command, run_dir).await {
                tracing::debug!(run_id = %run_id, error = %message, "Command failed");
                return StepResult::error(run_id, vec![message]);
            }
        }
        StepResult::success(run_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commands_run_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ShellRunner::default();
        let commands = vec![
            "mkdir -p results".to_string(),
            "echo hello > results/out.txt".to_string(),
            "echo world >> results/out.txt".to_string(),
        ];

        let result = runner.run("r1", &commands, dir.path(), false).await;
        assert!(result.is_success());
        assert!(result.messages.is_empty());
        let content = std::fs::read_to_string(dir.path().join("results/out.txt")).unwrap();
        assert_eq!(content, "hello\nworld\n");
    }

    #[tokio::test]
    async fn test_failure_stops_execution() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ShellRunner::default();
        let commands = vec![
            "echo 'x failed' >&2; exit 3".to_string(),
            "touch never.txt".to_string(),
        ];

        let result = runner.run("r2", &commands, dir.path(), true).await;
        assert_eq!(result, StepResult::error("r2", vec!["x failed".to_string()]));
        assert!(!dir.path().join("never.txt").exists());
    }

    #[tokio::test]
    async fn test_failure_without_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ShellRunner::default();
        let result = runner.run("r3", &["exit 1".to_string()], dir.path(), false).await;
        assert_eq!(result.status, StepStatus::Error);
        assert!(result.messages[0].contains("exit code 1"));
    }
}
