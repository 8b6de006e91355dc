//! Workflow backends.
//!
//! A backend executes runs of workflow templates and keeps track of their
//! state. Two implementations are provided:
//! - [`SyncBackend`] runs a workflow inline and persists the resulting state
//!   to a result file next to the run directory.
//! - [`PoolBackend`] hands every run to a worker task and keeps the run states
//!   in a registry.

pub mod pool;
pub mod sync;

use std::path::Path;

use async_trait::async_trait;
use rob_templates::{Arguments, WorkflowTemplate};

use crate::error::{EngineError, EngineResult};
use crate::runner::StepRunner;
use crate::serial::{collect_resources, SerialWorkflow};
use crate::state::{StateRunning, WorkflowState};
use crate::uploader::FileCopy;

pub use pool::PoolBackend;
pub use sync::SyncBackend;

/// Contract shared by all workflow backends.
#[async_trait]
pub trait WorkflowBackend: Send + Sync {
    /// Execute a run of the template with the given identifier. Static
    /// template files are read from `source_dir`.
    async fn execute(
        &self,
        run_id: &str,
        template: &WorkflowTemplate,
        source_dir: &Path,
        arguments: &Arguments,
    ) -> EngineResult<WorkflowState>;

    /// Current state of a run.
    async fn get_state(&self, run_id: &str) -> EngineResult<WorkflowState>;

    /// Cancel a run. Runs that are unknown to the backend are ignored.
    async fn cancel_run(&self, run_id: &str) -> EngineResult<()>;

    /// Remove a finished run and the files it produced.
    async fn remove_run(&self, run_id: &str) -> EngineResult<()>;
}

/// Commands and declared outputs of a run whose inputs are staged.
#[derive(Debug, Clone)]
pub(crate) struct PreparedRun {
    pub commands: Vec<String>,
    pub output_files: Vec<String>,
}

/// Validate the arguments, stage the input files into the run directory and
/// resolve the command list.
pub(crate) async fn prepare_run(
    template: &WorkflowTemplate,
    arguments: &Arguments,
    source_dir: &Path,
    run_dir: &Path,
) -> EngineResult<PreparedRun> {
    template.validate_arguments(arguments)?;
    let workflow = SerialWorkflow::new(template, arguments);
    let commands = workflow.get_commands()?;
    let output_files = workflow.output_files()?;
    workflow.upload_files(source_dir, &FileCopy::new(run_dir)).await?;
    Ok(PreparedRun {
        commands,
        output_files,
    })
}

/// Execute the commands of a prepared run and derive the final state.
pub(crate) async fn run_steps(
    runner: &dyn StepRunner,
    run_id: &str,
    prepared: &PreparedRun,
    run_dir: &Path,
    state: &StateRunning,
    verbose: bool,
) -> WorkflowState {
    let result = runner.run(run_id, &prepared.commands, run_dir, verbose).await;
    if result.is_success() {
        let resources = collect_resources(run_dir, &prepared.output_files).await;
        state.success(resources).into()
    } else {
        state.error(result.messages).into()
    }
}

/// Create the directory of a new run. The directory is the claim on the run
/// identifier: it fails with [`EngineError::DuplicateRun`] if the directory
/// exists already, including when a concurrent submission created it first.
pub(crate) async fn claim_run_dir(base_dir: &Path, run_id: &str, run_dir: &Path) -> EngineResult<()> {
    tokio::fs::create_dir_all(base_dir).await?;
    match tokio::fs::create_dir(run_dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(EngineError::DuplicateRun(run_id.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Remove a run directory created by [`claim_run_dir`] for a submission
/// that failed.
pub(crate) async fn rollback(run_id: &str, run_dir: &Path) {
    tracing::debug!(run_id = %run_id, "Removing run directory");
    if let Err(e) = tokio::fs::remove_dir_all(run_dir).await {
        tracing::warn!(run_id = %run_id, error = %e, "Failed to remove run directory");
    }
}
