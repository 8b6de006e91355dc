//! Synchronous workflow backend.
//!
//! Every run gets a directory `<base_dir>/<run_id>`. The final state of the
//! run is written to `<base_dir>/<run_id>.json`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rob_templates::{Arguments, WorkflowTemplate};
use tokio::fs;

use super::{claim_run_dir, prepare_run, rollback, run_steps, WorkflowBackend};
use crate::error::{EngineError, EngineResult};
use crate::runner::StepRunner;
use crate::state::{StateRunning, WorkflowState};

/// Backend that executes runs inline.
pub struct SyncBackend {
    base_dir: PathBuf,
    runner: Arc<dyn StepRunner>,
    verbose: bool,
}

impl SyncBackend {
    pub fn new(base_dir: impl Into<PathBuf>, runner: Arc<dyn StepRunner>) -> Self {
        Self {
            base_dir: base_dir.into(),
            runner,
            verbose: false,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.base_dir.join(run_id)
    }

    pub fn run_file(&self, run_id: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", run_id))
    }
}

async fn exists(path: &Path) -> bool {
    fs::metadata(path).await.is_ok()
}

#[async_trait]
impl WorkflowBackend for SyncBackend {
    async fn execute(
        &self,
        run_id: &str,
        template: &WorkflowTemplate,
        source_dir: &Path,
        arguments: &Arguments,
    ) -> EngineResult<WorkflowState> {
        let run_dir = self.run_dir(run_id);
        let run_file = self.run_file(run_id);
        if exists(&run_file).await {
            return Err(EngineError::DuplicateRun(run_id.to_string()));
        }
        claim_run_dir(&self.base_dir, run_id, &run_dir).await?;

        let prepared = match prepare_run(template, arguments, source_dir, &run_dir).await {
            Ok(prepared) => prepared,
            Err(e) => {
                rollback(run_id, &run_dir).await;
                return Err(e);
            }
        };

        tracing::info!(run_id = %run_id, template = %template.identifier(), "Executing run");
        let running = StateRunning::new();
        let state = run_steps(self.runner.as_ref(), run_id, &prepared, &run_dir, &running, self.verbose).await;
        tracing::info!(run_id = %run_id, state = %state, "Run finished");

        fs::write(&run_file, serde_json::to_string_pretty(&state)?).await?;
        Ok(state)
    }

    async fn get_state(&self, run_id: &str) -> EngineResult<WorkflowState> {
        let content = match fs::read_to_string(self.run_file(run_id)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::UnknownRun(run_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    async fn cancel_run(&self, _run_id: &str) -> EngineResult<()> {
        Ok(())
    }

    async fn remove_run(&self, run_id: &str) -> EngineResult<()> {
        let run_dir = self.run_dir(run_id);
        if exists(&run_dir).await {
            fs::remove_dir_all(&run_dir).await?;
        }
        let run_file = self.run_file(run_id);
        if exists(&run_file).await {
            fs::remove_file(&run_file).await?;
        }
        tracing::debug!(run_id = %run_id, "Removed run");
        Ok(())
    }
}
