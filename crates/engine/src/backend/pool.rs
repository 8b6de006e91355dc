//! Worker pool backend.
//!
//! Runs are executed by worker tasks on the tokio runtime. The state of every
//! run is kept in a [`RunRegistry`]. Each worker is paired with a completion
//! task that awaits the worker result and stores the final state.
//! Cancellation aborts the worker, which kills any child process it spawned,
//! and removes the run from the registry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rob_templates::{Arguments, WorkflowTemplate};
use tokio::task::JoinHandle;

use super::{claim_run_dir, prepare_run, rollback, run_steps, PreparedRun, WorkflowBackend};
use crate::error::{EngineError, EngineResult};
use crate::registry::RunRegistry;
use crate::runner::StepRunner;
use crate::state::{StateRunning, WorkflowState};

/// Backend that executes runs on worker tasks.
pub struct PoolBackend {
    base_dir: PathBuf,
    runner: Arc<dyn StepRunner>,
    registry: Arc<RunRegistry>,
    verbose: bool,
}

impl PoolBackend {
    pub fn new(base_dir: impl Into<PathBuf>, runner: Arc<dyn StepRunner>) -> Self {
        Self {
            base_dir: base_dir.into(),
            runner,
            registry: Arc::new(RunRegistry::new()),
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

    /// Submit a run of the template and return the new run identifier.
    ///
    /// With `run_async` the run is handed to a worker task and the call
    /// returns right away. Otherwise the run is executed before the call
    /// returns. Template and argument errors are raised here and leave no
    /// run directory behind.
    pub async fn submit(
        &self,
        template: &WorkflowTemplate,
        arguments: &Arguments,
        run_async: bool,
    ) -> EngineResult<String> {
        template.validate_arguments(arguments)?;
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let source_dir = template.base_dir().unwrap_or_else(|| Path::new("."));
        self.start(&run_id, template, source_dir, arguments, run_async).await?;
        Ok(run_id)
    }

    async fn start(
        &self,
        run_id: &str,
        template: &WorkflowTemplate,
        source_dir: &Path,
        arguments: &Arguments,
        run_async: bool,
    ) -> EngineResult<WorkflowState> {
        let run_dir = self.run_dir(run_id);
        if self.registry.read(run_id).await.is_some() {
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

        let running = StateRunning::new();
        if !self.registry.insert(run_id, running.clone().into(), None).await {
            rollback(run_id, &run_dir).await;
            return Err(EngineError::DuplicateRun(run_id.to_string()));
        }
        tracing::info!(
            run_id = %run_id,
            template = %template.identifier(),
            run_async = run_async,
            "Run submitted"
        );

        if !run_async {
            let state = run_steps(self.runner.as_ref(), run_id, &prepared, &run_dir, &running, self.verbose).await;
            tracing::info!(run_id = %run_id, state = %state, "Run finished");
            self.registry.update(run_id, state.clone()).await;
            return Ok(state);
        }

        let worker = self.spawn_worker(run_id, prepared, run_dir, running.clone());
        if !self.registry.set_worker(run_id, worker.abort_handle()).await {
            // Canceled before the worker was attached
            worker.abort();
        }
        self.spawn_completion(run_id, worker, running.clone());
        Ok(running.into())
    }

    fn spawn_worker(
        &self,
        run_id: &str,
        prepared: PreparedRun,
        run_dir: PathBuf,
        running: StateRunning,
    ) -> JoinHandle<WorkflowState> {
        let runner = Arc::clone(&self.runner);
        let run_id = run_id.to_string();
        let verbose = self.verbose;
        tokio::spawn(async move {
            run_steps(runner.as_ref(), &run_id, &prepared, &run_dir, &running, verbose).await
        })
    }

    fn spawn_completion(&self, run_id: &str, worker: JoinHandle<WorkflowState>, running: StateRunning) {
        let registry = Arc::clone(&self.registry);
        let run_id = run_id.to_string();
        tokio::spawn(async move {
            let state = match worker.await {
                Ok(state) => state,
                Err(e) if e.is_cancelled() => {
                    tracing::debug!(run_id = %run_id, "Worker aborted");
                    return;
                }
                Err(e) => running.error(vec![format!("Worker failed: {}", e)]).into(),
            };
            tracing::info!(run_id = %run_id, state = %state, "Run finished");
            if !registry.update(&run_id, state).await {
                tracing::debug!(run_id = %run_id, "Run no longer registered");
            }
        });
    }
}

#[async_trait]
impl WorkflowBackend for PoolBackend {
    async fn execute(
        &self,
        run_id: &str,
        template: &WorkflowTemplate,
        source_dir: &Path,
        arguments: &Arguments,
    ) -> EngineResult<WorkflowState> {
        self.start(run_id, template, source_dir, arguments, true).await
    }

    async fn get_state(&self, run_id: &str) -> EngineResult<WorkflowState> {
        self.registry
            .read(run_id)
            .await
            .ok_or_else(|| EngineError::UnknownRun(run_id.to_string()))
    }

    async fn cancel_run(&self, run_id: &str) -> EngineResult<()> {
        if let Some(entry) = self.registry.remove(run_id).await {
            if let Some(worker) = entry.worker {
                worker.abort();
            }
            tracing::info!(run_id = %run_id, "Run canceled");
        }
        Ok(())
    }

    async fn remove_run(&self, run_id: &str) -> EngineResult<()> {
        let state = self.get_state(run_id).await?;
        if state.is_active() {
            return Err(EngineError::ActiveRun(run_id.to_string()));
        }
        self.registry.remove(run_id).await;
        let run_dir = self.run_dir(run_id);
        if tokio::fs::metadata(&run_dir).await.is_ok() {
            tokio::fs::remove_dir_all(&run_dir).await?;
        }
        tracing::debug!(run_id = %run_id, "Removed run");
        Ok(())
    }
}
