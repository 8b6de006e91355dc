//! Background monitor for active runs.
//!
//! The monitor polls a backend for the state of every run it tracks. When the
//! state type of a run changes the new state is passed to the run ledger.
//! Runs that are no longer active are dropped from the monitor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::backend::WorkflowBackend;
use crate::error::{EngineError, EngineResult};
use crate::ledger::RunLedger;
use crate::state::WorkflowState;

/// Polls a workflow backend for state changes of active runs.
pub struct JobMonitor {
    backend: Arc<dyn WorkflowBackend>,
    ledger: Arc<dyn RunLedger>,
    interval: Duration,
    jobs: Mutex<HashMap<String, WorkflowState>>,
    started: AtomicBool,
}

impl JobMonitor {
    pub fn new(backend: Arc<dyn WorkflowBackend>, ledger: Arc<dyn RunLedger>, interval: Duration) -> Self {
        Self {
            backend,
            ledger,
            interval,
            jobs: Mutex::new(HashMap::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Start tracking a run. The last known state has to be active.
    pub async fn add(&self, run_id: &str, state: WorkflowState) -> EngineResult<()> {
        if !state.is_active() {
            return Err(EngineError::InactiveRun(run_id.to_string()));
        }
        self.jobs.lock().await.insert(run_id.to_string(), state);
        Ok(())
    }

    /// Identifiers of the tracked runs.
    pub async fn tracked(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.jobs.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Check all tracked runs once.
    pub async fn poll_once(&self) {
        let snapshot: Vec<(String, WorkflowState)> = self
            .jobs
            .lock()
            .await
            .iter()
            .map(|(id, state)| (id.clone(), state.clone()))
            .collect();

        for (run_id, previous) in snapshot {
            let state = match self.backend.get_state(&run_id).await {
                Ok(state) => state,
                Err(e @ EngineError::UnknownRun(_)) => match previous.error(vec![e.to_string()]) {
                    Ok(state) => state,
                    Err(e) => {
                        tracing::warn!(run_id = %run_id, error = %e, "Invalid tracked state");
                        self.jobs.lock().await.remove(&run_id);
                        continue;
                    }
                },
                Err(e) => {
                    tracing::warn!(run_id = %run_id, error = %e, "Failed to get run state");
                    continue;
                }
            };

            if state.type_id() == previous.type_id() {
                continue;
            }
            tracing::debug!(run_id = %run_id, from = %previous, to = %state, "Run state changed");
            if let Err(e) = self.ledger.update_state(&run_id, &state).await {
                tracing::warn!(run_id = %run_id, error = %e, "Failed to update run ledger");
            }

            let mut jobs = self.jobs.lock().await;
            if state.is_active() {
                jobs.insert(run_id, state);
            } else {
                jobs.remove(&run_id);
            }
        }
    }

    /// Start the polling loop on a background task. The loop can be started
    /// once per monitor.
    pub fn run(self: Arc<Self>) -> EngineResult<JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(EngineError::MonitorRunning);
        }
        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                self.poll_once().await;
            }
        }))
    }
}
