//! Registry of runs managed by the pool backend.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio::task::AbortHandle;

use crate::state::WorkflowState;

/// Registry entry for a single run.
#[derive(Debug)]
pub struct RunEntry {
    pub state: WorkflowState,
    /// Handle of the worker task while the run is executing.
    pub worker: Option<AbortHandle>,
}

/// Run states keyed by run identifier, guarded by a single mutex.
///
/// The lock is held only for the duration of a map access.
#[derive(Debug, Default)]
pub struct RunRegistry {
    runs: Mutex<HashMap<String, RunEntry>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a run. Returns false if the identifier is taken.
    pub async fn insert(&self, run_id: &str, state: WorkflowState, worker: Option<AbortHandle>) -> bool {
        let mut runs = self.runs.lock().await;
        if runs.contains_key(run_id) {
            return false;
        }
        runs.insert(run_id.to_string(), RunEntry { state, worker });
        true
    }

    /// Current state of a run.
    pub async fn read(&self, run_id: &str) -> Option<WorkflowState> {
        self.runs.lock().await.get(run_id).map(|entry| entry.state.clone())
    }

    /// Replace the state of a run and release its worker handle. Returns
    /// false if the run is not registered.
    pub async fn update(&self, run_id: &str, state: WorkflowState) -> bool {
        match self.runs.lock().await.get_mut(run_id) {
            Some(entry) => {
                entry.state = state;
                entry.worker = None;
                true
            }
            None => false,
        }
    }

    /// Attach the worker handle of a registered run.
    pub async fn set_worker(&self, run_id: &str, worker: AbortHandle) -> bool {
        match self.runs.lock().await.get_mut(run_id) {
            Some(entry) => {
                entry.worker = Some(worker);
                true
            }
            None => false,
        }
    }

    /// Remove a run.
    pub async fn remove(&self, run_id: &str) -> Option<RunEntry> {
        self.runs.lock().await.remove(run_id)
    }

    pub async fn len(&self) -> usize {
        self.runs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceSet;
    use crate::state::StateRunning;

    #[tokio::test]
    async fn test_insert_read_update_remove() {
        let registry = RunRegistry::new();
        let running = WorkflowState::from(StateRunning::new());

        assert!(registry.insert("r1", running.clone(), None).await);
        assert!(!registry.insert("r1", running.clone(), None).await);
        assert_eq!(registry.read("r1").await, Some(running.clone()));

        let success = WorkflowState::Success(StateRunning::new().success(ResourceSet::new()));
        assert!(registry.update("r1", success.clone()).await);
        assert!(!registry.update("r2", success.clone()).await);
        assert_eq!(registry.read("r1").await, Some(success));

        let entry = registry.remove("r1").await.unwrap();
        assert!(entry.worker.is_none());
        assert!(registry.read("r1").await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_releases_worker() {
        let registry = RunRegistry::new();
        let task = tokio::spawn(async {});
        registry
            .insert("r1", WorkflowState::from(StateRunning::new()), Some(task.abort_handle()))
            .await;
        registry
            .update("r1", WorkflowState::from(StateRunning::new().error(vec![])))
            .await;
        assert!(registry.remove("r1").await.unwrap().worker.is_none());
    }
}
