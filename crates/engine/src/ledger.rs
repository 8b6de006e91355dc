//! Run ledgers receive state changes observed by the job monitor.

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::state::WorkflowState;

/// External record of run states.
#[async_trait]
pub trait RunLedger: Send + Sync {
    async fn update_state(&self, run_id: &str, state: &WorkflowState) -> EngineResult<()>;
}

/// Ledger that writes state changes to the log.
#[derive(Debug, Default, Clone)]
pub struct LogLedger;

#[async_trait]
impl RunLedger for LogLedger {
    async fn update_state(&self, run_id: &str, state: &WorkflowState) -> EngineResult<()> {
        if state.is_error() {
            tracing::warn!(run_id = %run_id, state = %state, messages = ?state.messages(), "Run state changed");
        } else {
            tracing::info!(run_id = %run_id, state = %state, "Run state changed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateRunning;

    #[tokio::test]
    async fn test_log_ledger_accepts_updates() {
        let ledger = LogLedger;
        let running = StateRunning::new();
        assert!(ledger.update_state("r1", &running.clone().into()).await.is_ok());
        let failed = WorkflowState::from(running.error(vec!["x failed".to_string()]));
        assert!(ledger.update_state("r1", &failed).await.is_ok());
    }
}
