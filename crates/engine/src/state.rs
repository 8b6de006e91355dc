//! Workflow run states.
//!
//! A run is in one of four states. Pending and running runs are active,
//! error and success are terminal. Transitions consume nothing and return a
//! new state value:
//!
//! | From    | Transition | To      |
//! |---------|------------|---------|
//! | Pending | start      | Running |
//! | Pending | error      | Error   |
//! | Running | success    | Success |
//! | Running | error      | Error   |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::resource::ResourceSet;

pub const STATE_PENDING: &str = "PENDING";
pub const STATE_RUNNING: &str = "RUNNING";
pub const STATE_ERROR: &str = "ERROR";
pub const STATE_SUCCESS: &str = "SUCCESS";

/// Run that is waiting to be started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePending {
    pub created_at: DateTime<Utc>,
}

impl StatePending {
    pub fn new() -> Self {
        Self { created_at: Utc::now() }
    }

    pub fn start(&self) -> StateRunning {
        StateRunning {
            created_at: self.created_at,
            started_at: Utc::now(),
        }
    }

    pub fn error(&self, messages: Vec<String>) -> StateError {
        let now = Utc::now();
        StateError {
            created_at: self.created_at,
            started_at: now,
            stopped_at: now,
            messages,
        }
    }
}

impl Default for StatePending {
    fn default() -> Self {
        Self::new()
    }
}

/// Run that is being executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateRunning {
    pub created_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
}

impl StateRunning {
    /// Running state for a run that is created and started at once.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            started_at: now,
        }
    }

    pub fn success(&self, resources: ResourceSet) -> StateSuccess {
        StateSuccess {
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: Utc::now(),
            resources,
        }
    }

    pub fn error(&self, messages: Vec<String>) -> StateError {
        StateError {
            created_at: self.created_at,
            started_at: self.started_at,
            stopped_at: Utc::now(),
            messages,
        }
    }
}

impl Default for StateRunning {
    fn default() -> Self {
        Self::new()
    }
}

/// Run that terminated with an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateError {
    pub created_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<String>,
}

/// Run that finished successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSuccess {
    pub created_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default)]
    pub resources: ResourceSet,
}

/// State of a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum WorkflowState {
    Pending(StatePending),
    Running(StateRunning),
    Error(StateError),
    Success(StateSuccess),
}

impl WorkflowState {
    pub fn type_id(&self) -> &'static str {
        match self {
            Self::Pending(_) => STATE_PENDING,
            Self::Running(_) => STATE_RUNNING,
            Self::Error(_) => STATE_ERROR,
            Self::Success(_) => STATE_SUCCESS,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Pending(s) => s.created_at,
            Self::Running(s) => s.created_at,
            Self::Error(s) => s.created_at,
            Self::Success(s) => s.created_at,
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Pending(_) => None,
            Self::Running(s) => Some(s.started_at),
            Self::Error(s) => Some(s.started_at),
            Self::Success(s) => Some(s.started_at),
        }
    }

    /// True for pending and running runs.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending(_) | Self::Running(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Error messages of a failed run.
    pub fn messages(&self) -> &[String] {
        match self {
            Self::Error(s) => &s.messages,
            _ => &[],
        }
    }

    /// Resources of a successful run.
    pub fn resources(&self) -> Option<&ResourceSet> {
        match self {
            Self::Success(s) => Some(&s.resources),
            _ => None,
        }
    }

    /// Transition an active state into the error state.
    pub fn error(&self, messages: Vec<String>) -> EngineResult<WorkflowState> {
        match self {
            Self::Pending(s) => Ok(Self::Error(s.error(messages))),
            Self::Running(s) => Ok(Self::Error(s.error(messages))),
            other => Err(EngineError::InvalidTransition(format!(
                "cannot change {} to {}",
                other.type_id(),
                STATE_ERROR
            ))),
        }
    }
}

impl From<StatePending> for WorkflowState {
    fn from(s: StatePending) -> Self {
        Self::Pending(s)
    }
}

impl From<StateRunning> for WorkflowState {
    fn from(s: StateRunning) -> Self {
        Self::Running(s)
    }
}

impl From<StateError> for WorkflowState {
    fn from(s: StateError) -> Self {
        Self::Error(s)
    }
}

impl From<StateSuccess> for WorkflowState {
    fn from(s: StateSuccess) -> Self {
        Self::Success(s)
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.type_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;
    use chrono::Duration;

    fn created() -> StatePending {
        StatePending {
            created_at: Utc::now() - Duration::seconds(60),
        }
    }

    #[test]
    fn test_pending_start() {
        let pending = created();
        let running = pending.start();
        assert_eq!(running.created_at, pending.created_at);
        assert!(running.started_at > pending.created_at);
        assert!(WorkflowState::from(running).is_running());
    }

    #[test]
    fn test_pending_error() {
        let pending = created();
        let error = pending.error(vec!["failed".to_string()]);
        assert_eq!(error.created_at, pending.created_at);
        assert_eq!(error.started_at, error.stopped_at);
        assert_eq!(error.messages, vec!["failed"]);
    }

    #[test]
    fn test_running_transitions_keep_timestamps() {
        let running = created().start();

        let success = running.success(ResourceSet::new());
        assert_eq!(success.created_at, running.created_at);
        assert_eq!(success.started_at, running.started_at);
        assert!(success.finished_at >= running.started_at);

        let error = running.error(vec!["x failed".to_string()]);
        assert_eq!(error.created_at, running.created_at);
        assert_eq!(error.started_at, running.started_at);
        assert!(error.stopped_at >= running.started_at);
    }

    #[test]
    fn test_state_predicates() {
        let pending = WorkflowState::from(created());
        assert!(pending.is_active() && pending.is_pending());

        let running = WorkflowState::from(StateRunning::new());
        assert!(running.is_active() && running.is_running());

        let error = running.error(vec![]).unwrap();
        assert!(!error.is_active() && error.is_error());

        let success = WorkflowState::from(StateRunning::new().success(ResourceSet::new()));
        assert!(!success.is_active() && success.is_success());
    }

    #[test]
    fn test_terminal_states_not_transitioned() {
        let error = WorkflowState::from(StateRunning::new().error(vec![]));
        assert!(matches!(error.error(vec![]), Err(EngineError::InvalidTransition(_))));

        let success = WorkflowState::from(StateRunning::new().success(ResourceSet::new()));
        assert!(matches!(success.error(vec![]), Err(EngineError::InvalidTransition(_))));
    }

    #[test]
    fn test_serialization() {
        let mut resources = ResourceSet::new();
        resources.insert(Resource::file("results/greetings.txt", "/runs/1/results/greetings.txt"));
        let state = WorkflowState::from(StateRunning::new().success(resources));

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["type"], "SUCCESS");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("finishedAt").is_some());
        assert_eq!(json["resources"][0]["id"], "results/greetings.txt");
        assert_eq!(json["resources"][0]["type"], "file");

        let parsed: WorkflowState = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, state);

        let error = WorkflowState::from(StateRunning::new().error(vec!["x failed".to_string()]));
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["type"], "ERROR");
        assert!(json.get("stoppedAt").is_some());
        assert_eq!(json["messages"][0], "x failed");
    }
}
