//! ROB Engine - run execution and tracking for workflow templates.
//!
//! The engine turns a workflow template plus arguments into a run:
//! - Resolve the serial workflow specification and stage input files
//! - Execute the commands through a [`StepRunner`]
//! - Track the run through its [`WorkflowState`] lifecycle
//! - Report state changes of active runs via the [`JobMonitor`]

pub mod backend;
pub mod config;
pub mod error;
pub mod ledger;
pub mod monitor;
pub mod registry;
pub mod resource;
pub mod runner;
pub mod serial;
pub mod state;
pub mod uploader;

pub use backend::{PoolBackend, SyncBackend, WorkflowBackend};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use ledger::{LogLedger, RunLedger};
pub use monitor::JobMonitor;
pub use registry::{RunEntry, RunRegistry};
pub use resource::{FileResource, Resource, ResourceSet};
pub use runner::{ShellRunner, StepResult, StepRunner, StepStatus};
pub use serial::SerialWorkflow;
pub use state::{StateError, StatePending, StateRunning, StateSuccess, WorkflowState};
pub use uploader::{FileCopy, FileUploader};
