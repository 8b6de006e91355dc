//! Engine error types.

use rob_templates::TemplateError;
use thiserror::Error;

/// Errors raised by the run engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// Template or argument error raised while preparing a run.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// A run with the given identifier already exists.
    #[error("Duplicate run: {0}")]
    DuplicateRun(String),

    /// No run with the given identifier exists.
    #[error("Unknown run: {0}")]
    UnknownRun(String),

    /// Operation not allowed while the run is pending or running.
    #[error("Run is active: {0}")]
    ActiveRun(String),

    /// Operation requires a pending or running run.
    #[error("Run is not active: {0}")]
    InactiveRun(String),

    /// State transition not defined for the current state.
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// The job monitor loop was started before.
    #[error("Job monitor is already running")]
    MonitorRunning,

    /// Run ledger update failed.
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Json(e.to_string())
    }
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::UnknownRun("abc".to_string());
        assert_eq!(err.to_string(), "Unknown run: abc");

        let err: EngineError = TemplateError::MissingArgument("names".to_string()).into();
        assert_eq!(err.to_string(), "Missing argument for 'names'");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: EngineError = io_err.into();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
