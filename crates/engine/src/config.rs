//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{EngineError, EngineResult};

/// Engine configuration loaded from environment variables.
///
/// Environment variables are prefixed with `ROB_`:
/// - `ROB_BASE_DIR`: Base directory for run directories (default: ".rob/runs")
/// - `ROB_MONITOR_INTERVAL`: Job monitor poll interval in seconds (default: 1)
/// - `ROB_SHELL`: Shell used to execute workflow commands (default: "bash")
/// - `ROB_VERBOSE`: Log every executed command (default: false)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Base directory for run directories
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Monitor poll interval in seconds
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval: u64,

    /// Shell for workflow commands
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Log executed commands at info level
    #[serde(default)]
    pub verbose: bool,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".rob/runs")
}

fn default_monitor_interval() -> u64 {
    1
}

fn default_shell() -> String {
    "bash".to_string()
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> EngineResult<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Load configuration from the given key/value pairs. Only keys with the
    /// `ROB_` prefix are considered.
    pub fn from_vars<I>(vars: I) -> EngineResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed("ROB_")
            .from_iter::<_, EngineConfig>(vars)
            .map_err(|e| EngineError::Configuration(e.to_string()))
    }

    /// Monitor poll interval. Never shorter than 10 milliseconds.
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval).max(Duration::from_millis(10))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            monitor_interval: default_monitor_interval(),
            shell: default_shell(),
            verbose: false,
        }
    }
}
