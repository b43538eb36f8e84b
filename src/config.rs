use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::OrchestratorError;

/// Configuration for the scene orchestrator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Give up on a dispatched operation when its completion event has not
    /// arrived after this many milliseconds. `None` waits forever.
    pub dispatch_timeout_ms: Option<u64>,
    /// Only dispatch on a fixed tick of this many milliseconds. `None` takes
    /// a turn as soon as anything changes.
    pub turn_interval_ms: Option<u64>,
    /// Capacity of the operation report broadcast channel
    pub report_capacity: usize,
    /// Number of abandoned operations remembered to recognise late events
    pub late_event_memory: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout_ms: None,
            turn_interval_ms: None,
            report_capacity: 256,
            late_event_memory: 16,
        }
    }
}

impl OrchestratorConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self, OrchestratorError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, OrchestratorError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.report_capacity == 0 {
            return Err(OrchestratorError::Config(
                "report_capacity must be greater than zero".to_string(),
            ));
        }
        if self.dispatch_timeout_ms == Some(0) {
            return Err(OrchestratorError::Config(
                "dispatch_timeout_ms must be greater than zero when set".to_string(),
            ));
        }
        if self.turn_interval_ms == Some(0) {
            return Err(OrchestratorError::Config(
                "turn_interval_ms must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn dispatch_timeout(&self) -> Option<Duration> {
        self.dispatch_timeout_ms.map(Duration::from_millis)
    }

    pub fn turn_interval(&self) -> Option<Duration> {
        self.turn_interval_ms.map(Duration::from_millis)
    }
}
