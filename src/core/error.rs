//! Error types for the scene queue
//!
//! Invalid requests and orphaned host events are recovered locally and never
//! show up here. Dispatch failures are reported once and the queue moves on.

use thiserror::Error;

use crate::core::queue::QueuedOperation;

/// Synchronous rejection returned by a host adapter when asked to dispatch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The host has no scene with this name
    #[error("unknown scene '{0}'")]
    UnknownScene(String),

    /// An unload was requested for a scene that is not loaded
    #[error("scene '{0}' is not loaded")]
    NotLoaded(String),

    /// The host refused the request for its own reasons
    #[error("host rejected the request: {0}")]
    Rejected(String),
}

/// Why a dispatched operation ended without completing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    #[error(transparent)]
    Host(#[from] HostError),

    /// No completion event arrived within the configured dispatch timeout
    #[error("no completion event within {0} ms")]
    TimedOut(u64),
}

/// Caller-visible report of a failed dispatch
#[derive(Error, Debug, Clone)]
#[error("operation {} ({}) failed: {reason}", .operation.id, .operation.descriptor)]
pub struct DispatchFailure {
    pub operation: QueuedOperation,
    pub reason: FailureReason,
}

/// Errors of the orchestrator API itself
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// A transition scene was already registered for this session
    #[error("transition scene already registered as '{0}'")]
    TransitionAlreadyRegistered(String),

    /// The transition scene name is empty or unknown to the host
    #[error("invalid transition scene '{0}'")]
    InvalidTransitionScene(String),

    /// The driver has shut down
    #[error("orchestrator has shut down")]
    Shutdown,

    /// The driver task ended abnormally
    #[error("orchestrator driver failed: {0}")]
    Driver(String),

    /// Configuration values out of range
    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
