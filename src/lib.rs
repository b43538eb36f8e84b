//! Strictly ordered load/unload orchestration for scene hosts that report
//! completion through events instead of return values.
//!
//! A [`SceneOrchestrator`] keeps a FIFO of operations and sends exactly one
//! of them at a time to a [`SceneHost`]. The next operation is dispatched
//! only after the host emits a matching `Load`/`Unload` event for the
//! current one, or refuses it outright.

pub mod adapters;
pub mod config;
pub mod core;

pub use crate::adapters::memory::InMemorySceneHost;
pub use crate::config::OrchestratorConfig;
pub use crate::core::descriptor::{
    LoadMode, OperationDescriptor, OperationId, OperationKind, OperationRequest,
};
pub use crate::core::error::{DispatchFailure, FailureReason, HostError, OrchestratorError};
pub use crate::core::host::{HostEvent, HostEventSender, SceneHost, SubscriptionId};
pub use crate::core::metrics::OrchestratorStats;
pub use crate::core::orchestrator::{
    ErrorHandler, OperationReport, OrchestratorStatus, SceneOrchestrator,
};
pub use crate::core::sequencer::{OperationOutcome, Sequencer, SequencerState};
