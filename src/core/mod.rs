//! Core of the scene queue
//!
//! This module contains the operation model, the host adapter contract and
//! the orchestration layer that sequences operations against a host.

pub mod correlator;
pub mod descriptor;
pub mod error;
pub mod host;
pub mod metrics;
pub mod orchestrator;
pub mod queue;
pub mod sequencer;
pub mod transition;
