use serde::{Deserialize, Serialize};

use crate::core::correlator::Correlation;
use crate::core::error::FailureReason;
use crate::core::sequencer::{OperationOutcome, Settled};

/// Running counters for one orchestrator session.
///
/// Transition descriptors are kept out of the caller-facing counters and
/// tallied separately.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrchestratorStats {
    /// Caller operations that completed
    pub completed: u64,
    /// Caller operations whose dispatch failed (timeouts included)
    pub failed: u64,
    /// Dispatches abandoned because no completion event arrived in time
    pub timed_out: u64,
    /// Requests dropped by validation
    pub rejected: u64,
    /// Operations cleared by cancellation or shutdown
    pub cancelled: u64,
    /// Host events nothing was waiting for
    pub orphaned_events: u64,
    /// Host events for operations already abandoned
    pub late_events: u64,
    /// Transition scene loads/unloads that completed
    pub transitions_completed: u64,
    /// Transition scene loads/unloads that failed
    pub transitions_failed: u64,
}

impl OrchestratorStats {
    /// Record an operation reaching a terminal state
    pub fn record_settled(&mut self, settled: &Settled) {
        let is_transition = settled.operation.descriptor.is_transition();
        match &settled.outcome {
            OperationOutcome::Completed if is_transition => self.transitions_completed += 1,
            OperationOutcome::Completed => self.completed += 1,
            OperationOutcome::Failed(reason) => {
                if matches!(reason, FailureReason::TimedOut(_)) {
                    self.timed_out += 1;
                }
                if is_transition {
                    self.transitions_failed += 1;
                } else {
                    self.failed += 1;
                }
            }
            OperationOutcome::Cancelled => self.cancelled += 1,
            OperationOutcome::Rejected => self.rejected += 1,
        }
    }

    pub fn record_rejected(&mut self) {
        self.rejected += 1;
    }

    /// Record a host event that did not complete the in-flight head
    pub fn record_unmatched(&mut self, correlation: &Correlation) {
        match correlation {
            Correlation::Late(_) => self.late_events += 1,
            Correlation::Orphaned => self.orphaned_events += 1,
            Correlation::Matched(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::descriptor::{LoadMode, OperationDescriptor, OperationId, OperationKind};
    use crate::core::queue::QueuedOperation;

    fn settled(descriptor: OperationDescriptor, outcome: OperationOutcome) -> Settled {
        Settled {
            operation: QueuedOperation {
                id: OperationId(1),
                descriptor,
            },
            outcome,
        }
    }

    // Test that transitions stay out of the caller counters
    #[test]
    fn test_transitions_counted_separately() {
        let mut stats = OrchestratorStats::default();
        stats.record_settled(&settled(
            OperationDescriptor::transition("Loading", OperationKind::Load),
            OperationOutcome::Completed,
        ));
        stats.record_settled(&settled(
            OperationDescriptor::load("Level", LoadMode::Additive),
            OperationOutcome::Completed,
        ));
        stats.record_settled(&settled(
            OperationDescriptor::unload("Level"),
            OperationOutcome::Failed(FailureReason::TimedOut(50)),
        ));

        assert_eq!(stats.completed, 1);
        assert_eq!(stats.transitions_completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.transitions_failed, 0);
    }
}
