use std::collections::VecDeque;

use log::debug;

use crate::core::descriptor::OperationId;
use crate::core::host::HostEvent;
use crate::core::queue::QueuedOperation;

/// What a host event turned out to mean for the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    /// The event completes the in-flight head
    Matched(OperationId),
    /// The event belongs to an operation that was already abandoned after a timeout
    Late(OperationId),
    /// Nothing in flight is waiting for this event
    Orphaned,
}

/// Matches host events against the in-flight head of the queue.
///
/// Host events only name a scene and a kind, never an operation id. The
/// in-flight head is always checked first, so a late event for an abandoned
/// operation still completes a newer head that targets the same scene the
/// same way. Abandoned operations only absorb events nothing in flight wants.
#[derive(Debug)]
pub struct EventCorrelator {
    /// Operations given up on, most recent last
    abandoned: VecDeque<QueuedOperation>,
    /// How many abandoned operations to remember
    memory: usize,
}

impl EventCorrelator {
    pub fn new(memory: usize) -> Self {
        Self {
            abandoned: VecDeque::with_capacity(memory),
            memory,
        }
    }

    /// Classify an event. `in_flight` is the dispatched head, if the
    /// orchestrator is currently waiting for one.
    pub fn correlate(
        &mut self,
        event: &HostEvent,
        in_flight: Option<&QueuedOperation>,
    ) -> Correlation {
        if let Some(head) = in_flight {
            if head.descriptor.is_completed_by(&event.scene, event.kind) {
                return Correlation::Matched(head.id);
            }
        }

        let late = self
            .abandoned
            .iter()
            .position(|op| op.descriptor.is_completed_by(&event.scene, event.kind));
        if let Some(index) = late {
            // Each abandoned operation absorbs at most one late event.
            if let Some(op) = self.abandoned.remove(index) {
                debug!("Late {} event for abandoned operation {}", event.kind, op.id);
                return Correlation::Late(op.id);
            }
        }

        debug!("Discarding orphaned {} event for '{}'", event.kind, event.scene);
        Correlation::Orphaned
    }

    /// Remember an operation whose completion event may still show up
    pub fn abandon(&mut self, operation: QueuedOperation) {
        if self.memory == 0 {
            return;
        }
        if self.abandoned.len() == self.memory {
            self.abandoned.pop_front();
        }
        self.abandoned.push_back(operation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::descriptor::{LoadMode, OperationDescriptor};

    fn op(id: u64, descriptor: OperationDescriptor) -> QueuedOperation {
        QueuedOperation {
            id: OperationId(id),
            descriptor,
        }
    }

    // Test that name matching ignores case but kind must agree
    #[test]
    fn test_match_requires_name_and_kind() {
        let mut correlator = EventCorrelator::new(4);
        let head = op(1, OperationDescriptor::load("Arena", LoadMode::Additive));

        assert_eq!(
            correlator.correlate(&HostEvent::loaded("arena"), Some(&head)),
            Correlation::Matched(OperationId(1))
        );
        assert_eq!(
            correlator.correlate(&HostEvent::unloaded("Arena"), Some(&head)),
            Correlation::Orphaned
        );
        assert_eq!(
            correlator.correlate(&HostEvent::loaded("Lobby"), Some(&head)),
            Correlation::Orphaned
        );
    }

    #[test]
    fn test_nothing_in_flight_is_orphaned() {
        let mut correlator = EventCorrelator::new(4);
        assert_eq!(
            correlator.correlate(&HostEvent::loaded("Arena"), None),
            Correlation::Orphaned
        );
    }

    // Test that an abandoned operation absorbs exactly one late event
    #[test]
    fn test_late_event_after_abandon() {
        let mut correlator = EventCorrelator::new(1);
        correlator.abandon(op(3, OperationDescriptor::load("Old", LoadMode::Additive)));
        correlator.abandon(op(7, OperationDescriptor::unload("Arena")));

        assert_eq!(
            correlator.correlate(&HostEvent::loaded("Old"), None),
            Correlation::Orphaned
        );
        assert_eq!(
            correlator.correlate(&HostEvent::unloaded("arena"), None),
            Correlation::Late(OperationId(7))
        );
        assert_eq!(
            correlator.correlate(&HostEvent::unloaded("arena"), None),
            Correlation::Orphaned
        );
    }
}
