//! Drive-loop state machine
//!
//! The sequencer owns the operation queue and decides what happens next,
//! but performs no I/O itself. The async driver in
//! [`crate::core::orchestrator`] feeds it requests, dispatch results and
//! host events, and executes the dispatches it asks for. Keeping the two
//! apart lets every ordering rule be tested without a runtime.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::core::correlator::{Correlation, EventCorrelator};
use crate::core::descriptor::{OperationId, OperationRequest};
use crate::core::error::FailureReason;
use crate::core::host::{HostEvent, SceneHost};
use crate::core::metrics::OrchestratorStats;
use crate::core::queue::{OperationQueue, QueuedOperation};
use crate::core::transition::TransitionPolicy;

/// Terminal state of a single operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// The host reported completion
    Completed,
    /// The dispatch was refused or timed out
    Failed(FailureReason),
    /// Cleared from the queue before or instead of running
    Cancelled,
    /// Dropped by validation; never queued
    Rejected,
}

/// An operation that just reached its terminal state
#[derive(Debug, Clone)]
pub struct Settled {
    pub operation: QueuedOperation,
    pub outcome: OperationOutcome,
}

/// Result of one scheduling turn
#[derive(Debug)]
pub enum Tick {
    /// Queue empty; nothing to do
    Idle,
    /// An operation is already in flight
    Busy,
    /// Send this operation to the host, then report the result
    Dispatch(QueuedOperation),
    /// Cancellation finished; these pending operations were cleared
    Cancelled(Vec<Settled>),
}

/// Effect of a host event on the queue
#[derive(Debug)]
pub enum EventDisposition {
    /// The in-flight head completed and was popped
    Completed(Settled),
    /// The event matched nothing in flight and was discarded
    Discarded(Correlation),
}

/// Observable orchestrator state flags
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SequencerState {
    /// Drive loop is active (between first dispatch and queue empty)
    pub is_working: bool,
    /// Head has been dispatched and its completion event is outstanding
    pub is_waiting_for_event: bool,
    /// A cancel was requested and has not finished yet
    pub cancellation_requested: bool,
}

#[derive(Debug)]
pub struct Sequencer {
    /// Pending operations; the in-flight one stays at the head until settled
    queue: OperationQueue,
    /// Transition bracketing
    policy: TransitionPolicy,
    /// Host event matching
    correlator: EventCorrelator,
    /// Head that has been handed out for dispatch
    in_flight: Option<QueuedOperation>,
    /// Drive loop active flag
    working: bool,
    /// Pending cancellation
    cancellation_requested: bool,
    /// Session counters
    stats: OrchestratorStats,
}

impl Sequencer {
    pub fn new(late_event_memory: usize) -> Self {
        Self {
            queue: OperationQueue::new(),
            policy: TransitionPolicy::new(),
            correlator: EventCorrelator::new(late_event_memory),
            in_flight: None,
            working: false,
            cancellation_requested: false,
            stats: OrchestratorStats::default(),
        }
    }

    pub fn register_transition(&mut self, name: &str) {
        self.policy.register(name);
    }

    /// Validate, wrap and queue a request. Returns the id of the caller's
    /// own descriptor, or `None` when the request was dropped.
    pub fn submit(
        &mut self,
        request: OperationRequest,
        host: &dyn SceneHost,
    ) -> Option<OperationId> {
        let id = self.queue.enqueue(request, &self.policy, host);
        if id.is_none() {
            self.stats.record_rejected();
        }
        id
    }

    /// Advance the drive loop by one scheduling turn
    pub fn tick(&mut self) -> Tick {
        if self.in_flight.is_some() {
            return Tick::Busy;
        }

        if self.cancellation_requested {
            let cleared = self.queue.clear();
            info!("Cancellation complete, cleared {} pending operation(s)", cleared.len());
            let settled = cleared
                .into_iter()
                .map(|operation| self.settle(operation, OperationOutcome::Cancelled))
                .collect();
            self.cancellation_requested = false;
            self.working = false;
            return Tick::Cancelled(settled);
        }

        match self.queue.peek() {
            None => {
                self.working = false;
                Tick::Idle
            }
            Some(head) => {
                let head = head.clone();
                debug!("Dispatching {} {}", head.id, head.descriptor);
                self.working = true;
                self.in_flight = Some(head.clone());
                Tick::Dispatch(head)
            }
        }
    }

    /// The host refused the in-flight dispatch; pop it without waiting for an event
    pub fn on_dispatch_failed(&mut self, reason: FailureReason) -> Option<Settled> {
        let operation = self.pop_in_flight()?;
        self.working = false;
        Some(self.settle(operation, OperationOutcome::Failed(reason)))
    }

    /// Give up on the in-flight operation `id` after its timeout elapsed
    pub fn on_timeout(&mut self, id: OperationId, reason: FailureReason) -> Option<Settled> {
        if self.in_flight.as_ref().map(|op| op.id) != Some(id) {
            return None;
        }
        let operation = self.pop_in_flight()?;
        warn!("Abandoning {} {}: {}", operation.id, operation.descriptor, reason);
        self.correlator.abandon(operation.clone());
        self.working = false;
        Some(self.settle(operation, OperationOutcome::Failed(reason)))
    }

    /// Feed a host event through the correlator
    pub fn on_host_event(&mut self, event: &HostEvent) -> EventDisposition {
        let in_flight = if self.working { self.in_flight.as_ref() } else { None };
        match self.correlator.correlate(event, in_flight) {
            Correlation::Matched(id) => match self.pop_in_flight() {
                Some(operation) => {
                    debug!("Completed {} {}", id, operation.descriptor);
                    EventDisposition::Completed(self.settle(operation, OperationOutcome::Completed))
                }
                None => EventDisposition::Discarded(Correlation::Orphaned),
            },
            other => {
                self.stats.record_unmatched(&other);
                EventDisposition::Discarded(other)
            }
        }
    }

    /// Stop dispatching; pending work is cleared once nothing is in flight
    pub fn cancel(&mut self) {
        if !self.cancellation_requested {
            info!(
                "Cancellation requested with {} queued operation(s)",
                self.queue.len()
            );
        }
        self.cancellation_requested = true;
    }

    /// Cancel everything immediately, in-flight operation included. Used on shutdown.
    pub fn cancel_all(&mut self) -> Vec<Settled> {
        self.in_flight = None;
        self.cancellation_requested = false;
        self.working = false;
        self.queue
            .clear()
            .into_iter()
            .map(|operation| self.settle(operation, OperationOutcome::Cancelled))
            .collect()
    }

    pub fn state(&self) -> SequencerState {
        SequencerState {
            is_working: self.working,
            is_waiting_for_event: self.in_flight.is_some(),
            cancellation_requested: self.cancellation_requested,
        }
    }

    pub fn in_flight(&self) -> Option<&QueuedOperation> {
        self.in_flight.as_ref()
    }

    /// Operations still queued, the in-flight head included
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> &OrchestratorStats {
        &self.stats
    }

    fn pop_in_flight(&mut self) -> Option<QueuedOperation> {
        let in_flight = self.in_flight.take()?;
        match self.queue.peek() {
            Some(head) if head.id == in_flight.id => self.queue.pop(),
            _ => {
                warn!("In-flight operation {} is no longer at the queue head", in_flight.id);
                Some(in_flight)
            }
        }
    }

    fn settle(&mut self, operation: QueuedOperation, outcome: OperationOutcome) -> Settled {
        let settled = Settled { operation, outcome };
        self.stats.record_settled(&settled);
        settled
    }
}
