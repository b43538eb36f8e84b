use std::collections::VecDeque;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::core::descriptor::{OperationDescriptor, OperationId, OperationRequest};
use crate::core::host::SceneHost;
use crate::core::transition::TransitionPolicy;

/// A descriptor together with the identifier it was queued under
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueuedOperation {
    /// Identifier assigned on append
    pub id: OperationId,
    /// The work to perform
    pub descriptor: OperationDescriptor,
}

/// FIFO of pending operations.
///
/// Insertion order is execution order. The same target may appear any
/// number of times; nothing is deduplicated or reordered.
#[derive(Debug)]
pub struct OperationQueue {
    /// Pending operations, head first
    items: VecDeque<QueuedOperation>,
    /// Next identifier to hand out
    next_id: u64,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
            next_id: 1,
        }
    }

    /// Validate a request, wrap it with `policy` and append the result.
    ///
    /// The request is dropped silently when its target is empty or unknown
    /// to the host. Returns the id of the caller's own descriptor.
    pub fn enqueue(
        &mut self,
        request: OperationRequest,
        policy: &TransitionPolicy,
        host: &dyn SceneHost,
    ) -> Option<OperationId> {
        let OperationRequest {
            descriptor,
            use_transition,
        } = request;

        let target = descriptor.target();
        if target.is_empty() || !host.is_known(target) {
            debug!("Dropping invalid request: {}", descriptor);
            return None;
        }

        let mut caller_id = None;
        for item in policy.wrap(descriptor, use_transition) {
            let is_transition = item.is_transition();
            let id = self.push(item);
            if !is_transition {
                caller_id = Some(id);
            }
        }
        caller_id
    }

    fn push(&mut self, descriptor: OperationDescriptor) -> OperationId {
        let id = OperationId(self.next_id);
        self.next_id += 1;
        self.items.push_back(QueuedOperation { id, descriptor });
        id
    }

    pub fn peek(&self) -> Option<&QueuedOperation> {
        self.items.front()
    }

    pub fn pop(&mut self) -> Option<QueuedOperation> {
        self.items.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Remove every pending operation, returning them in queue order
    pub fn clear(&mut self) -> Vec<QueuedOperation> {
        self.items.drain(..).collect()
    }
}

impl Default for OperationQueue {
    fn default() -> Self {
        Self::new()
    }
}
