//=========================================================================
// Request Queue
//=========================================================================
//
// Navigation requests raised from inside situations.
//
// Situations cannot call into the flow while the flow is calling them, so
// they queue requests here during their hooks. The flow drains the queue
// at the tick boundary, once no transition is in flight.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::VecDeque;

//=== Internal Dependencies ===============================================

use crate::core::flow::NodeId;

//=== FlowRequest =========================================================

/// Navigation operation requested from within the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowRequest {
    /// Transition to a node (resolved through edges and fallbacks).
    Transition(NodeId),

    /// Pop the navigation stack by one.
    Back,

    /// Tear down to the root and re-enter it.
    Reset,
}

//=== RequestQueue ========================================================

/// FIFO of pending [`FlowRequest`]s.
#[derive(Debug, Default)]
pub struct RequestQueue {
    queue: VecDeque<FlowRequest>,
}

impl RequestQueue {
    /// Creates a new empty request queue.
    pub fn new() -> Self {
        Self { queue: VecDeque::new() }
    }

    /// Queues a request to be processed at the next tick boundary.
    pub fn push(&mut self, request: FlowRequest) {
        self.queue.push_back(request);
    }

    /// Shorthand for `push(FlowRequest::Transition(node))`.
    pub fn transition(&mut self, node: NodeId) {
        self.push(FlowRequest::Transition(node));
    }

    /// Shorthand for `push(FlowRequest::Back)`.
    pub fn back(&mut self) {
        self.push(FlowRequest::Back);
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlowRequest> {
        self.queue.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn clear(&mut self) {
        self.queue.clear()
    }

    /// Removes and returns the oldest request.
    pub fn pop_front(&mut self) -> Option<FlowRequest> {
        self.queue.pop_front()
    }

    /// Takes all requests, leaving the queue empty.
    pub fn take(&mut self) -> Vec<FlowRequest> {
        self.queue.drain(..).collect()
    }
}

//=========================================================================
// Tests
//=========================================================================
