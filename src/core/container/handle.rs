//=========================================================================
// Transition Handle
//=========================================================================
//
// Caller-facing token for one transition request.
//
// Architecture:
//   TransitionHandle (clone) ─┐
//   TransitionHandle (clone) ─┼─> Arc<Shared>
//   routine (container)      ─┘     ├─ Mutex<Settlement>  state / outcome / node
//                                   ├─ AtomicWaker        wakes an awaiting task
//                                   └─ CancelSource       attempt cancellation
//
// The handle can be polled (`is_done`, `error`) or awaited as a Future.
// It settles exactly once.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::task::AtomicWaker;
use parking_lot::Mutex;

//=== Internal Dependencies ===============================================

use super::TransitionState;
use crate::core::cancel::{CancelSource, CancelToken};
use crate::core::error::FlowError;
use crate::core::flow::NodeId;

//=== Shared State ========================================================

struct Settlement {
    state: TransitionState,
    outcome: Option<Result<(), FlowError>>,
    node: Option<NodeId>,
}

struct Shared {
    settlement: Mutex<Settlement>,
    waker: AtomicWaker,
    cancel: CancelSource,
}

//=== TransitionHandle ====================================================

/// Result token of a transition request.
///
/// Clones observe the same transition. Awaiting the handle yields
/// `Ok(())` on success or the [`FlowError`] that failed it.
#[derive(Clone)]
pub struct TransitionHandle {
    shared: Arc<Shared>,
}

impl TransitionHandle {
    //--- Construction -----------------------------------------------------

    pub(crate) fn pending() -> Self {
        Self::with_state(TransitionState::Pending, None)
    }

    /// A handle that has already succeeded (no-op transitions).
    pub fn completed() -> Self {
        Self::with_state(TransitionState::Succeeded, Some(Ok(())))
    }

    /// A handle that has already failed (rejected requests).
    pub fn failed(error: FlowError) -> Self {
        Self::with_state(TransitionState::Failed, Some(Err(error)))
    }

    fn with_state(state: TransitionState, outcome: Option<Result<(), FlowError>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                settlement: Mutex::new(Settlement {
                    state,
                    outcome,
                    node: None,
                }),
                waker: AtomicWaker::new(),
                cancel: CancelSource::new(),
            }),
        }
    }

    //--- Settlement (container only) --------------------------------------

    pub(crate) fn set_running(&self) {
        let mut settlement = self.shared.settlement.lock();
        if settlement.state == TransitionState::Pending {
            settlement.state = TransitionState::Running;
        }
    }

    pub(crate) fn succeed(&self) {
        self.settle(TransitionState::Succeeded, Ok(()));
    }

    pub(crate) fn fail(&self, error: FlowError) {
        self.settle(TransitionState::Failed, Err(error));
    }

    pub(crate) fn set_node(&self, node: NodeId) {
        self.shared.settlement.lock().node = Some(node);
    }

    /// Token observed by the routine running this transition.
    pub(crate) fn cancel_token(&self) -> CancelToken {
        self.shared.cancel.token()
    }

    fn settle(&self, state: TransitionState, outcome: Result<(), FlowError>) {
        {
            let mut settlement = self.shared.settlement.lock();
            if settlement.outcome.is_some() {
                return;
            }
            settlement.state = state;
            settlement.outcome = Some(outcome);
        }
        self.shared.waker.wake();
    }

    //--- Queries ----------------------------------------------------------

    pub fn state(&self) -> TransitionState {
        self.shared.settlement.lock().state
    }

    pub fn is_done(&self) -> bool {
        self.shared.settlement.lock().outcome.is_some()
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.shared.settlement.lock().outcome, Some(Ok(())))
    }

    /// Error of a failed transition.
    pub fn error(&self) -> Option<FlowError> {
        match &self.shared.settlement.lock().outcome {
            Some(Err(error)) => Some(error.clone()),
            _ => None,
        }
    }

    /// Node the flow resolved the request to (after fallback).
    pub fn node(&self) -> Option<NodeId> {
        self.shared.settlement.lock().node
    }

    /// Settled result, if any.
    pub fn result(&self) -> Option<Result<(), FlowError>> {
        self.shared.settlement.lock().outcome.clone()
    }

    //--- Control ----------------------------------------------------------

    /// Requests cancellation. Ignored once the transition has committed.
    pub fn cancel(&self) {
        self.shared.cancel.cancel();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }
}

impl Future for TransitionHandle {
    type Output = Result<(), FlowError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(result) = self.result() {
            return Poll::Ready(result);
        }

        self.shared.waker.register(cx.waker());

        // Settled between the check and the registration
        match self.result() {
            Some(result) => Poll::Ready(result),
            None => Poll::Pending,
        }
    }
}

impl fmt::Debug for TransitionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let settlement = self.shared.settlement.lock();
        f.debug_struct("TransitionHandle")
            .field("state", &settlement.state)
            .field("outcome", &settlement.outcome)
            .field("node", &settlement.node)
            .finish()
    }
}

//=========================================================================
// Tests
//=========================================================================
