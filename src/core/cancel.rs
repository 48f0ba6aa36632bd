//=========================================================================
// Cancellation
//=========================================================================
//
// Cooperative cancellation signals.
//
// A `CancelSource` owns the right to cancel; `CancelToken`s observe it.
// Tokens created through `CancelSource::child_of` are also cancelled when
// any ancestor is cancelled, so a loader handed a situation-scoped token
// stops when either the transition attempt or the situation goes away.
//
// Tokens are `Send + Sync` so worker threads (ThreadedLoader) can poll
// them while the flow itself stays single-threaded.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

//=== CancelToken =========================================================

/// Read side of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Box<CancelToken>>,
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: None,
        }
    }

    /// Returns true once this token or any ancestor was cancelled.
    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::Acquire) {
            return true;
        }
        self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }
}

//=== CancelSource ========================================================

/// Write side of a cancellation signal.
#[derive(Debug)]
pub struct CancelSource {
    token: CancelToken,
}

impl CancelSource {
    pub fn new() -> Self {
        Self {
            token: CancelToken::never(),
        }
    }

    /// Creates a source whose token also observes `parent`.
    pub fn child_of(parent: &CancelToken) -> Self {
        Self {
            token: CancelToken {
                flag: Arc::new(AtomicBool::new(false)),
                parent: Some(Box::new(parent.clone())),
            },
        }
    }

    /// Returns a token observing this source.
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

//=========================================================================
// Tests
//=========================================================================
