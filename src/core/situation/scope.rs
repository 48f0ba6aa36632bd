//=========================================================================
// Situation Scope
//=========================================================================
//
// Cancellation and cleanup boundary tied to a situation's loaded lifetime.
//
// Lifecycle:
//   open()  ── at Loading ──> live token, empty acquisitions/disposers
//   close() ── at unload  ──> token cancelled, disposers run (LIFO),
//                             every acquired preload key released once
//
// The scope is independent of transition attempts: a live situation's
// own subscriptions are never cancelled by an unrelated transition.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::fmt;

use log::debug;

//=== Internal Dependencies ===============================================

use crate::core::cancel::{CancelSource, CancelToken};
use crate::core::context::FlowContext;

//=== Type Aliases ========================================================

type Disposer = Box<dyn FnOnce(&mut FlowContext)>;

//=== SituationScope ======================================================

/// Per-situation cancellation scope, valid while the situation is loaded.
#[derive(Default)]
pub struct SituationScope {
    cancel: Option<CancelSource>,
    acquired: Vec<String>,
    disposers: Vec<Disposer>,
}

impl SituationScope {
    /// Returns true between load start and unload.
    pub fn is_live(&self) -> bool {
        self.cancel.is_some()
    }

    /// Token cancelled when the situation unloads.
    ///
    /// Outside the loaded lifetime an already-cancelled token is returned.
    pub fn token(&self) -> CancelToken {
        match &self.cancel {
            Some(source) => source.token(),
            None => {
                let dead = CancelSource::new();
                dead.cancel();
                dead.token()
            }
        }
    }

    /// Registers `disposer` to run when the scope closes.
    pub fn defer<F>(&mut self, disposer: F)
    where
        F: FnOnce(&mut FlowContext) + 'static,
    {
        self.disposers.push(Box::new(disposer));
    }

    /// Preload keys acquired through this scope and not yet released.
    pub fn acquired(&self) -> &[String] {
        &self.acquired
    }

    //--- Lifecycle (container only) ---------------------------------------

    pub(crate) fn open(&mut self) {
        self.cancel = Some(CancelSource::new());
    }

    pub(crate) fn record_acquire(&mut self, key: &str) {
        self.acquired.push(key.to_string());
    }

    /// Cancels the token, runs disposers newest-first and releases every
    /// acquired key. Safe to call on a scope that is not live.
    pub(crate) fn close(&mut self, cx: &mut FlowContext) {
        if let Some(source) = self.cancel.take() {
            source.cancel();
        }

        while let Some(disposer) = self.disposers.pop() {
            disposer(cx);
        }

        for key in self.acquired.drain(..) {
            cx.preload.release(&key);
        }

        debug!("Scope closed");
    }
}

impl fmt::Debug for SituationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SituationScope")
            .field("live", &self.is_live())
            .field("acquired", &self.acquired)
            .field("disposers", &self.disposers.len())
            .finish()
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::preload::PreloadCache;
    use crate::core::testing::ManualLoader;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn token_lives_only_while_open() {
        let mut scope = SituationScope::default();
        assert!(scope.token().is_cancelled());

        scope.open();
        let token = scope.token();
        assert!(!token.is_cancelled());

        scope.close(&mut FlowContext::default());
        assert!(token.is_cancelled());
        assert!(!scope.is_live());
    }

    #[test]
    fn close_runs_disposers_newest_first() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut scope = SituationScope::default();
        scope.open();

        for i in 0..3 {
            let order = Rc::clone(&order);
            scope.defer(move |_| order.borrow_mut().push(i));
        }

        scope.close(&mut FlowContext::default());
        assert_eq!(*order.borrow(), vec![2, 1, 0]);
    }

    #[test]
    fn close_releases_each_acquisition_once() {
        let mut cx = FlowContext::new(PreloadCache::new(ManualLoader::with_keys(&["a"])));
        cx.preload.load_or_get("a").unwrap();
        cx.preload.load_or_get("a").unwrap();

        let mut scope = SituationScope::default();
        scope.open();
        scope.record_acquire("a");
        scope.record_acquire("a");

        scope.close(&mut cx);
        assert!(cx.preload.is_empty());

        // Second close has nothing left to release
        scope.close(&mut cx);
        assert!(scope.acquired().is_empty());
    }
}
