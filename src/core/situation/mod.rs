//=========================================================================
// Situation System
//=========================================================================
//
// A situation is one named application state (scene, sub-screen, modal)
// with an eight-hook lifecycle.
//
// Lifecycle (per activation cycle):
//   Standby → Loading → SettingUp → Opening → Active
//           → Deactivating → Closing → CleaningUp → Unloaded
//   Unloaded → Standby on re-entry
//
// Suspendable hooks (`poll_*`) are explicit state machines: the container
// polls them once per tick until they return `Ready` or an error.
//
//=========================================================================

//=== Module Declarations =================================================

mod factory;
mod registry;
mod scope;

//=== Public API ==========================================================

pub use factory::SituationFactory;
pub use registry::SituationRegistry;
pub use scope::SituationScope;

//=== External Dependencies ===============================================

use std::any::Any;
use std::fmt;
use std::task::Poll;

//=== Internal Dependencies ===============================================

use crate::core::cancel::CancelToken;
use crate::core::context::{FlowContext, FlowRequest, FrameTime, Services};
use crate::core::error::{FlowError, HookError};
use crate::core::preload::LoadHandle;

//=== SituationId =========================================================

/// Identifier of a situation inside its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SituationId(pub(crate) usize);

impl fmt::Display for SituationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//=== Phase ===============================================================

/// Lifecycle phase of a situation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Phase {
    #[default]
    Standby,
    Loading,
    SettingUp,
    Opening,
    Active,
    Deactivating,
    Closing,
    CleaningUp,
    Unloaded,
}

impl Phase {
    /// Whether the situation holds loaded resources in this phase.
    pub fn is_loaded(self) -> bool {
        !matches!(self, Self::Standby | Self::Unloaded)
    }

    /// Whether per-frame updates are forwarded in this phase.
    pub fn receives_updates(self) -> bool {
        matches!(
            self,
            Self::Opening | Self::Active | Self::Deactivating | Self::Closing
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Standby => "standby",
            Self::Loading => "loading",
            Self::SettingUp => "setting up",
            Self::Opening => "opening",
            Self::Active => "active",
            Self::Deactivating => "deactivating",
            Self::Closing => "closing",
            Self::CleaningUp => "cleaning up",
            Self::Unloaded => "unloaded",
        };
        f.write_str(text)
    }
}

//=== PhaseResult =========================================================

/// Outcome of one poll of a suspendable hook.
///
/// `Ok(Poll::Pending)` suspends until the next tick, `Ok(Poll::Ready(()))`
/// completes the phase, `Err` fails it.
pub type PhaseResult = Result<Poll<()>, HookError>;

/// Completed-phase shorthand for hook implementations.
pub const READY: PhaseResult = Ok(Poll::Ready(()));

//=== AsAny ===============================================================

/// Downcasting support for registered situations.
///
/// Implemented automatically for every `'static` type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

//=== Situation Trait =====================================================

/// Lifecycle hooks of one application state.
///
/// Every hook has a default that completes immediately, so a situation
/// only overrides what it needs:
///
/// ```rust
/// use std::task::Poll;
/// use aetheric_flow::prelude::*;
///
/// struct Title {
///     atlas: Option<LoadHandle>,
/// }
///
/// impl Situation for Title {
///     fn poll_load(&mut self, cx: &mut PhaseContext<'_>) -> PhaseResult {
///         if self.atlas.is_none() {
///             self.atlas = Some(cx.acquire("ui/title")?);
///         }
///         match self.atlas.as_ref().map(LoadHandle::poll_resource) {
///             Some(Ok(Poll::Ready(_))) => READY,
///             Some(Err(e)) => Err(e.into()),
///             _ => Ok(Poll::Pending),
///         }
///     }
/// }
/// ```
pub trait Situation: AsAny {
    /// Heavy asset/scene acquisition. Cancellable, may suspend.
    fn poll_load(&mut self, _cx: &mut PhaseContext<'_>) -> PhaseResult {
        READY
    }

    /// One-time logical initialisation after load. Cancellable, may suspend.
    fn poll_setup(&mut self, _cx: &mut PhaseContext<'_>) -> PhaseResult {
        READY
    }

    /// Attaches input and update bindings.
    fn on_activate(&mut self, _cx: &mut PhaseContext<'_>) {}

    /// Detaches input and update bindings.
    fn on_deactivate(&mut self, _cx: &mut PhaseContext<'_>) {}

    /// Drives the visual enter animation. May suspend.
    fn poll_open(&mut self, _cx: &mut PhaseContext<'_>) -> PhaseResult {
        READY
    }

    /// Drives the visual exit animation. May suspend.
    fn poll_close(&mut self, _cx: &mut PhaseContext<'_>) -> PhaseResult {
        READY
    }

    /// Releases transient per-activation state.
    fn on_cleanup(&mut self, _cx: &mut PhaseContext<'_>) {}

    /// Releases heavy resources.
    fn on_unload(&mut self, _cx: &mut PhaseContext<'_>) {}

    /// Called every frame while the situation is open or active.
    fn update(&mut self, _cx: &mut FlowContext) {}

    /// Called every frame after all `update` calls.
    fn late_update(&mut self, _cx: &mut FlowContext) {}

    /// Called once per fixed simulation step.
    fn fixed_update(&mut self, _cx: &mut FlowContext) {}
}

//=== PhaseContext ========================================================

/// Context given to lifecycle hooks.
///
/// Bundles the shared [`FlowContext`], the situation's own scope and the
/// cancellation token of the current transition attempt.
pub struct PhaseContext<'a> {
    flow: &'a mut FlowContext,
    scope: &'a mut SituationScope,
    cancel: &'a CancelToken,
    name: &'a str,
}

impl<'a> PhaseContext<'a> {
    pub(crate) fn new(
        flow: &'a mut FlowContext,
        scope: &'a mut SituationScope,
        cancel: &'a CancelToken,
        name: &'a str,
    ) -> Self {
        Self {
            flow,
            scope,
            cancel,
            name,
        }
    }

    /// Name the situation was registered under.
    pub fn name(&self) -> &str {
        self.name
    }

    //--- Cancellation -----------------------------------------------------

    /// Token of the current transition attempt.
    pub fn cancel_token(&self) -> &CancelToken {
        self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The situation's own scope (cancelled on unload).
    pub fn scope(&mut self) -> &mut SituationScope {
        &mut *self.scope
    }

    //--- Collaborators ----------------------------------------------------

    pub fn flow(&mut self) -> &mut FlowContext {
        &mut *self.flow
    }

    pub fn services(&self) -> &Services {
        &self.flow.services
    }

    pub fn services_mut(&mut self) -> &mut Services {
        &mut self.flow.services
    }

    pub fn time(&self) -> FrameTime {
        self.flow.time()
    }

    /// Acquires `key` through the preload cache.
    ///
    /// The acquisition is owned by the situation's scope and released by
    /// the container when the situation is unloaded or rolled back.
    pub fn acquire(&mut self, key: &str) -> Result<LoadHandle, FlowError> {
        let handle = self.flow.preload.load_or_get(key)?;
        self.scope.record_acquire(key);
        Ok(handle)
    }

    /// Queues a navigation request for the next tick boundary.
    pub fn request(&mut self, request: FlowRequest) {
        self.flow.requests.push(request);
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

    #[test]
    fn phases_are_ordered_forward() {
        let order = [
            Phase::Standby,
            Phase::Loading,
            Phase::SettingUp,
            Phase::Opening,
            Phase::Active,
            Phase::Deactivating,
            Phase::Closing,
            Phase::CleaningUp,
            Phase::Unloaded,
        ];
        assert!(order.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn loaded_and_update_phases() {
        assert!(!Phase::Standby.is_loaded());
        assert!(!Phase::Unloaded.is_loaded());
        assert!(Phase::Loading.is_loaded());
        assert!(Phase::CleaningUp.is_loaded());

        assert!(Phase::Active.receives_updates());
        assert!(Phase::Closing.receives_updates());
        assert!(!Phase::SettingUp.receives_updates());
    }

    #[test]
    fn acquire_records_key_in_scope() {
        let mut flow = FlowContext::new(PreloadCache::new(ManualLoader::with_keys(&["bgm"])));
        let mut scope = SituationScope::default();
        scope.open();
        let cancel = CancelToken::never();

        let mut cx = PhaseContext::new(&mut flow, &mut scope, &cancel, "Title");
        assert!(cx.acquire("bgm").is_ok());
        assert!(cx.acquire("missing").is_err());
        assert_eq!(cx.name(), "Title");

        assert_eq!(scope.acquired(), ["bgm".to_string()]);
        assert_eq!(flow.preload.refcount("bgm"), 1);
    }

    #[test]
    fn request_goes_to_the_flow_queue() {
        let mut flow = FlowContext::default();
        let mut scope = SituationScope::default();
        let cancel = CancelToken::never();

        PhaseContext::new(&mut flow, &mut scope, &cancel, "Pause").request(FlowRequest::Back);
        assert_eq!(flow.requests.take(), vec![FlowRequest::Back]);
    }
}
