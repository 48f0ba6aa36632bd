//=========================================================================
// Situation Container
//=========================================================================
//
// Runs the phase sequence for a single live chain of situations.
//
// Architecture:
//   SituationContainer
//     ├─ registry: SituationRegistry     (every situation + phase + scope)
//     ├─ chain: Vec<SituationId>         (current root-to-leaf chain)
//     └─ routine: Option<TransitionRoutine>   (at most one in flight)
//
// Transition:
//   target chain ─ common prefix with current chain (empty for Reset)
//     ├─ outgoing = current[k..]  torn down deepest-first
//     └─ incoming = target[k..]   brought up shallowest-first
//
// A request runs as far as it can immediately; the rest is driven by
// `update` once per frame.
//
//=========================================================================

//=== Module Declarations =================================================

mod handle;
mod transition;

//=== Public API ==========================================================

pub use handle::TransitionHandle;
pub use transition::{TransitionInfo, TransitionState, TransitionStep, TransitionType};

//=== External Dependencies ===============================================

use std::any::type_name;
use std::time::Duration;

use log::{debug, info, warn};

//=== Internal Dependencies ===============================================

use crate::core::context::FlowContext;
use crate::core::effect::EffectList;
use crate::core::error::FlowError;
use crate::core::situation::{Phase, Situation, SituationId, SituationRegistry};
use transition::TransitionRoutine;

//=== SituationContainer ==================================================

/// Owner of the live situation chain and its transitions.
#[derive(Default)]
pub struct SituationContainer {
    registry: SituationRegistry,
    chain: Vec<SituationId>,
    routine: Option<TransitionRoutine>,
}

impl SituationContainer {
    pub fn new() -> Self {
        Self::default()
    }

    //--- Registration -----------------------------------------------------

    /// Registers a situation nested under `parent`.
    pub fn register<S: Situation>(
        &mut self,
        name: &str,
        situation: S,
        parent: Option<SituationId>,
    ) -> Result<SituationId, FlowError> {
        self.registry.insert(name, situation, parent)
    }

    pub fn registry(&self) -> &SituationRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SituationRegistry {
        &mut self.registry
    }

    //--- Transitions ------------------------------------------------------

    /// Moves the live chain to the chain ending at `target`.
    ///
    /// Rejected requests come back as already-failed handles and leave
    /// every situation untouched.
    pub fn transition(
        &mut self,
        target: SituationId,
        kind: TransitionType,
        effects: EffectList,
        cx: &mut FlowContext,
    ) -> TransitionHandle {
        if self.routine.is_some() {
            warn!(
                "Transition to {:?} rejected: another transition is in progress",
                self.registry.name(target)
            );
            return TransitionHandle::failed(FlowError::TransitionAlreadyInProgress);
        }

        let next = match self.registry.chain(target) {
            Ok(chain) => chain,
            Err(e) => return TransitionHandle::failed(e),
        };

        if kind != TransitionType::Reset && next == self.chain {
            debug!("Situation {:?} is already active", self.registry.name(target));
            return TransitionHandle::completed();
        }

        let shared = match kind {
            TransitionType::Reset => 0,
            _ => common_prefix_len(&self.chain, &next),
        };

        info!(
            "Transition {:?} to {:?} started ({} out, {} in)",
            kind,
            self.registry.name(target),
            self.chain.len() - shared,
            next.len() - shared
        );

        let handle = TransitionHandle::pending();
        self.routine = Some(TransitionRoutine::new(
            kind,
            self.chain.clone(),
            next,
            shared,
            effects,
            handle.clone(),
        ));
        self.pump(cx);

        handle
    }

    /// Transitions to the first registered situation of type `T`.
    pub fn transition_to<T: Situation>(
        &mut self,
        kind: TransitionType,
        effects: EffectList,
        cx: &mut FlowContext,
    ) -> TransitionHandle {
        match self.registry.find::<T>() {
            Some(target) => self.transition(target, kind, effects, cx),
            None => TransitionHandle::failed(FlowError::SituationNotInFlow(type_name::<T>().to_string())),
        }
    }

    fn pump(&mut self, cx: &mut FlowContext) {
        let Some(routine) = self.routine.as_mut() else {
            return;
        };

        if routine.advance(&mut self.registry, &mut self.chain, cx) {
            self.routine = None;
        }
    }

    //--- Update Loop ------------------------------------------------------

    /// Starts a frame of length `delta`, drives the in-flight transition
    /// and forwards `update` to the live situations.
    pub fn update(&mut self, cx: &mut FlowContext, delta: Duration) {
        cx.advance(delta);
        cx.preload.update();

        if let Some(routine) = self.routine.as_mut() {
            routine.tick_effects(cx);
        }
        self.pump(cx);

        self.forward(cx, |situation, cx| situation.update(cx));
    }

    pub fn late_update(&mut self, cx: &mut FlowContext) {
        self.forward(cx, |situation, cx| situation.late_update(cx));
    }

    pub fn fixed_update(&mut self, cx: &mut FlowContext) {
        self.forward(cx, |situation, cx| situation.fixed_update(cx));
    }

    /// Current chain first (parent before child), then in-flight incoming.
    fn forward<F>(&mut self, cx: &mut FlowContext, hook: F)
    where
        F: Fn(&mut dyn Situation, &mut FlowContext),
    {
        let mut targets = self.chain.clone();
        if let Some(routine) = &self.routine {
            targets.extend(routine.incoming().iter().filter(|id| !self.chain.contains(id)));
        }

        for id in targets {
            if self.registry.phase(id).is_some_and(Phase::receives_updates) {
                self.registry.with_situation(id, cx, &hook);
            }
        }
    }

    //--- Queries ----------------------------------------------------------

    /// Live chain, root first.
    pub fn current_chain(&self) -> &[SituationId] {
        &self.chain
    }

    /// Leaf of the live chain.
    pub fn current(&self) -> Option<SituationId> {
        self.chain.last().copied()
    }

    pub fn transition_info(&self) -> Option<&TransitionInfo> {
        self.routine.as_ref().map(TransitionRoutine::info)
    }

    pub fn is_transitioning(&self) -> bool {
        self.routine.is_some()
    }

    pub fn phase(&self, id: SituationId) -> Option<Phase> {
        self.registry.phase(id)
    }

    pub fn situation<T: Situation>(&self, id: SituationId) -> Option<&T> {
        self.registry.get::<T>(id)
    }

    pub fn situation_mut<T: Situation>(&mut self, id: SituationId) -> Option<&mut T> {
        self.registry.get_mut::<T>(id)
    }
}

//=== Helpers =============================================================

fn common_prefix_len(a: &[SituationId], b: &[SituationId]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::effect::LoadingScreen;
    use crate::core::preload::PreloadCache;
    use crate::core::testing::{new_log, EventLog, ManualLoader, Probe, RecordingEffect};

    struct Fixture {
        container: SituationContainer,
        cx: FlowContext,
        log: EventLog,
        root: SituationId,
        a: SituationId,
        b: SituationId,
    }

    /// Root with two children A and B.
    fn fixture(configure_b: impl FnOnce(Probe) -> Probe) -> Fixture {
        let log = new_log();
        let mut container = SituationContainer::new();
        let root = container.register("Root", Probe::new("Root", &log), None).unwrap();
        let a = container.register("A", Probe::new("A", &log), Some(root)).unwrap();
        let b = container
            .register("B", configure_b(Probe::new("B", &log)), Some(root))
            .unwrap();

        Fixture {
            container,
            cx: FlowContext::new(PreloadCache::new(ManualLoader::ready(&["tex"]))),
            log,
            root,
            a,
            b,
        }
    }

    impl Fixture {
        fn go(&mut self, target: SituationId) -> TransitionHandle {
            self.container
                .transition(target, TransitionType::Push, Vec::new(), &mut self.cx)
        }

        fn tick(&mut self) {
            self.container.update(&mut self.cx, Duration::from_millis(16));
        }

        fn settle(&mut self, handle: &TransitionHandle) {
            for _ in 0..64 {
                if handle.is_done() {
                    return;
                }
                self.tick();
            }
            panic!("transition did not settle");
        }

        fn entries(&self) -> Vec<String> {
            self.log.borrow().clone()
        }

        fn clear(&self) {
            self.log.borrow_mut().clear();
        }
    }

    #[test]
    fn enters_chain_shallowest_first() {
        let mut f = fixture(|b| b);
        let handle = f.go(f.a);

        assert!(handle.succeeded());
        assert_eq!(
            f.entries(),
            vec![
                "Root:load", "Root:setup", "A:load", "A:setup",
                "Root:open", "A:open", "Root:activate", "A:activate",
            ]
        );
        assert_eq!(f.container.current_chain(), [f.root, f.a]);
        assert_eq!(f.container.phase(f.a), Some(Phase::Active));
        assert!(!f.container.is_transitioning());
    }

    #[test]
    fn shared_ancestor_stays_active() {
        let mut f = fixture(|b| b);
        f.go(f.a);
        f.clear();

        let handle = f.go(f.b);

        assert!(handle.succeeded());
        assert_eq!(
            f.entries(),
            vec![
                "A:deactivate", "A:close", "A:cleanup", "A:unload",
                "B:load", "B:setup", "B:open", "B:activate",
            ]
        );
        assert_eq!(f.container.current_chain(), [f.root, f.b]);
        assert_eq!(f.container.phase(f.root), Some(Phase::Active));
        assert_eq!(f.container.phase(f.a), Some(Phase::Unloaded));
    }

    #[test]
    fn re_entering_the_active_situation_is_a_no_op() {
        let mut f = fixture(|b| b);
        f.go(f.a);
        f.clear();

        let handle = f.go(f.a);

        assert!(handle.succeeded());
        assert!(f.entries().is_empty());
    }

    #[test]
    fn reset_re_enters_shared_ancestors() {
        let mut f = fixture(|b| b);
        f.go(f.a);
        f.clear();

        let handle = f
            .container
            .transition(f.a, TransitionType::Reset, Vec::new(), &mut f.cx);

        assert!(handle.succeeded());
        let entries = f.entries();
        let unload = entries.iter().position(|e| e == "Root:unload");
        let load = entries.iter().position(|e| e == "Root:load");
        assert!(unload.is_some() && load.is_some() && unload < load);
        assert_eq!(f.container.current_chain(), [f.root, f.a]);
    }

    #[test]
    fn second_request_fails_while_in_flight() {
        let mut f = fixture(|b| b.pending_at(Phase::Loading, 3));
        f.go(f.a);

        let first = f.go(f.b);
        let second = f.go(f.a);

        assert!(!first.is_done());
        assert!(matches!(second.error(), Some(FlowError::TransitionAlreadyInProgress)));
        assert_eq!(
            f.container.transition_info().map(TransitionInfo::next_situations),
            Some(&[f.root, f.b][..])
        );

        f.settle(&first);
        assert!(first.succeeded());
        assert_eq!(f.container.current_chain(), [f.root, f.b]);
    }

    #[test]
    fn failed_setup_rolls_back_and_restores() {
        let mut f = fixture(|b| b.acquires("tex").fail_at(Phase::SettingUp));
        f.go(f.a);
        f.clear();

        let handle = f.go(f.b);

        match handle.error() {
            Some(FlowError::PhaseFailed { situation, phase, .. }) => {
                assert_eq!(situation, "B");
                assert_eq!(phase, Phase::SettingUp);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            f.entries(),
            vec![
                "A:deactivate", "A:close", "A:cleanup", "A:unload",
                "B:load", "B:setup", "B:cleanup", "B:unload",
                "A:load", "A:setup", "A:open", "A:activate",
            ]
        );
        assert_eq!(f.container.current_chain(), [f.root, f.a]);
        assert_eq!(f.container.phase(f.a), Some(Phase::Active));
        assert_eq!(f.container.phase(f.b), Some(Phase::Unloaded));
        assert_eq!(f.cx.preload.refcount("tex"), 0);
    }

    #[test]
    fn rollback_tears_down_every_touched_situation() {
        let log = new_log();
        let mut container = SituationContainer::new();
        let mut cx = FlowContext::default();
        let root = container.register("Root", Probe::new("Root", &log), None).unwrap();
        let x = container.register("X", Probe::new("X", &log), Some(root)).unwrap();
        let s1 = container.register("S1", Probe::new("S1", &log), Some(root)).unwrap();
        let s2 = container
            .register("S2", Probe::new("S2", &log).fail_at(Phase::SettingUp), Some(s1))
            .unwrap();
        let s3 = container.register("S3", Probe::new("S3", &log), Some(s2)).unwrap();

        container.transition(x, TransitionType::Push, Vec::new(), &mut cx);
        log.borrow_mut().clear();

        let handle = container.transition(s3, TransitionType::Push, Vec::new(), &mut cx);

        match handle.error() {
            Some(FlowError::PhaseFailed { situation, phase, .. }) => {
                assert_eq!(situation, "S2");
                assert_eq!(phase, Phase::SettingUp);
            }
            other => panic!("unexpected {other:?}"),
        }

        let entries = log.borrow().clone();
        assert!(entries.windows(2).any(|w| w == ["S1:cleanup", "S1:unload"]));
        assert!(!entries.iter().any(|e| e.starts_with("Root:") || e.starts_with("S3:")));

        assert_eq!(container.phase(s1), Some(Phase::Unloaded));
        assert_eq!(container.phase(s2), Some(Phase::Unloaded));
        assert_eq!(container.phase(s3), Some(Phase::Standby));
        assert_eq!(container.phase(x), Some(Phase::Active));
        assert_eq!(container.current_chain(), [root, x]);
    }

    #[test]
    fn failed_restore_truncates_the_chain() {
        let log = new_log();
        let mut container = SituationContainer::new();
        let mut cx = FlowContext::default();
        let root = container.register("Root", Probe::new("Root", &log), None).unwrap();
        let a = container
            .register("A", Probe::new("A", &log).fail_on_load(2), Some(root))
            .unwrap();
        let b = container
            .register("B", Probe::new("B", &log).fail_at(Phase::Loading), Some(root))
            .unwrap();

        container.transition(a, TransitionType::Push, Vec::new(), &mut cx);
        let handle = container.transition(b, TransitionType::Push, Vec::new(), &mut cx);

        assert!(matches!(
            handle.error(),
            Some(FlowError::PhaseFailed { situation, .. }) if situation == "B"
        ));
        assert!(!container.is_transitioning());
        assert_eq!(container.current_chain(), [root]);
        assert_eq!(container.phase(root), Some(Phase::Active));
        assert_eq!(container.phase(a), Some(Phase::Unloaded));
        assert_eq!(container.phase(b), Some(Phase::Unloaded));
    }

    #[test]
    fn effects_end_even_when_the_transition_fails() {
        let mut f = fixture(|b| b.fail_at(Phase::Loading));
        f.go(f.a);
        f.clear();

        let effects: EffectList = vec![Box::new(RecordingEffect::new("fade", &f.log))];
        let handle = f
            .container
            .transition(f.b, TransitionType::Push, effects, &mut f.cx);
        f.settle(&handle);

        let entries = f.entries();
        assert!(handle.error().is_some());
        assert_eq!(entries.first().map(String::as_str), Some("fx:fade:begin"));
        assert_eq!(entries.last().map(String::as_str), Some("fx:fade:end"));
        assert!(entries.iter().any(|e| e == "fx:fade:exit"));
    }

    #[test]
    fn opening_waits_for_enter_effects() {
        let mut f = fixture(|b| b);
        f.go(f.a);
        f.clear();

        let effects: EffectList = vec![Box::new(RecordingEffect::new("fade", &f.log).enter_ticks(2))];
        let handle = f
            .container
            .transition(f.b, TransitionType::Push, effects, &mut f.cx);

        let opened = |f: &Fixture| f.entries().iter().any(|e| e == "B:open");
        assert!(!opened(&f));
        assert_eq!(f.container.phase(f.b), Some(Phase::SettingUp));

        f.tick();
        assert!(!opened(&f));

        f.tick();
        assert!(opened(&f));
        assert!(handle.succeeded());
    }

    #[test]
    fn cancel_before_commit_restores_previous_chain() {
        let mut f = fixture(|b| b.pending_at(Phase::Loading, 5));
        f.go(f.a);
        f.clear();

        let handle = f.go(f.b);
        handle.cancel();
        f.settle(&handle);

        assert!(handle.error().is_some_and(|e| e.is_cancelled()));
        assert_eq!(f.container.current_chain(), [f.root, f.a]);
        assert_eq!(f.container.phase(f.b), Some(Phase::Unloaded));

        let entries = f.entries();
        assert!(entries.iter().any(|e| e == "B:unload"));
        assert!(!entries.iter().any(|e| e == "B:cleanup"));
    }

    #[test]
    fn cancel_after_commit_is_ignored() {
        let mut f = fixture(|b| b);
        f.go(f.a);

        let effects: EffectList =
            vec![Box::new(LoadingScreen::new().with_min_display(Duration::from_millis(100)))];
        let handle = f
            .container
            .transition(f.b, TransitionType::Push, effects, &mut f.cx);

        assert_eq!(f.container.current_chain(), [f.root, f.b]);
        assert!(!handle.is_done());

        handle.cancel();
        f.settle(&handle);
        assert!(handle.succeeded());
        assert!(!f.cx.overlay.loading_visible);
    }

    #[test]
    fn outgoing_close_failure_does_not_block() {
        let log = new_log();
        let mut container = SituationContainer::new();
        let a = container
            .register("A", Probe::new("A", &log).fail_at(Phase::Closing), None)
            .unwrap();
        let b = container.register("B", Probe::new("B", &log), None).unwrap();
        let mut cx = FlowContext::default();

        container.transition(a, TransitionType::Push, Vec::new(), &mut cx);
        let handle = container.transition(b, TransitionType::Push, Vec::new(), &mut cx);

        assert!(handle.succeeded());
        assert_eq!(container.phase(a), Some(Phase::Unloaded));
        assert!(log.borrow().iter().any(|e| e == "A:cleanup"));
    }

    #[test]
    fn updates_reach_live_and_opening_situations() {
        let mut f = fixture(|b| b.pending_at(Phase::Opening, 2));
        f.go(f.a);
        f.tick();
        f.container.late_update(&mut f.cx);
        f.container.fixed_update(&mut f.cx);

        let probe = |f: &Fixture, id| f.container.situation::<Probe>(id).map(|p| (p.updates, p.late_updates, p.fixed_updates));
        assert_eq!(probe(&f, f.root), Some((1, 1, 1)));
        assert_eq!(probe(&f, f.a), Some((1, 1, 1)));

        let handle = f.go(f.b);
        assert_eq!(f.container.phase(f.b), Some(Phase::Opening));

        f.tick();
        assert!(!handle.is_done());
        assert_eq!(probe(&f, f.b).map(|p| p.0), Some(1));
    }

    #[test]
    fn unknown_target_is_rejected() {
        let mut f = fixture(|b| b);
        let handle = f.go(SituationId(42));

        assert!(matches!(handle.error(), Some(FlowError::UnknownSituation(SituationId(42)))));
        assert!(f.container.current_chain().is_empty());
    }

    #[test]
    fn transition_by_type() {
        struct Settings;
        impl Situation for Settings {}

        let mut container = SituationContainer::new();
        let mut cx = FlowContext::default();
        let id = container.register("Settings", Settings, None).unwrap();

        let handle = container.transition_to::<Settings>(TransitionType::Push, Vec::new(), &mut cx);
        assert!(handle.succeeded());
        assert_eq!(container.current(), Some(id));

        let missing = container.transition_to::<Probe>(TransitionType::Push, Vec::new(), &mut cx);
        assert!(matches!(missing.error(), Some(FlowError::SituationNotInFlow(_))));
    }
}
