//=========================================================================
// Transition Routine
//=========================================================================
//
// Step machine running one transition on behalf of the container.
//
// Success path:
//   Begin → Closing → Loading → AwaitingEffects → Opening → Activating
//         → Finishing → Done
//
// Failure / cancellation before Activating:
//   ... → RollingBack → Restoring → Finishing → Done
//
// Each call to `advance` runs steps until a hook or effect is pending.
// Activating is the commit point: after it, cancellation is ignored.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::task::Poll;

use anyhow::anyhow;
use log::{debug, error, info, warn};

//=== Internal Dependencies ===============================================

use super::TransitionHandle;
use crate::core::cancel::CancelToken;
use crate::core::context::FlowContext;
use crate::core::effect::{EffectList, EffectPipeline};
use crate::core::error::{FlowError, HookError};
use crate::core::situation::{Phase, PhaseContext, PhaseResult, Situation, SituationId, SituationRegistry, READY};

//=== TransitionType ======================================================

/// How a transition relates to the navigation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionType {
    /// Forward navigation.
    Push,

    /// Backward navigation.
    Pop,

    /// Full teardown to the target, re-entering shared ancestors too.
    Reset,
}

//=== TransitionStep ======================================================

/// Current step of an in-flight transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionStep {
    Begin,
    Closing,
    Loading,
    AwaitingEffects,
    Opening,
    Activating,
    RollingBack,
    Restoring,
    Finishing,
    Done,
}

//=== TransitionState =====================================================

/// Overall state of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

//=== TransitionInfo ======================================================

/// Snapshot of the in-flight transition.
#[derive(Debug, Clone)]
pub struct TransitionInfo {
    kind: TransitionType,
    step: TransitionStep,
    state: TransitionState,
    prev_situations: Vec<SituationId>,
    next_situations: Vec<SituationId>,
}

impl TransitionInfo {
    pub fn kind(&self) -> TransitionType {
        self.kind
    }

    pub fn step(&self) -> TransitionStep {
        self.step
    }

    pub fn state(&self) -> TransitionState {
        self.state
    }

    /// Chain that was current when the transition started.
    pub fn prev_situations(&self) -> &[SituationId] {
        &self.prev_situations
    }

    /// Chain the transition is moving to.
    pub fn next_situations(&self) -> &[SituationId] {
        &self.next_situations
    }
}

//=== TransitionRoutine ===================================================

pub(crate) struct TransitionRoutine {
    info: TransitionInfo,
    handle: TransitionHandle,
    cancel: CancelToken,
    restore_token: CancelToken,
    effects: EffectPipeline,

    /// Shared ancestors kept alive across the transition.
    prefix: Vec<SituationId>,

    /// Situations to leave, deepest first.
    outgoing: Vec<SituationId>,

    /// Situations to enter, shallowest first.
    incoming: Vec<SituationId>,

    /// Outgoing situations in re-entry order, shallowest first.
    restoring: Vec<SituationId>,
    restored: Vec<SituationId>,

    cursor: usize,
    touched: usize,
    failure: Option<FlowError>,
}

impl TransitionRoutine {
    pub(crate) fn new(
        kind: TransitionType,
        prev: Vec<SituationId>,
        next: Vec<SituationId>,
        shared: usize,
        effects: EffectList,
        handle: TransitionHandle,
    ) -> Self {
        let prefix = next[..shared].to_vec();
        let outgoing: Vec<_> = prev[shared..].iter().rev().copied().collect();
        let incoming = next[shared..].to_vec();
        let restoring = prev[shared..].to_vec();

        Self {
            info: TransitionInfo {
                kind,
                step: TransitionStep::Begin,
                state: TransitionState::Pending,
                prev_situations: prev,
                next_situations: next,
            },
            cancel: handle.cancel_token(),
            handle,
            restore_token: CancelToken::never(),
            effects: EffectPipeline::new(effects),
            prefix,
            outgoing,
            incoming,
            restoring,
            restored: Vec::new(),
            cursor: 0,
            touched: 0,
            failure: None,
        }
    }

    pub(crate) fn info(&self) -> &TransitionInfo {
        &self.info
    }

    pub(crate) fn incoming(&self) -> &[SituationId] {
        &self.incoming
    }

    /// Polls and updates the effects once for the current frame.
    pub(crate) fn tick_effects(&mut self, cx: &mut FlowContext) {
        self.effects.poll(cx);
        self.effects.update(cx);
    }

    //--- Driver -----------------------------------------------------------

    /// Runs steps until suspended. Returns true once the routine is done.
    pub(crate) fn advance(
        &mut self,
        registry: &mut SituationRegistry,
        chain: &mut Vec<SituationId>,
        cx: &mut FlowContext,
    ) -> bool {
        loop {
            if self.cancel_requested() {
                info!("Transition cancelled during {:?}", self.info.step);
                let _ = self.abort(FlowError::Cancelled);
            }

            let progress = match self.info.step {
                TransitionStep::Begin => self.begin(registry, cx),
                TransitionStep::Closing => self.close_outgoing(registry, cx),
                TransitionStep::Loading => self.load_incoming(registry, cx),
                TransitionStep::AwaitingEffects => self.await_effects(cx),
                TransitionStep::Opening => self.open_incoming(registry, cx),
                TransitionStep::Activating => self.activate_incoming(registry, chain, cx),
                TransitionStep::RollingBack => self.roll_back(registry, cx),
                TransitionStep::Restoring => self.restore(registry, chain, cx),
                TransitionStep::Finishing => self.finish(cx),
                TransitionStep::Done => return true,
            };

            if progress.is_pending() {
                return false;
            }
        }
    }

    fn goto(&mut self, step: TransitionStep) -> Poll<()> {
        debug!("Transition step {:?} -> {:?}", self.info.step, step);
        self.info.step = step;
        self.cursor = 0;
        Poll::Ready(())
    }

    fn cancel_requested(&self) -> bool {
        self.failure.is_none()
            && matches!(
                self.info.step,
                TransitionStep::Closing
                    | TransitionStep::Loading
                    | TransitionStep::AwaitingEffects
                    | TransitionStep::Opening
            )
            && self.cancel.is_cancelled()
    }

    fn abort(&mut self, error: FlowError) -> Poll<()> {
        self.failure = Some(error);
        self.goto(TransitionStep::RollingBack)
    }

    fn hook_failed(&mut self, name: &str, phase: Phase, cause: HookError) -> Poll<()> {
        if self.cancel.is_cancelled() {
            debug!("Situation {:?} stopped while {} after cancellation: {:#}", name, phase, cause);
            return self.abort(FlowError::Cancelled);
        }

        warn!("Situation {:?} failed while {}: {:#}", name, phase, cause);
        self.abort(FlowError::phase_failed(name, phase, cause))
    }

    //--- Forward Steps ----------------------------------------------------

    fn begin(&mut self, registry: &mut SituationRegistry, cx: &mut FlowContext) -> Poll<()> {
        self.info.state = TransitionState::Running;
        self.handle.set_running();
        self.effects.begin(cx);

        for &id in &self.outgoing {
            if registry.phase(id) == Some(Phase::Active) {
                registry.set_phase(id, Phase::Deactivating);
                run_sync(registry, id, cx, |s, pcx| s.on_deactivate(pcx));
            }
        }

        self.goto(TransitionStep::Closing)
    }

    fn close_outgoing(&mut self, registry: &mut SituationRegistry, cx: &mut FlowContext) -> Poll<()> {
        while let Some(&id) = self.outgoing.get(self.cursor) {
            match registry.phase(id) {
                Some(Phase::Deactivating) => registry.set_phase(id, Phase::Closing),
                Some(Phase::Closing) => {}
                _ => {
                    self.cursor += 1;
                    continue;
                }
            }

            match run_hook(registry, id, cx, &self.cancel, Phase::Closing) {
                Ok(Poll::Pending) => return Poll::Pending,
                Ok(Poll::Ready(())) => {}
                Err(e) => warn!(
                    "Situation {:?} failed while closing, tearing down anyway: {:#}",
                    registry.name(id),
                    e
                ),
            }

            teardown(registry, id, cx);
            self.cursor += 1;
        }

        self.goto(TransitionStep::Loading)
    }

    fn load_incoming(&mut self, registry: &mut SituationRegistry, cx: &mut FlowContext) -> Poll<()> {
        while let Some(&id) = self.incoming.get(self.cursor) {
            let phase = registry.phase(id).unwrap_or(Phase::Unloaded);
            match phase {
                Phase::Standby | Phase::Unloaded => {
                    begin_load(registry, id);
                    self.touched = self.cursor + 1;
                }
                Phase::Loading => match run_hook(registry, id, cx, &self.cancel, phase) {
                    Ok(Poll::Pending) => return Poll::Pending,
                    Ok(Poll::Ready(())) => registry.set_phase(id, Phase::SettingUp),
                    Err(e) => return self.hook_failed(registry.name(id), phase, e),
                },
                Phase::SettingUp => match run_hook(registry, id, cx, &self.cancel, phase) {
                    Ok(Poll::Pending) => return Poll::Pending,
                    Ok(Poll::Ready(())) => self.cursor += 1,
                    Err(e) => return self.hook_failed(registry.name(id), phase, e),
                },
                other => {
                    let cause = anyhow!("situation is {} instead of unloaded", other);
                    return self.hook_failed(registry.name(id), Phase::Loading, cause);
                }
            }
        }

        self.goto(TransitionStep::AwaitingEffects)
    }

    fn await_effects(&mut self, cx: &mut FlowContext) -> Poll<()> {
        if !self.effects.enter_finished() {
            return Poll::Pending;
        }

        self.effects.start_exit(cx);
        self.goto(TransitionStep::Opening)
    }

    fn open_incoming(&mut self, registry: &mut SituationRegistry, cx: &mut FlowContext) -> Poll<()> {
        while let Some(&id) = self.incoming.get(self.cursor) {
            if registry.phase(id) == Some(Phase::SettingUp) {
                registry.set_phase(id, Phase::Opening);
            }

            match run_hook(registry, id, cx, &self.cancel, Phase::Opening) {
                Ok(Poll::Pending) => return Poll::Pending,
                Ok(Poll::Ready(())) => self.cursor += 1,
                Err(e) => return self.hook_failed(registry.name(id), Phase::Opening, e),
            }
        }

        self.goto(TransitionStep::Activating)
    }

    fn activate_incoming(
        &mut self,
        registry: &mut SituationRegistry,
        chain: &mut Vec<SituationId>,
        cx: &mut FlowContext,
    ) -> Poll<()> {
        for &id in &self.incoming {
            run_sync(registry, id, cx, |s, pcx| s.on_activate(pcx));
            registry.set_phase(id, Phase::Active);
        }

        *chain = self.prefix.iter().chain(&self.incoming).copied().collect();
        debug!("Transition committed, chain is now {:?}", chain);

        self.goto(TransitionStep::Finishing)
    }

    //--- Failure Steps ----------------------------------------------------

    fn roll_back(&mut self, registry: &mut SituationRegistry, cx: &mut FlowContext) -> Poll<()> {
        for &id in self.incoming[..self.touched].iter().rev() {
            discard(registry, id, cx);
        }

        self.goto(TransitionStep::Restoring)
    }

    fn restore(
        &mut self,
        registry: &mut SituationRegistry,
        chain: &mut Vec<SituationId>,
        cx: &mut FlowContext,
    ) -> Poll<()> {
        while let Some(&id) = self.restoring.get(self.cursor) {
            let phase = registry.phase(id).unwrap_or(Phase::Unloaded);
            match phase {
                Phase::Active => {
                    self.restored.push(id);
                    self.cursor += 1;
                }
                Phase::Deactivating => self.reactivate(registry, id, cx),
                Phase::Closing => registry.set_phase(id, Phase::Opening),
                Phase::Standby | Phase::Unloaded | Phase::CleaningUp => begin_load(registry, id),
                Phase::Loading | Phase::SettingUp | Phase::Opening => {
                    match run_hook(registry, id, cx, &self.restore_token, phase) {
                        Ok(Poll::Pending) => return Poll::Pending,
                        Ok(Poll::Ready(())) => match phase {
                            Phase::Loading => registry.set_phase(id, Phase::SettingUp),
                            Phase::SettingUp => registry.set_phase(id, Phase::Opening),
                            _ => self.reactivate(registry, id, cx),
                        },
                        Err(e) => {
                            self.abandon_restore(registry, phase, e, cx);
                            break;
                        }
                    }
                }
            }
        }

        *chain = self.prefix.iter().chain(&self.restored).copied().collect();
        self.goto(TransitionStep::Finishing)
    }

    fn reactivate(&mut self, registry: &mut SituationRegistry, id: SituationId, cx: &mut FlowContext) {
        run_sync(registry, id, cx, |s, pcx| s.on_activate(pcx));
        registry.set_phase(id, Phase::Active);
        self.restored.push(id);
        self.cursor += 1;
    }

    fn abandon_restore(
        &mut self,
        registry: &mut SituationRegistry,
        phase: Phase,
        cause: HookError,
        cx: &mut FlowContext,
    ) {
        let remaining = &self.restoring[self.cursor..];
        if let Some(&id) = remaining.first() {
            error!(
                "Failed to restore situation {:?} while {}, chain truncated: {:#}",
                registry.name(id),
                phase,
                cause
            );
        }

        for &id in remaining.iter().rev() {
            discard(registry, id, cx);
        }
        self.cursor = self.restoring.len();
    }

    //--- Completion -------------------------------------------------------

    fn finish(&mut self, cx: &mut FlowContext) -> Poll<()> {
        if !self.effects.exit_started() {
            self.effects.start_exit(cx);
        }
        if !self.effects.exit_finished() {
            return Poll::Pending;
        }

        self.effects.end(cx);

        match self.failure.take() {
            Some(error) => {
                info!("Transition {:?} failed: {}", self.info.kind, error);
                self.info.state = TransitionState::Failed;
                self.handle.fail(error);
            }
            None => {
                info!("Transition {:?} finished", self.info.kind);
                self.info.state = TransitionState::Succeeded;
                self.handle.succeed();
            }
        }

        self.goto(TransitionStep::Done)
    }
}

//=== Lifecycle Helpers ===================================================

fn run_hook(
    registry: &mut SituationRegistry,
    id: SituationId,
    cx: &mut FlowContext,
    cancel: &CancelToken,
    phase: Phase,
) -> PhaseResult {
    registry
        .with_hook(id, cx, cancel, |situation, pcx| match phase {
            Phase::Loading => situation.poll_load(pcx),
            Phase::SettingUp => situation.poll_setup(pcx),
            Phase::Opening => situation.poll_open(pcx),
            Phase::Closing => situation.poll_close(pcx),
            _ => READY,
        })
        .unwrap_or(READY)
}

fn run_sync(
    registry: &mut SituationRegistry,
    id: SituationId,
    cx: &mut FlowContext,
    hook: impl FnOnce(&mut dyn Situation, &mut PhaseContext<'_>),
) {
    let never = CancelToken::never();
    registry.with_hook(id, cx, &never, hook);
}

fn begin_load(registry: &mut SituationRegistry, id: SituationId) {
    if registry.phase(id) != Some(Phase::Standby) {
        registry.set_phase(id, Phase::Standby);
    }
    registry.open_scope(id);
    registry.set_phase(id, Phase::Loading);
}

/// Cleanup, unload and scope release of a loaded situation.
fn teardown(registry: &mut SituationRegistry, id: SituationId, cx: &mut FlowContext) {
    registry.set_phase(id, Phase::CleaningUp);
    run_sync(registry, id, cx, |s, pcx| s.on_cleanup(pcx));
    unload(registry, id, cx);
}

fn unload(registry: &mut SituationRegistry, id: SituationId, cx: &mut FlowContext) {
    run_sync(registry, id, cx, |s, pcx| s.on_unload(pcx));
    registry.close_scope(id, cx);
    registry.set_phase(id, Phase::Unloaded);
}

/// Returns a situation to `Unloaded` from wherever it stopped.
fn discard(registry: &mut SituationRegistry, id: SituationId, cx: &mut FlowContext) {
    match registry.phase(id) {
        // Setup never started
        Some(Phase::Loading) => unload(registry, id, cx),
        Some(Phase::Active) => {
            registry.set_phase(id, Phase::Deactivating);
            run_sync(registry, id, cx, |s, pcx| s.on_deactivate(pcx));
            teardown(registry, id, cx);
        }
        Some(phase) if phase.is_loaded() => teardown(registry, id, cx),
        _ => {}
    }
}
