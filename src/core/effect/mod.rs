//=========================================================================
// Transition Effects
//=========================================================================
//
// Ordered visual effects bookending a transition (fades, input blocks,
// loading screens).
//
// Protocol per transition, strictly ordered:
//   begin_transition()   sync, every effect in list order
//   poll_enter()         concurrent across effects and with close/load/setup
//   update()             once per frame while the transition is in flight
//   poll_exit()          concurrent across effects (also on the abort path)
//   end_transition()     sync, every effect in list order, always reached
//
// Effects know nothing about what is loading. A failing routine is logged
// and treated as finished so an effect can never wedge a transition.
//
//=========================================================================

//=== Module Declarations =================================================

mod builtin;

//=== Public API ==========================================================

pub use builtin::{BlockInput, FadeToColor, LoadingScreen};

//=== External Dependencies ===============================================

use std::any::type_name;
use std::task::Poll;

use log::{debug, warn};

//=== Internal Dependencies ===============================================

use crate::core::context::FlowContext;
use crate::core::situation::{PhaseResult, READY};

//=== TransitionEffect Trait ==============================================

/// One visual effect taking part in a transition.
///
/// Implementations must tolerate `poll_exit` being called even if
/// `poll_enter` never finished (the transition failed or was cancelled).
pub trait TransitionEffect {
    /// Synchronous setup before any routine runs.
    fn begin_transition(&mut self, _cx: &mut FlowContext) {}

    /// Enter routine (e.g. fade out to colour). Polled once per frame.
    fn poll_enter(&mut self, _cx: &mut FlowContext) -> PhaseResult {
        READY
    }

    /// Per-frame update while the transition is in flight.
    fn update(&mut self, _cx: &mut FlowContext) {}

    /// Exit routine (e.g. fade back in). Polled once per frame.
    fn poll_exit(&mut self, _cx: &mut FlowContext) -> PhaseResult {
        READY
    }

    /// Synchronous teardown after every exit routine finished.
    fn end_transition(&mut self, _cx: &mut FlowContext) {}

    /// Name used in log output.
    fn label(&self) -> &str {
        type_name::<Self>()
    }
}

/// Effect list attached to one transition request.
pub type EffectList = Vec<Box<dyn TransitionEffect>>;

//=== EffectStage =========================================================

/// Progress of an [`EffectPipeline`] through the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectStage {
    Idle,
    Entering,
    Exiting,
    Ended,
}

//=== EffectPipeline ======================================================

struct EffectSlot {
    effect: Box<dyn TransitionEffect>,
    enter_done: bool,
    exit_done: bool,
}

/// Runs an ordered list of effects through the four-phase protocol.
pub struct EffectPipeline {
    slots: Vec<EffectSlot>,
    stage: EffectStage,
    polled_frame: Option<u64>,
    updated_frame: Option<u64>,
}

impl EffectPipeline {
    pub fn new(effects: EffectList) -> Self {
        Self {
            slots: effects
                .into_iter()
                .map(|effect| EffectSlot {
                    effect,
                    enter_done: false,
                    exit_done: false,
                })
                .collect(),
            stage: EffectStage::Idle,
            polled_frame: None,
            updated_frame: None,
        }
    }

    pub fn stage(&self) -> EffectStage {
        self.stage
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    //--- Protocol ---------------------------------------------------------

    /// Calls `begin_transition` in list order and starts the enter routines.
    pub fn begin(&mut self, cx: &mut FlowContext) {
        if self.stage != EffectStage::Idle {
            return;
        }

        for slot in &mut self.slots {
            slot.effect.begin_transition(cx);
        }

        self.stage = EffectStage::Entering;
        self.polled_frame = None;
        self.poll(cx);
    }

    /// Polls the routines of the current stage, at most once per frame.
    pub fn poll(&mut self, cx: &mut FlowContext) {
        let frame = cx.time().frame;
        if self.polled_frame == Some(frame) {
            return;
        }
        self.polled_frame = Some(frame);

        match self.stage {
            EffectStage::Entering => {
                for slot in self.slots.iter_mut().filter(|s| !s.enter_done) {
                    let result = slot.effect.poll_enter(cx);
                    slot.enter_done = settled(slot.effect.label(), "enter", result);
                }
            }
            EffectStage::Exiting => {
                for slot in self.slots.iter_mut().filter(|s| !s.exit_done) {
                    let result = slot.effect.poll_exit(cx);
                    slot.exit_done = settled(slot.effect.label(), "exit", result);
                }
            }
            EffectStage::Idle | EffectStage::Ended => {}
        }
    }

    /// Switches to the exit routines, abandoning unfinished enter routines.
    pub fn start_exit(&mut self, cx: &mut FlowContext) {
        if !matches!(self.stage, EffectStage::Entering) {
            return;
        }

        if !self.enter_finished() {
            debug!("Exit effects started before enter effects finished");
        }

        self.stage = EffectStage::Exiting;
        self.polled_frame = None;
        self.poll(cx);
    }

    /// Forwards the per-frame update while routines are running.
    pub fn update(&mut self, cx: &mut FlowContext) {
        if !matches!(self.stage, EffectStage::Entering | EffectStage::Exiting) {
            return;
        }

        let frame = cx.time().frame;
        if self.updated_frame == Some(frame) {
            return;
        }
        self.updated_frame = Some(frame);

        for slot in &mut self.slots {
            slot.effect.update(cx);
        }
    }

    /// Calls `end_transition` in list order.
    pub fn end(&mut self, cx: &mut FlowContext) {
        if matches!(self.stage, EffectStage::Ended) {
            return;
        }

        for slot in &mut self.slots {
            slot.effect.end_transition(cx);
        }
        self.stage = EffectStage::Ended;
    }

    //--- Queries ----------------------------------------------------------

    pub fn enter_finished(&self) -> bool {
        self.slots.iter().all(|s| s.enter_done)
    }

    pub fn exit_started(&self) -> bool {
        matches!(self.stage, EffectStage::Exiting | EffectStage::Ended)
    }

    pub fn exit_finished(&self) -> bool {
        self.slots.iter().all(|s| s.exit_done)
    }
}

impl Default for EffectPipeline {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

//=== Helpers =============================================================

fn settled(label: &str, routine: &str, result: PhaseResult) -> bool {
    match result {
        Ok(Poll::Pending) => false,
        Ok(Poll::Ready(())) => true,
        Err(e) => {
            warn!("Effect {} {} routine failed, skipping it: {:#}", label, routine, e);
            true
        }
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{new_log, RecordingEffect};
    use std::time::Duration;

    fn next_frame(cx: &mut FlowContext) {
        cx.advance(Duration::from_millis(16));
    }

    #[test]
    fn begin_and_end_run_in_list_order() {
        let log = new_log();
        let mut cx = FlowContext::default();
        let mut pipeline = EffectPipeline::new(vec![
            Box::new(RecordingEffect::new("a", &log)),
            Box::new(RecordingEffect::new("b", &log)),
        ]);

        pipeline.begin(&mut cx);
        pipeline.start_exit(&mut cx);
        pipeline.end(&mut cx);

        assert_eq!(
            *log.borrow(),
            vec![
                "fx:a:begin", "fx:b:begin",
                "fx:a:enter", "fx:b:enter",
                "fx:a:exit", "fx:b:exit",
                "fx:a:end", "fx:b:end",
            ]
        );
    }

    #[test]
    fn enter_routines_are_polled_once_per_frame() {
        let log = new_log();
        let mut cx = FlowContext::default();
        let mut pipeline = EffectPipeline::new(vec![
            Box::new(RecordingEffect::new("slow", &log).enter_ticks(2)),
            Box::new(RecordingEffect::new("fast", &log)),
        ]);

        pipeline.begin(&mut cx);
        pipeline.poll(&mut cx);
        assert!(!pipeline.enter_finished());

        next_frame(&mut cx);
        pipeline.poll(&mut cx);
        assert!(!pipeline.enter_finished());

        next_frame(&mut cx);
        pipeline.poll(&mut cx);
        assert!(pipeline.enter_finished());
    }

    #[test]
    fn exit_may_start_before_enter_finished() {
        let log = new_log();
        let mut cx = FlowContext::default();
        let mut pipeline = EffectPipeline::new(vec![Box::new(
            RecordingEffect::new("fade", &log).enter_ticks(10),
        )]);

        pipeline.begin(&mut cx);
        pipeline.start_exit(&mut cx);
        assert!(pipeline.exit_finished());

        pipeline.end(&mut cx);
        assert_eq!(pipeline.stage(), EffectStage::Ended);
        assert!(log.borrow().iter().any(|l| l == "fx:fade:end"));
        assert!(!log.borrow().iter().any(|l| l == "fx:fade:enter"));
    }

    #[test]
    fn failing_routine_does_not_block() {
        let log = new_log();
        let mut cx = FlowContext::default();
        let mut pipeline = EffectPipeline::new(vec![Box::new(
            RecordingEffect::new("broken", &log).failing_enter(),
        )]);

        pipeline.begin(&mut cx);
        assert!(pipeline.enter_finished());
    }

    #[test]
    fn update_runs_once_per_frame_while_in_flight() {
        let log = new_log();
        let mut cx = FlowContext::default();
        let mut pipeline = EffectPipeline::new(vec![Box::new(RecordingEffect::new("u", &log))]);

        pipeline.update(&mut cx);
        pipeline.begin(&mut cx);
        pipeline.update(&mut cx);
        pipeline.update(&mut cx);
        next_frame(&mut cx);
        pipeline.update(&mut cx);
        pipeline.end(&mut cx);
        pipeline.update(&mut cx);

        let updates = log.borrow().iter().filter(|l| *l == "fx:u:update").count();
        assert_eq!(updates, 2);
    }

    #[test]
    fn empty_pipeline_is_immediately_finished() {
        let mut cx = FlowContext::default();
        let mut pipeline = EffectPipeline::default();

        pipeline.begin(&mut cx);
        assert!(pipeline.enter_finished());
        pipeline.start_exit(&mut cx);
        assert!(pipeline.exit_finished());
    }
}
