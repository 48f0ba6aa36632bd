//=========================================================================
// Built-in Effects
//=========================================================================
//
// Common transition effects writing into the context's presentation
// state. The host renders `FlowContext::overlay` and honours
// `FlowContext::input_gate`; the effects only drive the values.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::task::Poll;
use std::time::Duration;

//=== Internal Dependencies ===============================================

use super::TransitionEffect;
use crate::core::context::FlowContext;
use crate::core::situation::{PhaseResult, READY};

//=== BlockInput ==========================================================

/// Blocks input from `begin_transition` until `end_transition`.
#[derive(Debug, Default)]
pub struct BlockInput {
    raised: bool,
}

impl BlockInput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransitionEffect for BlockInput {
    fn begin_transition(&mut self, cx: &mut FlowContext) {
        if !self.raised {
            cx.input_gate.block();
            self.raised = true;
        }
    }

    fn end_transition(&mut self, cx: &mut FlowContext) {
        if self.raised {
            cx.input_gate.unblock();
            self.raised = false;
        }
    }

    fn label(&self) -> &str {
        "BlockInput"
    }
}

//=== FadeToColor =========================================================

/// Fades the overlay to a colour on enter and back to clear on exit.
///
/// The exit fade starts from whatever alpha the enter fade reached, so an
/// aborted transition fades back from a partial overlay.
#[derive(Debug, Clone)]
pub struct FadeToColor {
    color: [f32; 4],
    duration: Duration,
    alpha: f32,
}

impl FadeToColor {
    pub fn new(color: [f32; 4], duration: Duration) -> Self {
        Self {
            color,
            duration,
            alpha: 0.0,
        }
    }

    /// Black fade of the given duration.
    pub fn black(duration: Duration) -> Self {
        Self::new([0.0, 0.0, 0.0, 1.0], duration)
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    fn step(&self, cx: &FlowContext) -> f32 {
        if self.duration.is_zero() {
            1.0
        } else {
            cx.time().delta.as_secs_f32() / self.duration.as_secs_f32()
        }
    }
}

impl TransitionEffect for FadeToColor {
    fn begin_transition(&mut self, cx: &mut FlowContext) {
        self.alpha = 0.0;
        cx.overlay.color = self.color;
        cx.overlay.alpha = 0.0;
    }

    fn poll_enter(&mut self, cx: &mut FlowContext) -> PhaseResult {
        self.alpha = (self.alpha + self.step(cx)).min(1.0);
        cx.overlay.alpha = self.alpha;

        if self.alpha >= 1.0 {
            READY
        } else {
            Ok(Poll::Pending)
        }
    }

    fn poll_exit(&mut self, cx: &mut FlowContext) -> PhaseResult {
        self.alpha = (self.alpha - self.step(cx)).max(0.0);
        cx.overlay.alpha = self.alpha;

        if self.alpha <= 0.0 {
            READY
        } else {
            Ok(Poll::Pending)
        }
    }

    fn end_transition(&mut self, cx: &mut FlowContext) {
        self.alpha = 0.0;
        cx.overlay.alpha = 0.0;
    }

    fn label(&self) -> &str {
        "FadeToColor"
    }
}

//=== LoadingScreen =======================================================

/// Shows the loading indicator for the whole transition.
///
/// With a minimum display time, the exit routine holds until the
/// indicator has been visible at least that long, avoiding flicker on
/// fast loads.
#[derive(Debug, Clone, Default)]
pub struct LoadingScreen {
    min_display: Duration,
    shown: Duration,
}

impl LoadingScreen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_display(mut self, min_display: Duration) -> Self {
        self.min_display = min_display;
        self
    }
}

impl TransitionEffect for LoadingScreen {
    fn begin_transition(&mut self, cx: &mut FlowContext) {
        self.shown = Duration::ZERO;
        cx.overlay.loading_visible = true;
    }

    fn update(&mut self, cx: &mut FlowContext) {
        self.shown += cx.time().delta;
    }

    fn poll_exit(&mut self, _cx: &mut FlowContext) -> PhaseResult {
        if self.shown >= self.min_display {
            READY
        } else {
            Ok(Poll::Pending)
        }
    }

    fn end_transition(&mut self, cx: &mut FlowContext) {
        cx.overlay.loading_visible = false;
    }

    fn label(&self) -> &str {
        "LoadingScreen"
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::effect::EffectPipeline;

    fn frame(cx: &mut FlowContext, millis: u64) {
        cx.advance(Duration::from_millis(millis));
    }

    #[test]
    fn block_input_spans_begin_to_end() {
        let mut cx = FlowContext::default();
        let mut effect = BlockInput::new();

        effect.begin_transition(&mut cx);
        assert!(cx.input_gate.is_blocked());
        effect.end_transition(&mut cx);
        assert!(!cx.input_gate.is_blocked());

        // Unbalanced end is harmless
        effect.end_transition(&mut cx);
        assert!(!cx.input_gate.is_blocked());
    }

    #[test]
    fn fade_reaches_full_then_clears() {
        let mut cx = FlowContext::default();
        let mut fade = FadeToColor::black(Duration::from_millis(100));

        fade.begin_transition(&mut cx);
        frame(&mut cx, 50);
        assert!(fade.poll_enter(&mut cx).unwrap().is_pending());
        assert!((cx.overlay.alpha - 0.5).abs() < 1e-4);

        frame(&mut cx, 50);
        assert!(fade.poll_enter(&mut cx).unwrap().is_ready());
        assert_eq!(cx.overlay.alpha, 1.0);

        frame(&mut cx, 100);
        assert!(fade.poll_exit(&mut cx).unwrap().is_ready());
        assert_eq!(cx.overlay.alpha, 0.0);
    }

    #[test]
    fn aborted_fade_exits_from_partial_alpha() {
        let mut cx = FlowContext::default();
        let mut fade = FadeToColor::black(Duration::from_millis(100));

        fade.begin_transition(&mut cx);
        frame(&mut cx, 25);
        let _ = fade.poll_enter(&mut cx);

        frame(&mut cx, 25);
        assert!(fade.poll_exit(&mut cx).unwrap().is_ready());
        assert_eq!(fade.alpha(), 0.0);
    }

    #[test]
    fn zero_duration_fade_is_instant() {
        let mut cx = FlowContext::default();
        let mut fade = FadeToColor::new([1.0, 1.0, 1.0, 1.0], Duration::ZERO);

        fade.begin_transition(&mut cx);
        assert_eq!(cx.overlay.color, [1.0, 1.0, 1.0, 1.0]);
        assert!(fade.poll_enter(&mut cx).unwrap().is_ready());
        assert!(fade.poll_exit(&mut cx).unwrap().is_ready());
    }

    #[test]
    fn loading_screen_honours_min_display() {
        let mut cx = FlowContext::default();
        let mut pipeline = EffectPipeline::new(vec![Box::new(
            LoadingScreen::new().with_min_display(Duration::from_millis(30)),
        )]);

        pipeline.begin(&mut cx);
        assert!(cx.overlay.loading_visible);

        frame(&mut cx, 20);
        pipeline.update(&mut cx);
        pipeline.start_exit(&mut cx);
        assert!(!pipeline.exit_finished());

        frame(&mut cx, 20);
        pipeline.update(&mut cx);
        pipeline.poll(&mut cx);
        assert!(pipeline.exit_finished());

        pipeline.end(&mut cx);
        assert!(!cx.overlay.loading_visible);
    }
}
