//=========================================================================
// Flow Context
//=========================================================================
//
// Shared data handed explicitly to situations and effects.
//
// Contains:
// - services: type-keyed collaborators inserted by the host
// - preload: reference-counted asset cache in front of the loader
// - requests: navigation requests raised from inside hooks
// - overlay / input_gate: presentation state driven by transition effects
// - frame time: tick counter and delta of the current frame
//
//=========================================================================

//=== Module Declarations =================================================

mod request_queue;
mod services;

//=== Public API ==========================================================

pub use request_queue::{FlowRequest, RequestQueue};
pub use services::Services;

//=== External Dependencies ===============================================

use std::time::Duration;

//=== Internal Dependencies ===============================================

use crate::core::preload::PreloadCache;

//=== FrameTime ===========================================================

/// Tick counter and timing of the current frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameTime {
    pub frame: u64,
    pub delta: Duration,
    pub elapsed: Duration,
}

//=== Overlay =============================================================

/// Full-screen presentation state the host renders on top of situations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overlay {
    /// RGBA colour of the fade layer.
    pub color: [f32; 4],

    /// Fade layer opacity in `0.0..=1.0`.
    pub alpha: f32,

    /// Whether the loading indicator is shown.
    pub loading_visible: bool,
}

impl Default for Overlay {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.0, 1.0],
            alpha: 0.0,
            loading_visible: false,
        }
    }
}

//=== InputGate ===========================================================

/// Counted input block. Input is blocked while any holder keeps it raised.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InputGate {
    holders: u32,
}

impl InputGate {
    pub fn block(&mut self) {
        self.holders += 1;
    }

    pub fn unblock(&mut self) {
        self.holders = self.holders.saturating_sub(1);
    }

    pub fn is_blocked(&self) -> bool {
        self.holders > 0
    }
}

//=== FlowContext =========================================================

/// Context passed to every situation and effect hook.
#[derive(Default)]
pub struct FlowContext {
    /// Collaborators provided by the host.
    pub services: Services,

    /// Asset cache; situations normally acquire through `PhaseContext`.
    pub preload: PreloadCache,

    /// Navigation requests processed at the tick boundary.
    pub requests: RequestQueue,

    /// Fade and loading indicator state.
    pub overlay: Overlay,

    /// Input block raised by transition effects.
    pub input_gate: InputGate,

    time: FrameTime,
}

impl FlowContext {
    pub fn new(preload: PreloadCache) -> Self {
        Self {
            preload,
            ..Self::default()
        }
    }

    /// Timing of the current frame.
    pub fn time(&self) -> FrameTime {
        self.time
    }

    /// Starts a new frame of length `delta`.
    pub(crate) fn advance(&mut self, delta: Duration) {
        self.time.frame += 1;
        self.time.delta = delta;
        self.time.elapsed += delta;
    }
}

//=========================================================================
// Tests
//=========================================================================
