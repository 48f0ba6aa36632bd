//=========================================================================
// Prelude
//=========================================================================
//
// Convenience module that re-exports commonly used types and traits.
//
// Usage:
//   use aetheric_flow::prelude::*;
//
//=========================================================================

//=== Public API ==========================================================

// Host loop
pub use crate::director::{CommandSender, Director, DirectorBuilder, TickControl};

// Situations
pub use crate::core::situation::{Phase, PhaseContext, PhaseResult, Situation, SituationFactory, SituationId, READY};

// Navigation
pub use crate::core::container::{SituationContainer, TransitionHandle, TransitionType};
pub use crate::core::flow::{NodeId, SituationFlow};

// Effects
pub use crate::core::effect::{BlockInput, EffectList, FadeToColor, LoadingScreen, TransitionEffect};

// Context and assets
pub use crate::core::cancel::CancelToken;
pub use crate::core::context::{FlowContext, FlowRequest, Services};
pub use crate::core::preload::{LoadHandle, Loader, PreloadCache, Resource, ThreadedLoader};

// Errors
pub use crate::core::error::{FlowError, HookError};
