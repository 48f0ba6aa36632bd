//=========================================================================
// Flow Errors
//=========================================================================
//
// Error kinds surfaced by the flow, the container and the preload layer.
//
// Errors never unwind into the caller of a transition: they are carried
// on the TransitionHandle, or returned as an already-failed handle when
// detected synchronously (programmer errors).
//
//=========================================================================

//=== External Dependencies ===============================================

use std::sync::Arc;

use thiserror::Error;

//=== Internal Dependencies ===============================================

use crate::core::flow::NodeId;
use crate::core::situation::{Phase, SituationId};

//=== HookError ===========================================================

/// Error type returned by situation hooks, effect routines and loaders.
pub type HookError = anyhow::Error;

//=== FlowError ===========================================================

/// Errors reported by the orchestration layer.
///
/// Cloneable so a single failure can be observed through every clone of a
/// [`TransitionHandle`](crate::core::container::TransitionHandle).
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    /// A transition was requested before a root node was connected.
    #[error("no active graph: connect a root node before transitioning")]
    NoActiveGraph,

    /// Another transition is already in flight on this container.
    #[error("a transition is already in progress")]
    TransitionAlreadyInProgress,

    /// No edge path and no applicable fallback leads to the target.
    #[error("no route from `{from}` to `{to}`")]
    NoRouteFound { from: String, to: String },

    /// A load/setup/open hook of an incoming situation failed.
    #[error("situation `{situation}` failed while {phase}: {cause:#}")]
    PhaseFailed {
        situation: String,
        phase: Phase,
        cause: Arc<HookError>,
    },

    /// The transition attempt was cancelled before it committed.
    #[error("transition cancelled")]
    Cancelled,

    /// The id does not refer to a registered situation.
    #[error("situation {0} is not registered")]
    UnknownSituation(SituationId),

    /// The id does not refer to a node of this flow.
    #[error("node {0} is not part of this flow")]
    UnknownNode(NodeId),

    /// The situation exists but is not wrapped by any node of the flow.
    #[error("situation `{0}` is not registered in the flow")]
    SituationNotInFlow(String),

    /// A situation with the same name is already registered.
    #[error("situation `{0}` is already registered")]
    DuplicateSituation(String),

    /// The loader reports that the key does not exist.
    #[error("asset `{0}` does not exist")]
    AssetNotFound(String),

    /// The loader failed to produce the resource.
    #[error("asset `{key}` failed to load: {reason}")]
    LoadFailed { key: String, reason: String },

    /// A required service was never inserted into the context.
    #[error("service `{0}` is not available")]
    MissingService(&'static str),

    /// No constructor is registered under the factory key.
    #[error("no situation factory registered for `{0}`")]
    UnknownFactory(String),

    /// The director's command channel has been closed.
    #[error("director is no longer running")]
    Disconnected,
}

impl FlowError {
    /// Wraps a hook error raised by `situation` during `phase`.
    pub(crate) fn phase_failed(situation: &str, phase: Phase, cause: HookError) -> Self {
        Self::PhaseFailed {
            situation: situation.to_string(),
            phase,
            cause: Arc::new(cause),
        }
    }

    /// Returns true for errors caused by a cancelled attempt.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

//=========================================================================
// Tests
//=========================================================================
