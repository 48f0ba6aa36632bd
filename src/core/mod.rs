//=========================================================================
// Core
//
// Orchestration layer moving the application between situations.
//
// Layers (bottom-up):
// - cancel / error:  cancellation tokens and the error vocabulary
// - preload:         reference-counted asset cache in front of a Loader
// - context:         services, preload, request queue, frame time
// - situation:       lifecycle hooks, registry, scopes, factory
// - effect:          transition effect protocol and built-ins
// - container:       phase sequencing for one live chain
// - flow:            navigation graph, fallbacks, history
//
// Everything here runs on one thread and is advanced cooperatively once
// per tick; only loaders and the director talk across threads.
//
//=========================================================================

pub mod cancel;
pub mod container;
pub mod context;
pub mod effect;
pub mod error;
pub mod flow;
pub mod preload;
pub mod situation;

#[cfg(test)]
pub(crate) mod testing;
