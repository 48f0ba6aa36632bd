//=========================================================================
// Aetheric Flow — Library Root
//
// Hierarchical situation flow for game clients: named situations
// (scenes, sub-screens, modals) entered and left through phased,
// cancellable transitions with visual effects and graph navigation.
//
// Responsibilities:
// - Expose the situation, container, flow and effect APIs (`core`)
// - Provide a fixed-rate host loop with a cross-thread command channel
//   (`Director`)
//
// Typical usage:
// ```no_run
// use aetheric_flow::prelude::*;
//
// struct Title;
// impl Situation for Title {}
//
// let mut flow = SituationFlow::new();
// let title = flow.add("Title", Title, None).unwrap();
// flow.connect_root(title).unwrap();
//
// let director = DirectorBuilder::new().build(flow);
//
// // `run` returns once a shutdown arrives or every sender is dropped
// let commands = director.sender();
// std::thread::spawn(move || {
//     commands.request(FlowRequest::Transition(title)).ok();
//     commands.shutdown().ok();
// });
//
// let flow = director.run();
// ```
//
//=========================================================================

//--- Public Modules ------------------------------------------------------
//
// `core` holds the orchestration layer itself. `prelude` re-exports the
// types most hosts and situations need.
//
pub mod core;
pub mod prelude;

//--- Internal Modules ----------------------------------------------------
//
// `director` drives a flow at a fixed rate and is re-exported below.
//
mod director;

//--- Public Exports ------------------------------------------------------

pub use director::{CommandSender, Director, DirectorBuilder, TickControl};
