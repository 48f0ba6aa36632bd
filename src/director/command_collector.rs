//=========================================================================
// Command Collector
//=========================================================================
//
// Drains director commands with bounded polling and shutdown detection.
//
// Architecture:
//   Receiver<Command> → collect_tick() → requests → SituationFlow queue
//
// Bounded draining keeps one burst of commands from starving the tick.
//
//=========================================================================

//=== External Dependencies ===============================================

use crossbeam_channel::{Receiver, TryRecvError};
use log::warn;

//=== Internal Dependencies ===============================================

use crate::core::context::FlowRequest;

//=== Command =============================================================

/// Message sent to a running director.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Request(FlowRequest),
    Shutdown,
}

//=== TickControl =========================================================

/// Director loop control signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    Continue,
    Exit,
}

//=== CommandCollector ====================================================

pub(crate) struct CommandCollector {
    receiver: Receiver<Command>,
    max_per_tick: usize,
    requests: Vec<FlowRequest>,
}

impl CommandCollector {
    pub(crate) fn new(receiver: Receiver<Command>, max_per_tick: usize) -> Self {
        Self {
            receiver,
            max_per_tick,
            requests: Vec::with_capacity(4),
        }
    }

    /// Collects pending commands, at most `max_per_tick` of them.
    ///
    /// Returns `Exit` on a shutdown command or once every sender is gone.
    /// Requests received before the shutdown are still collected.
    pub(crate) fn collect_tick(&mut self) -> TickControl {
        let mut drained = 0;

        while drained < self.max_per_tick {
            match self.receiver.try_recv() {
                Ok(Command::Request(request)) => {
                    self.requests.push(request);
                    drained += 1;
                }
                Ok(Command::Shutdown) => return TickControl::Exit,
                Err(TryRecvError::Disconnected) => return TickControl::Exit,
                Err(TryRecvError::Empty) => break,
            }
        }

        if drained >= self.max_per_tick {
            warn!("Command backlog: drained {} commands this tick", drained);
        }

        TickControl::Continue
    }

    /// Takes the collected requests, leaving an empty buffer.
    pub(crate) fn take_requests(&mut self) -> Vec<FlowRequest> {
        std::mem::take(&mut self.requests)
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
