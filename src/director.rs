//=========================================================================
// Director
//=========================================================================
//
// Fixed-rate host loop driving a SituationFlow.
//
// Architecture:
// ```text
//     DirectorBuilder  ──build(flow)──>  Director  ──run()──>  SituationFlow
//         │                                 │
//         ├─ with_tps()                     ├─ sender() → CommandSender (any thread)
//         ├─ with_channel_capacity()        └─ tick(): commands → flow queue
//         └─ with_max_commands_per_tick()             update / fixed / late
// ```
//
// The flow itself stays on the director's thread; other threads only
// talk to it through the bounded command channel.
//
//=========================================================================

//=== Module Declarations =================================================

mod command_collector;

//=== Public API ==========================================================

pub use command_collector::TickControl;

//=== External Dependencies ===============================================

use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Sender};
use log::{error, info};

//=== Internal Dependencies ===============================================

use crate::core::context::FlowRequest;
use crate::core::error::FlowError;
use crate::core::flow::SituationFlow;
use command_collector::{Command, CommandCollector};

//=== DirectorBuilder =====================================================

/// Builder for configuring and constructing a [`Director`].
///
/// # Default Values
///
/// - **TPS**: 60.0 (flow ticks per second)
/// - **Channel capacity**: 128 commands
/// - **Commands per tick**: 100
///
/// # Examples
///
/// ```no_run
/// use aetheric_flow::prelude::*;
///
/// struct Title;
/// impl Situation for Title {}
///
/// let mut flow = SituationFlow::new();
/// let title = flow.add("Title", Title, None).unwrap();
/// flow.connect_root(title).unwrap();
///
/// let director = DirectorBuilder::new()
///     .with_tps(120.0)
///     .with_channel_capacity(256)
///     .build(flow);
///
/// let commands = director.sender();
/// std::thread::spawn(move || {
///     commands.shutdown().ok();
/// });
///
/// let flow = director.run();
/// ```
pub struct DirectorBuilder {
    tps: f64,
    channel_capacity: usize,
    max_commands_per_tick: usize,
}

impl DirectorBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            tps: 60.0,
            channel_capacity: 128,
            max_commands_per_tick: 100,
        }
    }

    /// Sets the target ticks per second.
    ///
    /// Each tick advances the flow by `1 / tps` seconds.
    ///
    /// # Panics
    ///
    /// Panics if `tps <= 0.0`.
    pub fn with_tps(mut self, tps: f64) -> Self {
        assert!(tps > 0.0, "TPS must be positive, got {}", tps);
        self.tps = tps;
        self
    }

    /// Sets the capacity of the command channel. Senders block while it is
    /// full.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "Channel capacity must be positive");
        self.channel_capacity = capacity;
        self
    }

    /// Sets how many commands one tick drains at most.
    ///
    /// # Panics
    ///
    /// Panics if `max == 0`.
    pub fn with_max_commands_per_tick(mut self, max: usize) -> Self {
        assert!(max > 0, "Commands per tick must be positive");
        self.max_commands_per_tick = max;
        self
    }

    /// Builds the director around `flow`.
    pub fn build(self, flow: SituationFlow) -> Director {
        info!(
            "Building director (TPS: {}, channel: {})",
            self.tps, self.channel_capacity
        );

        let (sender, receiver) = bounded(self.channel_capacity);

        Director {
            flow,
            collector: CommandCollector::new(receiver, self.max_commands_per_tick),
            sender: Some(sender),
            tps: self.tps,
            frame: Duration::from_secs_f64(1.0 / self.tps),
        }
    }
}

impl Default for DirectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

//=== CommandSender =======================================================

/// Cloneable, thread-safe handle for steering a [`Director`].
#[derive(Debug, Clone)]
pub struct CommandSender {
    sender: Sender<Command>,
}

impl CommandSender {
    /// Queues a navigation request for the next tick.
    pub fn request(&self, request: FlowRequest) -> Result<(), FlowError> {
        self.send(Command::Request(request))
    }

    /// Asks the director to stop after the current tick.
    pub fn shutdown(&self) -> Result<(), FlowError> {
        self.send(Command::Shutdown)
    }

    fn send(&self, command: Command) -> Result<(), FlowError> {
        self.sender.send(command).map_err(|_| FlowError::Disconnected)
    }
}

//=== Director ============================================================

/// Fixed-timestep driver for a [`SituationFlow`].
pub struct Director {
    flow: SituationFlow,
    collector: CommandCollector,
    sender: Option<Sender<Command>>,
    tps: f64,
    frame: Duration,
}

impl Director {
    /// Returns a sender for other threads. Create senders before calling
    /// [`run`](Self::run), which consumes the director.
    pub fn sender(&self) -> CommandSender {
        let sender = match &self.sender {
            Some(sender) => sender.clone(),
            None => bounded(0).0,
        };
        CommandSender { sender }
    }

    pub fn flow(&self) -> &SituationFlow {
        &self.flow
    }

    pub fn flow_mut(&mut self) -> &mut SituationFlow {
        &mut self.flow
    }

    /// Length of one tick.
    pub fn frame(&self) -> Duration {
        self.frame
    }

    //--- Execution --------------------------------------------------------

    /// Runs one tick: drains commands into the flow's request queue, then
    /// advances the flow by one timestep.
    pub fn tick(&mut self) -> TickControl {
        let control = self.collector.collect_tick();

        for request in self.collector.take_requests() {
            self.flow.context_mut().requests.push(request);
        }

        self.flow.update(self.frame);
        self.flow.fixed_update();
        self.flow.late_update();

        control
    }

    /// Starts the flow if needed and ticks at the configured rate until a
    /// shutdown command arrives or every sender has been dropped.
    ///
    /// Returns the flow for inspection or reuse.
    pub fn run(mut self) -> SituationFlow {
        info!("Starting director (TPS: {})", self.tps);

        // Only external senders keep the loop alive
        self.sender = None;

        if !self.flow.is_started() && !self.flow.is_transitioning() {
            let handle = self.flow.start();
            if let Some(e) = handle.error() {
                error!("Flow failed to start: {}", e);
            }
        }

        loop {
            let frame_start = Instant::now();

            if self.tick() == TickControl::Exit {
                info!("Director shutting down");
                break;
            }

            let elapsed = frame_start.elapsed();
            if elapsed < self.frame {
                thread::sleep(self.frame - elapsed);
            }
        }

        self.flow
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
