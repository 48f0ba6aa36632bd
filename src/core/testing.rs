//=========================================================================
// Test Support
//=========================================================================
//
// Shared fixtures for unit tests across the core modules.
//
// - EventLog: ordered record of hook calls, shared by every fixture
// - ManualLoader: in-memory loader whose handles tests settle by hand
// - Probe: configurable situation logging every lifecycle hook
// - RecordingEffect: transition effect logging every protocol call
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::task::Poll;

use anyhow::anyhow;

//=== Internal Dependencies ===============================================

use crate::core::cancel::CancelToken;
use crate::core::context::FlowContext;
use crate::core::effect::TransitionEffect;
use crate::core::preload::{LoadHandle, Loader, Resource};
use crate::core::situation::{Phase, PhaseContext, PhaseResult, Situation, READY};

//=== EventLog ============================================================

pub type EventLog = Rc<RefCell<Vec<String>>>;

pub fn new_log() -> EventLog {
    Rc::new(RefCell::new(Vec::new()))
}

fn record(log: &EventLog, entry: String) {
    log.borrow_mut().push(entry);
}

//=== ManualLoader ========================================================

/// Loader over a fixed key set. Handles stay pending unless the loader was
/// built with [`ManualLoader::ready`].
pub struct ManualLoader {
    keys: HashSet<String>,
    immediate: bool,
    log: EventLog,
    handles: Rc<RefCell<HashMap<String, LoadHandle>>>,
}

impl ManualLoader {
    pub fn with_keys(keys: &[&str]) -> Self {
        Self {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            immediate: false,
            log: new_log(),
            handles: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// Loader whose handles are ready as soon as they are created.
    pub fn ready(keys: &[&str]) -> Self {
        Self {
            immediate: true,
            ..Self::with_keys(keys)
        }
    }

    pub fn log(&self) -> EventLog {
        Rc::clone(&self.log)
    }

    /// Most recent handle per key, for settling from the test body.
    pub fn handles(&self) -> Rc<RefCell<HashMap<String, LoadHandle>>> {
        Rc::clone(&self.handles)
    }
}

impl Loader for ManualLoader {
    fn exists(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    fn load(&mut self, key: &str, _cancel: CancelToken) -> LoadHandle {
        record(&self.log, format!("load {key}"));

        let handle = if self.immediate {
            LoadHandle::ready(key, Resource::new(key.to_string()))
        } else {
            LoadHandle::pending(key)
        };
        self.handles.borrow_mut().insert(key.to_string(), handle.clone());
        handle
    }

    fn unload(&mut self, key: &str, _resource: Option<Resource>) {
        record(&self.log, format!("unload {key}"));
    }
}

//=== Probe ===============================================================

/// Situation recording `"<name>:<hook>"` for every hook it runs.
///
/// Suspendable hooks log when they start and can be told to stay pending
/// for a number of polls or to fail.
pub struct Probe {
    name: String,
    log: EventLog,
    pending: HashMap<Phase, u32>,
    running: Option<(Phase, u32)>,
    acquires: Vec<String>,
    loads: u32,
    fail_on_load: Option<u32>,
    pub fail_at: Option<Phase>,
    pub updates: u32,
    pub late_updates: u32,
    pub fixed_updates: u32,
}

impl Probe {
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            log: Rc::clone(log),
            pending: HashMap::new(),
            running: None,
            acquires: Vec::new(),
            loads: 0,
            fail_on_load: None,
            fail_at: None,
            updates: 0,
            late_updates: 0,
            fixed_updates: 0,
        }
    }

    /// Keeps the hook of `phase` pending for `polls` polls.
    pub fn pending_at(mut self, phase: Phase, polls: u32) -> Self {
        self.pending.insert(phase, polls);
        self
    }

    /// Makes the hook of `phase` fail.
    pub fn fail_at(mut self, phase: Phase) -> Self {
        self.fail_at = Some(phase);
        self
    }

    /// Makes only the `nth` load (1-based) fail.
    pub fn fail_on_load(mut self, nth: u32) -> Self {
        self.fail_on_load = Some(nth);
        self
    }

    /// Acquires `key` through the phase context while loading.
    pub fn acquires(mut self, key: &str) -> Self {
        self.acquires.push(key.to_string());
        self
    }

    fn note(&self, hook: &str) {
        record(&self.log, format!("{}:{}", self.name, hook));
    }

    fn poll_phase(&mut self, phase: Phase, hook: &str, cx: &mut PhaseContext<'_>) -> PhaseResult {
        let remaining = match self.running {
            Some((running, remaining)) if running == phase => remaining,
            _ => {
                self.note(hook);
                if phase == Phase::Loading {
                    self.loads += 1;
                    for key in self.acquires.clone() {
                        cx.acquire(&key)?;
                    }
                }
                self.pending.get(&phase).copied().unwrap_or(0)
            }
        };

        let failing_load = phase == Phase::Loading && self.fail_on_load == Some(self.loads);
        if self.fail_at == Some(phase) || failing_load {
            self.running = None;
            return Err(anyhow!("{} failed while {}", self.name, phase));
        }

        if remaining > 0 {
            self.running = Some((phase, remaining - 1));
            return Ok(Poll::Pending);
        }

        self.running = None;
        READY
    }
}

impl Situation for Probe {
    fn poll_load(&mut self, cx: &mut PhaseContext<'_>) -> PhaseResult {
        self.poll_phase(Phase::Loading, "load", cx)
    }

    fn poll_setup(&mut self, cx: &mut PhaseContext<'_>) -> PhaseResult {
        self.poll_phase(Phase::SettingUp, "setup", cx)
    }

    fn on_activate(&mut self, _cx: &mut PhaseContext<'_>) {
        self.note("activate");
    }

    fn on_deactivate(&mut self, _cx: &mut PhaseContext<'_>) {
        self.note("deactivate");
    }

    fn poll_open(&mut self, cx: &mut PhaseContext<'_>) -> PhaseResult {
        self.poll_phase(Phase::Opening, "open", cx)
    }

    fn poll_close(&mut self, cx: &mut PhaseContext<'_>) -> PhaseResult {
        self.poll_phase(Phase::Closing, "close", cx)
    }

    fn on_cleanup(&mut self, _cx: &mut PhaseContext<'_>) {
        self.note("cleanup");
    }

    fn on_unload(&mut self, _cx: &mut PhaseContext<'_>) {
        self.running = None;
        self.note("unload");
    }

    fn update(&mut self, _cx: &mut FlowContext) {
        self.updates += 1;
    }

    fn late_update(&mut self, _cx: &mut FlowContext) {
        self.late_updates += 1;
    }

    fn fixed_update(&mut self, _cx: &mut FlowContext) {
        self.fixed_updates += 1;
    }
}

//=== RecordingEffect =====================================================

/// Effect recording `"fx:<name>:<call>"` for every protocol call.
pub struct RecordingEffect {
    name: String,
    log: EventLog,
    enter_ticks: u32,
    remaining: u32,
    failing_enter: bool,
}

impl RecordingEffect {
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            log: Rc::clone(log),
            enter_ticks: 0,
            remaining: 0,
            failing_enter: false,
        }
    }

    /// Keeps the enter routine pending for `ticks` polls.
    pub fn enter_ticks(mut self, ticks: u32) -> Self {
        self.enter_ticks = ticks;
        self
    }

    pub fn failing_enter(mut self) -> Self {
        self.failing_enter = true;
        self
    }

    fn note(&self, call: &str) {
        record(&self.log, format!("fx:{}:{}", self.name, call));
    }
}

impl TransitionEffect for RecordingEffect {
    fn begin_transition(&mut self, _cx: &mut FlowContext) {
        self.remaining = self.enter_ticks;
        self.note("begin");
    }

    fn poll_enter(&mut self, _cx: &mut FlowContext) -> PhaseResult {
        if self.failing_enter {
            return Err(anyhow!("{} enter failed", self.name));
        }
        if self.remaining > 0 {
            self.remaining -= 1;
            return Ok(Poll::Pending);
        }
        self.note("enter");
        READY
    }

    fn update(&mut self, _cx: &mut FlowContext) {
        self.note("update");
    }

    fn poll_exit(&mut self, _cx: &mut FlowContext) -> PhaseResult {
        self.note("exit");
        READY
    }

    fn end_transition(&mut self, _cx: &mut FlowContext) {
        self.note("end");
    }

    fn label(&self) -> &str {
        &self.name
    }
}
