//=========================================================================
// Situation Flow
//=========================================================================
//
// Navigation graph over situations, with fallback routing and history.
//
// Architecture:
//   SituationFlow
//     ├─ nodes: Vec<SituationNode>      (edges + optional fallback)
//     ├─ root / stack                   (root-to-current navigation path)
//     ├─ container: SituationContainer  (runs the actual transitions)
//     └─ context: FlowContext           (services, preload, requests)
//
// Flow:
//   transition(node) ─> resolve fallback ─> find route over stack + edges
//                    ─> container.transition(target situation)
//                    ─> stack replaced only once the handle succeeds
//
// Requests queued by situations are applied at the tick boundary once
// the container is idle.
//
//=========================================================================

//=== Module Declarations =================================================

mod node;
mod routing;

//=== Public API ==========================================================

pub use node::{FallbackTarget, NodeId, SituationNode};

//=== External Dependencies ===============================================

use std::any::type_name;
use std::collections::HashMap;
use std::time::Duration;

use log::{debug, info, warn};

//=== Internal Dependencies ===============================================

use crate::core::container::{SituationContainer, TransitionHandle, TransitionType};
use crate::core::context::{FlowContext, FlowRequest};
use crate::core::effect::EffectList;
use crate::core::error::FlowError;
use crate::core::situation::{Situation, SituationFactory, SituationId};

//=== Type Aliases ========================================================

type EffectFactory = Box<dyn Fn() -> EffectList>;

//=== PendingMove =========================================================

struct PendingMove {
    stack: Vec<NodeId>,
    handle: TransitionHandle,
}

//=== SituationFlow =======================================================

/// Graph-driven navigation between situations.
///
/// # Example
///
/// ```rust
/// use aetheric_flow::prelude::*;
///
/// struct Title;
/// impl Situation for Title {}
///
/// struct Options;
/// impl Situation for Options {}
///
/// let mut flow = SituationFlow::new();
/// let title = flow.add("Title", Title, None).unwrap();
/// let options = flow.add("Options", Options, None).unwrap();
/// flow.connect_root(title).unwrap();
/// flow.connect(title, options).unwrap();
///
/// flow.start();
/// assert!(flow.transition(options).succeeded());
/// assert_eq!(flow.stack(), [title, options]);
/// ```
pub struct SituationFlow {
    container: SituationContainer,
    context: FlowContext,
    nodes: Vec<SituationNode>,
    by_situation: HashMap<SituationId, NodeId>,
    root: Option<NodeId>,
    stack: Vec<NodeId>,
    pending: Option<PendingMove>,
    default_effects: Option<EffectFactory>,
}

impl SituationFlow {
    //--- Construction -----------------------------------------------------

    pub fn new() -> Self {
        Self::with_context(FlowContext::default())
    }

    /// Creates a flow around a host-prepared context (services, loader).
    pub fn with_context(context: FlowContext) -> Self {
        Self {
            container: SituationContainer::new(),
            context,
            nodes: Vec::new(),
            by_situation: HashMap::new(),
            root: None,
            stack: Vec::new(),
            pending: None,
            default_effects: None,
        }
    }

    //--- Registration -----------------------------------------------------

    /// Registers a situation without giving it a node (e.g. a parent scene
    /// that is never navigated to directly).
    pub fn register_situation<S: Situation>(
        &mut self,
        name: &str,
        situation: S,
        parent: Option<SituationId>,
    ) -> Result<SituationId, FlowError> {
        self.container.register(name, situation, parent)
    }

    /// Registers a situation and wraps it in a new node.
    pub fn add<S: Situation>(
        &mut self,
        name: &str,
        situation: S,
        parent: Option<SituationId>,
    ) -> Result<NodeId, FlowError> {
        let id = self.container.register(name, situation, parent)?;
        self.create_node(id)
    }

    /// Builds the situation registered under `key` in `factory`, registers
    /// it under the same name and wraps it in a new node.
    pub fn add_from_factory(
        &mut self,
        factory: &SituationFactory,
        key: &str,
        parent: Option<SituationId>,
    ) -> Result<NodeId, FlowError> {
        let situation = factory.build(key)?;
        let id = self.container.registry_mut().insert_boxed(key, situation, parent)?;
        self.create_node(id)
    }

    /// Wraps an already registered situation in a node. A situation has at
    /// most one node; wrapping it again returns the existing node.
    pub fn create_node(&mut self, situation: SituationId) -> Result<NodeId, FlowError> {
        if !self.container.registry().contains(situation) {
            return Err(FlowError::UnknownSituation(situation));
        }
        if let Some(&existing) = self.by_situation.get(&situation) {
            debug!("Situation {} already has node {}", situation, existing);
            return Ok(existing);
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(SituationNode::new(id, situation));
        self.by_situation.insert(situation, id);
        Ok(id)
    }

    //--- Graph Wiring -----------------------------------------------------

    /// Sets the entry point of the flow.
    pub fn connect_root(&mut self, node: NodeId) -> Result<(), FlowError> {
        self.check_node(node)?;
        if let Some(previous) = self.root.replace(node) {
            if previous != node {
                warn!("Flow root changed from {} to {}", previous, node);
            }
        }
        Ok(())
    }

    /// Adds the directed edge `from → to`.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), FlowError> {
        self.check_node(from)?;
        self.check_node(to)?;
        if !self.nodes[from.0].add_edge(to) {
            debug!("Edge {} -> {} already exists", from, to);
        }
        Ok(())
    }

    /// Routes requests for `node` to `fallback` when the current node has
    /// no direct edge to it. `None` routes to the root.
    pub fn set_fallback_node(&mut self, node: NodeId, fallback: Option<NodeId>) -> Result<(), FlowError> {
        self.check_node(node)?;
        let target = match fallback {
            Some(to) => {
                self.check_node(to)?;
                FallbackTarget::Node(to)
            }
            None => FallbackTarget::Root,
        };
        self.nodes[node.0].set_fallback(Some(target));
        Ok(())
    }

    /// Effects used by requests that do not pass their own.
    pub fn set_default_effects<F>(&mut self, make: F)
    where
        F: Fn() -> EffectList + 'static,
    {
        self.default_effects = Some(Box::new(make));
    }

    //--- Navigation -------------------------------------------------------

    /// Enters the root for the first time.
    pub fn start(&mut self) -> TransitionHandle {
        if self.is_started() {
            warn!("Flow already started");
            return self.completed_at_top();
        }
        self.reset()
    }

    /// Navigates to `node` with the default effects.
    pub fn transition(&mut self, node: NodeId) -> TransitionHandle {
        let effects = self.default_effects();
        self.transition_with(node, effects)
    }

    /// Navigates to `node` with an explicit effect list.
    pub fn transition_with(&mut self, node: NodeId, effects: EffectList) -> TransitionHandle {
        let root = match self.ready(Some(node)) {
            Ok(root) => root,
            Err(e) => return TransitionHandle::failed(e),
        };

        let stack = if self.stack.is_empty() {
            vec![root]
        } else {
            self.stack.clone()
        };
        let current = stack[stack.len() - 1];

        let target = routing::resolve_target(&self.nodes, current, node, root);
        if target != node {
            debug!(
                "No edge {} -> {}, falling back to {}",
                self.node_name(current),
                self.node_name(node),
                self.node_name(target)
            );
        }

        let Some(route) = routing::find_route(&self.nodes, &stack, target) else {
            return TransitionHandle::failed(FlowError::NoRouteFound {
                from: self.node_name(current),
                to: self.node_name(target),
            });
        };

        self.run(route, TransitionType::Push, effects)
    }

    /// Navigates to the node wrapping the first situation of type `T`.
    pub fn transition_to<T: Situation>(&mut self) -> TransitionHandle {
        match self.node_of_type::<T>() {
            Ok(node) => self.transition(node),
            Err(e) => TransitionHandle::failed(e),
        }
    }

    /// Pops one node off the stack. A no-op at the root.
    pub fn back(&mut self) -> TransitionHandle {
        let effects = self.default_effects();
        self.back_with(effects)
    }

    pub fn back_with(&mut self, effects: EffectList) -> TransitionHandle {
        if let Err(e) = self.ready(None) {
            return TransitionHandle::failed(e);
        }

        if self.stack.len() <= 1 {
            debug!("Back at the root ignored");
            return self.completed_at_top();
        }

        let route = self.stack[..self.stack.len() - 1].to_vec();
        self.run(route, TransitionType::Pop, effects)
    }

    /// Tears everything down to the root and re-enters it, clearing history.
    pub fn reset(&mut self) -> TransitionHandle {
        let effects = self.default_effects();
        self.reset_with(effects)
    }

    pub fn reset_with(&mut self, effects: EffectList) -> TransitionHandle {
        match self.ready(None) {
            Ok(root) => self.run(vec![root], TransitionType::Reset, effects),
            Err(e) => TransitionHandle::failed(e),
        }
    }

    /// Applies a queued navigation request.
    pub fn apply(&mut self, request: FlowRequest) -> TransitionHandle {
        match request {
            FlowRequest::Transition(node) => self.transition(node),
            FlowRequest::Back => self.back(),
            FlowRequest::Reset => self.reset(),
        }
    }

    fn run(&mut self, route: Vec<NodeId>, kind: TransitionType, effects: EffectList) -> TransitionHandle {
        let Some(&target) = route.last() else {
            return TransitionHandle::failed(FlowError::NoActiveGraph);
        };

        info!("Navigating to {} ({:?})", self.node_name(target), kind);

        let situation = self.nodes[target.0].situation();
        let handle = self
            .container
            .transition(situation, kind, effects, &mut self.context);
        handle.set_node(target);

        self.pending = Some(PendingMove {
            stack: route,
            handle: handle.clone(),
        });
        self.settle_pending();

        handle
    }

    /// Commits the pending stack once its transition succeeded.
    fn settle_pending(&mut self) {
        if !self.pending.as_ref().is_some_and(|p| p.handle.is_done()) {
            return;
        }
        let Some(PendingMove { stack, handle }) = self.pending.take() else {
            return;
        };

        match handle.result() {
            Some(Ok(())) => {
                debug!("Navigation stack is now {:?}", stack);
                self.stack = stack;
            }
            Some(Err(e)) => {
                debug!("Navigation stack kept after failed transition: {}", e);
                self.trim_to_live_chain();
            }
            None => {}
        }
    }

    /// Cuts the stack back to its deepest node whose situation is still
    /// live. Only shrinks after a failed restore left the chain truncated.
    fn trim_to_live_chain(&mut self) {
        let chain = self.container.current_chain();
        let live = self
            .stack
            .iter()
            .rposition(|node| chain.contains(&self.nodes[node.0].situation()));

        let keep = live.map_or(0, |depth| depth + 1);
        if keep < self.stack.len() {
            warn!(
                "Navigation stack trimmed from {:?} to {:?} after a failed restore",
                self.stack,
                &self.stack[..keep]
            );
            self.stack.truncate(keep);
        }
    }

    fn ready(&self, node: Option<NodeId>) -> Result<NodeId, FlowError> {
        let root = self.root.ok_or(FlowError::NoActiveGraph)?;
        if let Some(node) = node {
            self.check_node(node)?;
        }
        if self.container.is_transitioning() {
            warn!("Navigation rejected: a transition is already in progress");
            return Err(FlowError::TransitionAlreadyInProgress);
        }
        Ok(root)
    }

    fn completed_at_top(&self) -> TransitionHandle {
        let handle = TransitionHandle::completed();
        if let Some(&top) = self.stack.last() {
            handle.set_node(top);
        }
        handle
    }

    fn default_effects(&self) -> EffectList {
        self.default_effects.as_ref().map_or_else(Vec::new, |make| make())
    }

    //--- Update Loop ------------------------------------------------------

    /// Advances one frame, then applies queued requests if idle.
    pub fn update(&mut self, delta: Duration) {
        self.container.update(&mut self.context, delta);
        self.settle_pending();
        self.process_requests();
    }

    pub fn late_update(&mut self) {
        self.container.late_update(&mut self.context);
    }

    pub fn fixed_update(&mut self) {
        self.container.fixed_update(&mut self.context);
    }

    fn process_requests(&mut self) {
        let queued = self.context.requests.len();
        for _ in 0..queued {
            if self.container.is_transitioning() {
                break;
            }
            let Some(request) = self.context.requests.pop_front() else {
                break;
            };

            let handle = self.apply(request);
            if let Some(e) = handle.error() {
                warn!("Queued request {:?} failed: {}", request, e);
            }
        }
    }

    //--- Queries ----------------------------------------------------------

    /// All registered nodes, for tooling.
    pub fn nodes(&self) -> &[SituationNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&SituationNode> {
        self.nodes.get(id.0)
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Navigation stack, root first.
    pub fn stack(&self) -> &[NodeId] {
        &self.stack
    }

    pub fn current(&self) -> Option<NodeId> {
        self.stack.last().copied()
    }

    pub fn is_started(&self) -> bool {
        !self.stack.is_empty()
    }

    pub fn is_transitioning(&self) -> bool {
        self.container.is_transitioning()
    }

    /// Node wrapping `situation`, if any.
    pub fn node_of(&self, situation: SituationId) -> Option<NodeId> {
        self.by_situation.get(&situation).copied()
    }

    pub fn situation<T: Situation>(&self, node: NodeId) -> Option<&T> {
        let id = self.node(node)?.situation();
        self.container.situation::<T>(id)
    }

    pub fn situation_mut<T: Situation>(&mut self, node: NodeId) -> Option<&mut T> {
        let id = self.node(node)?.situation();
        self.container.situation_mut::<T>(id)
    }

    pub fn container(&self) -> &SituationContainer {
        &self.container
    }

    pub fn context(&self) -> &FlowContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut FlowContext {
        &mut self.context
    }

    //--- Helpers ----------------------------------------------------------

    fn check_node(&self, node: NodeId) -> Result<(), FlowError> {
        if node.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(FlowError::UnknownNode(node))
        }
    }

    fn node_name(&self, node: NodeId) -> String {
        self.nodes
            .get(node.0)
            .map_or("<unknown>", |n| self.container.registry().name(n.situation()))
            .to_string()
    }

    fn node_of_type<T: Situation>(&self) -> Result<NodeId, FlowError> {
        let registry = self.container.registry();
        if let Some(node) = self
            .nodes
            .iter()
            .find(|n| registry.get::<T>(n.situation()).is_some())
        {
            return Ok(node.id());
        }

        let name = match registry.find::<T>() {
            Some(id) => registry.name(id).to_string(),
            None => type_name::<T>().to_string(),
        };
        Err(FlowError::SituationNotInFlow(name))
    }
}

impl Default for SituationFlow {
    fn default() -> Self {
        Self::new()
    }
}

//=========================================================================
// Tests
//=========================================================================
