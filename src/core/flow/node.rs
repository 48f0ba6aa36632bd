//=========================================================================
// Situation Node
//=========================================================================

//=== External Dependencies ===============================================

use std::fmt;

//=== Internal Dependencies ===============================================

use crate::core::situation::SituationId;

//=== NodeId ==============================================================

/// Identifier of a node inside its flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

//=== FallbackTarget ======================================================

/// Where a request for a node goes when the current node has no direct
/// edge to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackTarget {
    Node(NodeId),
    Root,
}

//=== SituationNode =======================================================

/// Graph vertex wrapping exactly one situation.
#[derive(Debug, Clone)]
pub struct SituationNode {
    id: NodeId,
    situation: SituationId,
    edges: Vec<NodeId>,
    fallback: Option<FallbackTarget>,
}

impl SituationNode {
    pub(crate) fn new(id: NodeId, situation: SituationId) -> Self {
        Self {
            id,
            situation,
            edges: Vec::new(),
            fallback: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn situation(&self) -> SituationId {
        self.situation
    }

    /// Outgoing edges in insertion order.
    pub fn edges(&self) -> &[NodeId] {
        &self.edges
    }

    pub fn fallback(&self) -> Option<FallbackTarget> {
        self.fallback
    }

    pub fn has_edge_to(&self, node: NodeId) -> bool {
        self.edges.contains(&node)
    }

    pub(crate) fn add_edge(&mut self, to: NodeId) -> bool {
        if self.has_edge_to(to) {
            return false;
        }
        self.edges.push(to);
        true
    }

    pub(crate) fn set_fallback(&mut self, fallback: Option<FallbackTarget>) {
        self.fallback = fallback;
    }
}
