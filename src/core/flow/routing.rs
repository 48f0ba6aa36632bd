//=========================================================================
// Route Resolution
//=========================================================================
//
// Pure graph logic behind SituationFlow::transition.
//
// Flow:
//   requested ─ direct edge from current? ─ yes ─> requested
//                                         └ no ─> fallback (one hop) or requested
//   target ─> walk stack top → root:
//               node == target  ─> truncate stack there
//               BFS node→target ─> stack[..node] + shortest path
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::VecDeque;

//=== Internal Dependencies ===============================================

use super::node::{FallbackTarget, NodeId, SituationNode};

//=== Target Resolution ===================================================

/// Applies at most one fallback hop to `requested`.
pub(crate) fn resolve_target(
    nodes: &[SituationNode],
    current: NodeId,
    requested: NodeId,
    root: NodeId,
) -> NodeId {
    if requested == current || nodes[current.0].has_edge_to(requested) {
        return requested;
    }

    match nodes[requested.0].fallback() {
        Some(FallbackTarget::Node(node)) => node,
        Some(FallbackTarget::Root) => root,
        None => requested,
    }
}

//=== Route Search ========================================================

/// New navigation stack reaching `target`, or `None` if unreachable.
pub(crate) fn find_route(nodes: &[SituationNode], stack: &[NodeId], target: NodeId) -> Option<Vec<NodeId>> {
    for depth in (0..stack.len()).rev() {
        let node = stack[depth];
        if node == target {
            return Some(stack[..=depth].to_vec());
        }

        if let Some(path) = shortest_path(nodes, node, target) {
            let mut route = stack[..depth].to_vec();
            route.extend(path);
            return Some(route);
        }
    }

    None
}

/// Breadth-first search over edges. The path starts with `from`.
pub(crate) fn shortest_path(nodes: &[SituationNode], from: NodeId, to: NodeId) -> Option<Vec<NodeId>> {
    let mut previous: Vec<Option<NodeId>> = vec![None; nodes.len()];
    let mut visited = vec![false; nodes.len()];
    let mut queue = VecDeque::from([from]);
    visited[from.0] = true;

    while let Some(node) = queue.pop_front() {
        if node == to {
            let mut path = vec![to];
            let mut cursor = to;
            while let Some(prev) = previous[cursor.0] {
                path.push(prev);
                cursor = prev;
            }
            path.reverse();
            return Some(path);
        }

        for &next in nodes[node.0].edges() {
            if !visited[next.0] {
                visited[next.0] = true;
                previous[next.0] = Some(node);
                queue.push_back(next);
            }
        }
    }

    None
}

//=========================================================================
// Tests
//=========================================================================
