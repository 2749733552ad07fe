//! Graph traversal orders.
//!
//! Control flow is traversed in reverse post-order so predecessors are
//! seen before successors on acyclic paths; loop back edges are broken by
//! the visited set. Expressions hanging off a control node are walked in
//! operand-first (post) order so rewrites see children before parents.

use lavac_util::DenseBitSet;

use crate::graph::Graph;
use crate::node::NodeId;

/// Reverse post-order over the control nodes reachable from `start`.
pub fn control_rpo(graph: &Graph) -> Vec<NodeId> {
    control_rpo_from(graph, graph.start())
}

/// Reverse post-order over the control nodes reachable from `entry`.
pub fn control_rpo_from(graph: &Graph, entry: NodeId) -> Vec<NodeId> {
    let mut visited = DenseBitSet::new(graph.max_id());
    let mut order = Vec::new();
    // iterative DFS carrying an explicit successor cursor per frame
    let mut stack: Vec<(NodeId, usize)> = Vec::new();
    visited.insert(entry.0 as usize);
    stack.push((entry, 0));
    while let Some(frame) = stack.last_mut() {
        let (node, cursor) = *frame;
        let succs = graph.node(node).succs();
        if cursor < succs.len() {
            let next = succs[cursor];
            frame.1 = cursor + 1;
            if visited.insert(next.0 as usize) {
                stack.push((next, 0));
            }
        } else {
            order.push(node);
            stack.pop();
        }
    }
    order.reverse();
    order
}

/// Post-order (operands before users) over the pure expression tree rooted
/// at `root`. Effect-list entries participate: memory order is data
/// dependence here. Control nodes are never entered.
pub fn expr_postorder(graph: &Graph, root: NodeId, visited: &mut DenseBitSet) -> Vec<NodeId> {
    let mut order = Vec::new();
    if graph.kind(root).is_control() {
        return order;
    }
    let mut stack: Vec<(NodeId, usize)> = Vec::new();
    if !visited.insert(root.0 as usize) {
        return order;
    }
    stack.push((root, 0));
    while let Some(frame) = stack.last_mut() {
        let (node, cursor) = *frame;
        let n = graph.node(node);
        let operand_count = n.operands().len();
        let total = operand_count + n.effects().len();
        if cursor < total {
            let next = if cursor < operand_count {
                n.operands()[cursor]
            } else {
                n.effects()[cursor - operand_count]
            };
            frame.1 = cursor + 1;
            if !graph.kind(next).is_control() && visited.insert(next.0 as usize) {
                stack.push((next, 0));
            }
        } else {
            order.push(node);
            stack.pop();
        }
    }
    order
}
