//! Dead code elimination, branch-pruning variant.
//!
//! Expression death is implicit in this IR: a node with no refs is
//! unreachable and costs nothing. What this pass removes is control: any
//! `If` (or `LoopHeader`) whose condition the boolean projection decides
//! gets its dead arm detached, its merge phis collapsed onto the live
//! value, and the branch node itself spliced out of the control chain.
//! A final sweep unlinks whatever control became unreachable, shrinking
//! downstream phis in step with their predecessor lists.

use lavac_util::DenseBitSet;
use tracing::debug;

use crate::graph::Graph;
use crate::iter::control_rpo;
use crate::node::{NodeId, NodeKind};
use crate::types::TypeInference;

use super::{purge_if_dead, HirPass, PassFlag};

pub struct Dce;

struct PrunedBranch {
    branch: NodeId,
    taken: bool,
}

impl Dce {
    fn prune_if(&self, graph: &mut Graph, branch: NodeId, taken: bool, merge: NodeId) {
        let if_true = graph.if_true_of(branch);
        let if_false = graph.if_false_of(branch);
        let live = if taken { if_true } else { if_false };
        let parent = graph.node(branch).preds()[0];

        // with both arms flowing into the merge, operand k of each phi
        // corresponds to predecessor k and the true side built
        // predecessor 0; collapse onto the live input
        if graph.node(merge).preds().len() == 2 {
            let phis: Vec<NodeId> = graph
                .node(merge)
                .operands()
                .iter()
                .copied()
                .filter(|&n| graph.kind(n).phi_region() == Some(merge))
                .collect();
            for phi in phis {
                let value = graph.node(phi).operands()[if taken { 0 } else { 1 }];
                graph.remove_operand_value(merge, phi);
                graph.replace(phi, value);
            }
            let dead_pred = graph.node(merge).preds()[if taken { 1 } else { 0 }];
            graph.unlink(dead_pred, merge);
        }

        // splice the branch out: parent flows straight into the live arm
        graph.unlink(parent, branch);
        graph.unlink(branch, if_true);
        graph.unlink(branch, if_false);
        graph.link(parent, live);

        // the branch node dies with its condition reference
        let cond = graph.node(branch).operands()[0];
        graph.clear_edges(branch);
        purge_if_dead(graph, cond);
    }

    /// A loop whose condition is statically false never runs: route the
    /// entry straight to the exit and collapse the loop-carried values to
    /// their initials.
    fn prune_dead_loop(&self, graph: &mut Graph, header: NodeId, exit: NodeId) {
        let parent = graph.node(header).preds()[0];
        let phis: Vec<NodeId> = graph
            .node(header)
            .operands()
            .iter()
            .copied()
            .filter(|&n| graph.kind(n).phi_region() == Some(header))
            .collect();
        for phi in phis {
            let init = graph.node(phi).operands()[0];
            graph.remove_operand_value(header, phi);
            graph.replace(phi, init);
        }
        let succs: Vec<NodeId> = graph.node(header).succs().to_vec();
        for s in succs {
            graph.unlink(header, s);
        }
        graph.unlink(parent, header);
        graph.link(parent, exit);
        graph.move_statements(header, parent);
        graph.clear_edges(header);
    }

    /// Unlink every control node no longer reachable from start; phis at
    /// the surviving frontier lose the operands of dropped predecessors.
    fn remove_unreachable(&self, graph: &mut Graph) {
        let mut reachable = DenseBitSet::new(graph.max_id());
        for n in control_rpo(graph) {
            reachable.insert(n.0 as usize);
        }
        for id in graph.node_ids() {
            if !graph.kind(id).is_control() || reachable.contains(id.0 as usize) {
                continue;
            }
            let succs: Vec<NodeId> = graph.node(id).succs().to_vec();
            for s in succs {
                if let Some(idx) = graph.node(s).preds().iter().position(|&p| p == id) {
                    let phis: Vec<NodeId> = graph
                        .node(s)
                        .operands()
                        .iter()
                        .copied()
                        .filter(|&n| graph.kind(n).phi_region() == Some(s))
                        .collect();
                    for phi in phis {
                        if graph.node(phi).operands().len() > idx {
                            graph.remove_operand(phi, idx);
                        }
                    }
                }
                graph.unlink(id, s);
            }
        }
    }
}

impl HirPass for Dce {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn perform(&mut self, graph: &mut Graph, flag: PassFlag) -> bool {
        let mut ti = TypeInference::new(graph);
        let mut branches: Vec<PrunedBranch> = Vec::new();
        let mut dead_loops: Vec<(NodeId, NodeId)> = Vec::new();

        for cf in control_rpo(graph) {
            match graph.kind(cf) {
                NodeKind::If { merge } if merge.is_valid() => {
                    let cond = graph.node(cf).operands()[0];
                    if let Some(taken) = ti.boolean_value(graph, cond) {
                        branches.push(PrunedBranch { branch: cf, taken });
                    }
                }
                NodeKind::LoopHeader { merge } if merge.is_valid() => {
                    // the loop condition travels on the exit node
                    let cond = graph.node(merge).operands()[0];
                    if ti.boolean_value(graph, cond) == Some(false) {
                        dead_loops.push((cf, merge));
                    }
                }
                _ => {}
            }
        }

        let changed = !branches.is_empty() || !dead_loops.is_empty();
        for b in branches {
            debug!(branch = ?b.branch, taken = b.taken, "pruning decided branch");
            let NodeKind::If { merge } = graph.kind(b.branch) else {
                continue;
            };
            self.prune_if(graph, b.branch, b.taken, merge);
        }
        for (header, exit) in dead_loops {
            debug!(?header, "removing never-entered loop");
            self.prune_dead_loop(graph, header, exit);
        }
        if changed {
            self.remove_unreachable(graph);
        }

        if flag == PassFlag::Debug {
            debug_assert!(super::verify_edges(graph));
        }
        changed
    }
}
