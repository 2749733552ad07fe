//! Loop structure analysis over the built graph.
//!
//! Identifies each loop nest by its header, body and exit, the back
//! edges closing it, the loop-carried values (phi-likes whose region is
//! the header) and the induction candidates among them (a `LoopIV` of the
//! shape `iv(init, step(iv, ...))`).

use crate::graph::Graph;
use crate::iter::control_rpo;
use crate::node::{NodeId, NodeKind};

/// A `LoopIV` whose step feeds back through an arithmetic node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InductionCandidate {
    pub iv: NodeId,
    pub init: NodeId,
    pub step: NodeId,
}

#[derive(Clone, Debug)]
pub struct LoopNest {
    pub header: NodeId,
    pub body: NodeId,
    pub exit: NodeId,
    /// Control nodes with a back edge into the header
    pub back_edges: Vec<NodeId>,
    /// Phi-like nodes merging at the header
    pub carried: Vec<NodeId>,
    pub inductions: Vec<InductionCandidate>,
}

#[derive(Clone, Debug, Default)]
pub struct LoopAnalysis {
    pub loops: Vec<LoopNest>,
}

impl LoopAnalysis {
    pub fn analyze(graph: &Graph) -> Self {
        let mut loops = Vec::new();
        for cf in control_rpo(graph) {
            let NodeKind::LoopHeader { merge } = graph.kind(cf) else {
                continue;
            };
            let body = graph
                .node(cf)
                .succs()
                .iter()
                .copied()
                .find(|&s| matches!(graph.kind(s), NodeKind::Loop));
            let exit = graph
                .node(cf)
                .succs()
                .iter()
                .copied()
                .find(|&s| matches!(graph.kind(s), NodeKind::LoopExit))
                .unwrap_or(merge);
            let Some(body) = body else { continue };

            let back_edges: Vec<NodeId> = graph
                .node(cf)
                .preds()
                .iter()
                .copied()
                .filter(|&p| is_inside_loop(graph, p, cf))
                .collect();

            let carried: Vec<NodeId> = graph
                .node(cf)
                .operands()
                .iter()
                .copied()
                .filter(|&n| graph.kind(n).phi_region() == Some(cf))
                .collect();

            let inductions = carried
                .iter()
                .copied()
                .filter_map(|iv| induction_candidate(graph, iv))
                .collect();

            loops.push(LoopNest {
                header: cf,
                body,
                exit,
                back_edges,
                carried,
                inductions,
            });
        }
        Self { loops }
    }
}

/// A predecessor of the header reached from the header itself closes a
/// back edge.
fn is_inside_loop(graph: &Graph, node: NodeId, header: NodeId) -> bool {
    // walk predecessors of `node` until we hit the header (inside) or run
    // out above it (outside)
    let mut seen = vec![node];
    let mut stack = vec![node];
    while let Some(n) = stack.pop() {
        if n == header {
            return true;
        }
        for &p in graph.node(n).preds() {
            if !seen.contains(&p) {
                seen.push(p);
                stack.push(p);
            }
        }
    }
    false
}

/// `iv(init, step)` where the step arithmetic transitively consumes the
/// iv again.
fn induction_candidate(graph: &Graph, iv: NodeId) -> Option<InductionCandidate> {
    if !matches!(graph.kind(iv), NodeKind::LoopIV { .. }) {
        return None;
    }
    let ops = graph.node(iv).operands();
    if ops.len() != 2 {
        return None;
    }
    let (init, step) = (ops[0], ops[1]);
    let step_is_binary = matches!(
        graph.kind(step),
        NodeKind::Arithmetic(_) | NodeKind::Float64Arithmetic(_) | NodeKind::Box(_)
    );
    if step_is_binary {
        Some(InductionCandidate { iv, init, step })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::BinOp;

    /// start -> header -> {body -> header, exit -> end} with one iv
    fn loop_graph() -> (Graph, NodeId, NodeId) {
        let mut g = Graph::new();
        let start = g.new_node(NodeKind::Start, &[]).unwrap();
        let header = g
            .new_node(
                NodeKind::LoopHeader {
                    merge: NodeId::INVALID,
                },
                &[],
            )
            .unwrap();
        let body = g.new_node(NodeKind::Loop, &[]).unwrap();
        let init = g.float64(0.0).unwrap();
        let one = g.float64(1.0).unwrap();
        let iv = g
            .new_node(NodeKind::LoopIV { region: header }, &[init])
            .unwrap();
        g.add_operand(header, iv);
        let step = g
            .new_node(NodeKind::Arithmetic(BinOp::Add), &[iv, one])
            .unwrap();
        g.add_operand(iv, step);
        let bound = g.float64(10.0).unwrap();
        let cond = g
            .new_node(NodeKind::Compare(BinOp::Lt), &[iv, bound])
            .unwrap();
        let exit = g.new_node(NodeKind::LoopExit, &[cond]).unwrap();
        let end = g.new_node(NodeKind::End, &[]).unwrap();
        g.set_merge(header, exit);
        g.link(start, header);
        g.link(header, body);
        g.link(body, header);
        g.link(header, exit);
        g.link(exit, end);
        g.initialize(start, end).unwrap();
        (g, header, iv)
    }

    #[test]
    fn finds_loop_shape() {
        let (g, header, iv) = loop_graph();
        let analysis = LoopAnalysis::analyze(&g);
        assert_eq!(analysis.loops.len(), 1);
        let l = &analysis.loops[0];
        assert_eq!(l.header, header);
        assert!(matches!(g.kind(l.body), NodeKind::Loop));
        assert!(matches!(g.kind(l.exit), NodeKind::LoopExit));
        assert_eq!(l.carried, vec![iv]);
        assert_eq!(l.back_edges, vec![l.body]);
    }

    #[test]
    fn induction_candidate_shape() {
        let (g, _, iv) = loop_graph();
        let analysis = LoopAnalysis::analyze(&g);
        let l = &analysis.loops[0];
        assert_eq!(l.inductions.len(), 1);
        let c = l.inductions[0];
        assert_eq!(c.iv, iv);
        assert!(g.kind(c.init).gvn_eq(&NodeKind::Float64(0.0)));
        assert!(matches!(g.kind(c.step), NodeKind::Arithmetic(_)));
    }

    #[test]
    fn straight_line_has_no_loops() {
        let mut g = Graph::new();
        let start = g.new_node(NodeKind::Start, &[]).unwrap();
        let end = g.new_node(NodeKind::End, &[]).unwrap();
        g.link(start, end);
        g.initialize(start, end).unwrap();
        assert!(LoopAnalysis::analyze(&g).loops.is_empty());
    }
}
