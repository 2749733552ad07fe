//! A small DSL for assembling HIR graphs by hand.
//!
//! Pass tests need graphs with exact shapes; wiring every edge manually
//! is noisy and easy to get subtly wrong (successor order, merge
//! back-pointers, phi pinning). The kit tracks the current region and
//! hands out correctly-wired control structure, mirroring what the
//! bytecode builder emits.

use crate::graph::Graph;
use crate::node::{NodeId, NodeKind};
use crate::types::TypeKind;

struct BranchFrame {
    if_node: NodeId,
    if_false: NodeId,
    /// Tail region of the then arm; `None` when the arm returned
    then_tail: Option<NodeId>,
    else_opened: bool,
}

pub struct Kit {
    pub graph: Graph,
    start: NodeId,
    region: NodeId,
    branches: Vec<BranchFrame>,
    returns: Vec<NodeId>,
    terminated: bool,
}

impl Kit {
    pub fn new() -> Self {
        let mut graph = Graph::new();
        let start = graph.new_node(NodeKind::Start, &[]).expect("fresh arena");
        let entry = graph.new_node(NodeKind::Region, &[]).expect("fresh arena");
        graph.link(start, entry);
        Self {
            graph,
            start,
            region: entry,
            branches: Vec::new(),
            returns: Vec::new(),
            terminated: false,
        }
    }

    pub fn region(&self) -> NodeId {
        self.region
    }

    // ------------------------------------------------------------------
    // expression helpers
    // ------------------------------------------------------------------

    pub fn float64(&mut self, v: f64) -> NodeId {
        self.graph.float64(v).expect("arena")
    }

    pub fn boolean(&mut self, v: bool) -> NodeId {
        self.graph.boolean(v).expect("arena")
    }

    pub fn nil(&mut self) -> NodeId {
        self.graph.nil().expect("arena")
    }

    pub fn string(&mut self, s: &str) -> NodeId {
        self.graph.string(s).expect("arena")
    }

    pub fn arg(&mut self, index: u32) -> NodeId {
        self.graph.new_node(NodeKind::Arg(index), &[]).expect("arena")
    }

    /// Pin an expression onto the current region as a statement.
    pub fn pin(&mut self, expr: NodeId) {
        self.graph.add_operand(self.region, expr);
    }

    /// A `TestType` + `Guard` pair over `value`, pinned to the current
    /// region, with an empty checkpoint at `pc`.
    pub fn guard(&mut self, value: NodeId, tk: TypeKind, pc: u32) -> NodeId {
        let test = self
            .graph
            .new_node(NodeKind::TestType(tk), &[value])
            .expect("arena");
        let cp = self.graph.checkpoint(pc).expect("arena");
        let guard = self
            .graph
            .new_node(NodeKind::Guard, &[test, cp])
            .expect("arena");
        self.pin(guard);
        guard
    }

    // ------------------------------------------------------------------
    // control helpers
    // ------------------------------------------------------------------

    /// Open a branch on `cond`. Leaves the kit building the then arm.
    pub fn do_if(&mut self, cond: NodeId) -> (NodeId, NodeId, NodeId) {
        let if_node = self
            .graph
            .new_node(
                NodeKind::If {
                    merge: NodeId::INVALID,
                },
                &[cond],
            )
            .expect("arena");
        self.graph.link(self.region, if_node);
        let if_true = self.graph.new_node(NodeKind::IfTrue, &[]).expect("arena");
        let if_false = self.graph.new_node(NodeKind::IfFalse, &[]).expect("arena");
        // successor order is the 0/1 indexing contract
        self.graph.link(if_node, if_true);
        self.graph.link(if_node, if_false);
        self.branches.push(BranchFrame {
            if_node,
            if_false,
            then_tail: None,
            else_opened: false,
        });
        self.region = if_true;
        self.terminated = false;
        (if_node, if_true, if_false)
    }

    /// Switch to building the else arm.
    pub fn do_else(&mut self) {
        let terminated = self.terminated;
        let region = self.region;
        let frame = self.branches.last_mut().expect("open branch");
        frame.then_tail = if terminated { None } else { Some(region) };
        frame.else_opened = true;
        self.region = frame.if_false;
        self.terminated = false;
    }

    /// Close the branch, producing the merge region.
    pub fn do_end_if(&mut self) -> NodeId {
        let mut frame = self.branches.pop().expect("open branch");
        let tail = if self.terminated {
            None
        } else {
            Some(self.region)
        };
        let else_tail;
        if frame.else_opened {
            else_tail = tail;
        } else {
            // if with no else arm: the false side flows straight through
            frame.then_tail = tail;
            else_tail = Some(frame.if_false);
        }
        let merge = self.graph.new_node(NodeKind::Region, &[]).expect("arena");
        self.graph.set_merge(frame.if_node, merge);
        if let Some(t) = frame.then_tail {
            self.graph.link(t, merge);
        }
        if let Some(f) = else_tail {
            self.graph.link(f, merge);
        }
        self.region = merge;
        self.terminated = frame.then_tail.is_none() && else_tail.is_none();
        merge
    }

    /// Close the branch with a phi merging `tv`/`fv`. Both arms must be
    /// alive.
    pub fn do_end_if_with_phi(&mut self, tv: NodeId, fv: NodeId) -> NodeId {
        let merge = self.do_end_if();
        debug_assert_eq!(self.graph.node(merge).preds().len(), 2);
        self.graph.phi(merge, &[tv, fv]).expect("arena")
    }

    pub fn do_return(&mut self, value: NodeId) -> NodeId {
        let ret = self
            .graph
            .new_node(NodeKind::Return, &[value])
            .expect("arena");
        self.graph.link(self.region, ret);
        self.returns.push(ret);
        self.terminated = true;
        ret
    }

    /// Seal the graph with Success/Fail/End and install the anchors.
    pub fn finish(mut self) -> Graph {
        let success = self.graph.new_node(NodeKind::Success, &[]).expect("arena");
        let fail = self.graph.new_node(NodeKind::Fail, &[]).expect("arena");
        let mut values = Vec::new();
        for r in &self.returns {
            self.graph.link(*r, success);
            values.push(self.graph.node(*r).operands()[0]);
        }
        if values.len() > 1 {
            self.graph.phi(success, &values).expect("arena");
        }
        let end = self.graph.new_node(NodeKind::End, &[]).expect("arena");
        self.graph.link(success, end);
        self.graph.link(fail, end);
        self.graph
            .initialize(self.start, end)
            .expect("kit graphs initialize once");
        self.graph
    }
}

impl Default for Kit {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_graph() {
        let mut kit = Kit::new();
        let v = kit.float64(1.0);
        kit.do_return(v);
        let g = kit.finish();
        let rpo = crate::iter::control_rpo(&g);
        assert!(rpo.len() >= 4); // start, region, return, success, end
    }

    #[test]
    fn branch_wiring() {
        let mut kit = Kit::new();
        let cond = kit.arg(0);
        let (if_node, if_true, if_false) = kit.do_if(cond);
        kit.do_else();
        let merge = kit.do_end_if();
        let nil = kit.nil();
        kit.do_return(nil);
        let g = kit.finish();

        assert_eq!(g.if_true_of(if_node), if_true);
        assert_eq!(g.if_false_of(if_node), if_false);
        assert_eq!(g.node(merge).preds(), &[if_true, if_false]);
        let NodeKind::If { merge: m } = g.kind(if_node) else {
            panic!()
        };
        assert_eq!(m, merge);
    }

    #[test]
    fn phi_matches_predecessors() {
        let mut kit = Kit::new();
        let a = kit.arg(0);
        let b = kit.arg(1);
        let cond = kit.arg(2);
        kit.do_if(cond);
        kit.do_else();
        let phi = kit.do_end_if_with_phi(a, b);
        kit.do_return(phi);
        let g = kit.finish();
        let NodeKind::Phi { region } = g.kind(phi) else {
            panic!()
        };
        assert_eq!(g.node(phi).operands().len(), g.node(region).preds().len());
    }
}
