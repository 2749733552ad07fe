//! Expression simplification over a finished graph.
//!
//! The builder folds on the fly, but later passes (GVN, inlining, branch
//! pruning) expose fresh redexes: constants flowing into operators,
//! box/unbox pairs meeting across a replaced edge, phis whose inputs
//! collapsed onto one value. This pass re-runs the folders over every
//! expression until nothing changes; folding is idempotent, so the fixed
//! point is one extra sweep away at most.

use tracing::trace;

use crate::fold;
use crate::graph::Graph;
use crate::node::{NodeId, NodeKind};
use crate::types::TypeInference;

use super::{purge_if_dead, HirPass, PassFlag};

pub struct Simplify;

fn simplify_node(
    graph: &mut Graph,
    ti: &mut TypeInference,
    id: NodeId,
) -> Option<NodeId> {
    let node = graph.node(id);
    if node.is_dead() {
        return None;
    }
    let operands: Vec<NodeId> = node.operands().to_vec();
    match graph.kind(id) {
        NodeKind::Unary(op) => fold::fold_unary(graph, ti, op, operands[0]).ok()?,
        NodeKind::Arithmetic(op) | NodeKind::Compare(op) => {
            fold::fold_binary(graph, ti, op, operands[0], operands[1]).ok()?
        }
        NodeKind::Logical(op) => {
            match fold::fold_binary(graph, ti, op, operands[0], operands[1]).ok()? {
                Some(n) => Some(n),
                None => fold::simplify_logic(graph, ti, op, operands[0], operands[1]).ok()?,
            }
        }
        NodeKind::Ternary => {
            fold::fold_ternary(graph, ti, operands[0], operands[1], operands[2]).ok()?
        }
        NodeKind::ICall(ic) => fold::fold_intrinsic(graph, ic, &operands).ok()?,
        NodeKind::Phi { .. } => fold::fold_phi_node(graph, id),
        // the mandatory cancellation pair
        NodeKind::Unbox(t) => match graph.kind(operands[0]) {
            NodeKind::Box(bt) if bt == t => Some(graph.node(operands[0]).operands()[0]),
            _ => None,
        },
        NodeKind::Box(t) => match graph.kind(operands[0]) {
            NodeKind::Unbox(ut) if ut == t => Some(graph.node(operands[0]).operands()[0]),
            _ => None,
        },
        _ => None,
    }
}

impl HirPass for Simplify {
    fn name(&self) -> &'static str {
        "simplify"
    }

    fn perform(&mut self, graph: &mut Graph, flag: PassFlag) -> bool {
        let mut changed_any = false;
        loop {
            let mut changed = false;
            // a fresh inference context per sweep: replacements invalidate
            // cached phi types
            let mut ti = TypeInference::new(graph);
            for id in graph.node_ids().collect::<Vec<_>>() {
                if let Some(replacement) = simplify_node(graph, &mut ti, id) {
                    if replacement != id {
                        trace!(?id, ?replacement, "simplify");
                        graph.replace(id, replacement);
                        purge_if_dead(graph, id);
                        changed = true;
                    }
                }
            }
            changed_any |= changed;
            if !changed {
                break;
            }
        }
        if flag == PassFlag::Debug {
            debug_assert!(super::verify_edges(graph));
        }
        changed_any
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::BinOp;
    use crate::types::TypeKind;

    #[test]
    fn folds_constant_tree_to_fixed_point() {
        let mut g = Graph::new();
        let region = {
            let start = g.new_node(NodeKind::Start, &[]).unwrap();
            let region = g.new_node(NodeKind::Region, &[]).unwrap();
            let end = g.new_node(NodeKind::End, &[]).unwrap();
            g.link(start, region);
            g.link(region, end);
            g.initialize(start, end).unwrap();
            region
        };
        // (1 + 2) * 3, built unfolded
        let one = g.float64(1.0).unwrap();
        let two = g.float64(2.0).unwrap();
        let add = g
            .new_node(NodeKind::Arithmetic(BinOp::Add), &[one, two])
            .unwrap();
        let three = g.float64(3.0).unwrap();
        let mul = g
            .new_node(NodeKind::Arithmetic(BinOp::Mul), &[add, three])
            .unwrap();
        let ret = g.new_node(NodeKind::Return, &[mul]).unwrap();
        g.add_operand(region, ret);

        assert!(Simplify.perform(&mut g, PassFlag::Debug));
        let v = g.node(ret).operands()[0];
        assert!(g.kind(v).gvn_eq(&NodeKind::Float64(9.0)));

        // fold ∘ fold = fold
        assert!(!Simplify.perform(&mut g, PassFlag::Debug));
    }

    #[test]
    fn cancels_box_unbox_pairs() {
        let mut g = Graph::new();
        let x = g.new_node(NodeKind::Arg(0), &[]).unwrap();
        // build the redex directly, bypassing the constructor fold
        let boxed = g.new_node(NodeKind::Box(TypeKind::Float64), &[x]).unwrap();
        let unboxed = g
            .new_node(NodeKind::Unbox(TypeKind::Float64), &[boxed])
            .unwrap();
        let user = g
            .new_node(NodeKind::Float64Negate, &[unboxed])
            .unwrap();

        Simplify.perform(&mut g, PassFlag::Normal);
        assert_eq!(g.node(user).operands(), &[x]);
    }

    #[test]
    fn mismatched_box_unbox_survives() {
        let mut g = Graph::new();
        let x = g.new_node(NodeKind::Arg(0), &[]).unwrap();
        let boxed = g.new_node(NodeKind::Box(TypeKind::Float64), &[x]).unwrap();
        let unboxed = g
            .new_node(NodeKind::Unbox(TypeKind::Boolean), &[boxed])
            .unwrap();
        let user = g.new_node(NodeKind::BooleanNot, &[unboxed]).unwrap();

        Simplify.perform(&mut g, PassFlag::Normal);
        assert_eq!(g.node(user).operands(), &[unboxed]);
    }

    #[test]
    fn phi_with_equal_inputs_collapses() {
        let mut g = Graph::new();
        let region = g.new_node(NodeKind::Region, &[]).unwrap();
        let x = g.new_node(NodeKind::Arg(0), &[]).unwrap();
        let phi = g.phi(region, &[x, x]).unwrap();
        let ret = g.new_node(NodeKind::Return, &[phi]).unwrap();

        Simplify.perform(&mut g, PassFlag::Normal);
        assert_eq!(g.node(ret).operands(), &[x]);
    }
}
