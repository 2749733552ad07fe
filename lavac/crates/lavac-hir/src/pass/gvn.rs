//! Global value numbering.
//!
//! A single pass over control flow in RPO. Every expression rooted at a
//! region is walked operands-first; each node is looked up in a table
//! keyed by structural hash (kind, payload, operand ids, effect ids) and
//! replaced by the canonical entry on a hit. One pass suffices for the
//! common redundancy; an iterative variant would only buy marginal extra
//! matches at a convergence cost.

use std::hash::{Hash, Hasher};

use ahash::AHasher;
use lavac_util::{DenseBitSet, FxHashMap};
use tracing::trace;

use crate::graph::Graph;
use crate::iter::{control_rpo, expr_postorder};
use crate::node::{NodeId, NodeKind};

use super::{HirPass, PassFlag};

pub struct Gvn;

/// Kinds excluded from numbering: control, anything that creates or
/// mutates state (merging two of those would drop an execution), and
/// iterator identity.
fn gvnable(kind: NodeKind) -> bool {
    use NodeKind::*;
    if kind.is_control() {
        return false;
    }
    !matches!(
        kind,
        Call | ICall(_)
            | PSet
            | ISet
            | GSet
            | USet(_)
            | ObjectUpdate
            | ObjectInsert
            | ListInsert
            | ObjectRefSet
            | ListRefSet
            | ItrNew
            | ItrNext
            | List
            | Object
    )
}

fn hash_kind<H: Hasher>(kind: &NodeKind, state: &mut H) {
    use NodeKind::*;
    std::mem::discriminant(kind).hash(state);
    match *kind {
        Float64(v) => v.to_bits().hash(state),
        Int64(v) => v.hash(state),
        LStr(s) | SStr(s) => s.hash(state),
        Boolean(b) => b.hash(state),
        Closure(p) | InitCls(p) => p.hash(state),
        Arg(i) | Projection(i) | OSRLoad(i) | StackSlot(i) => i.hash(state),
        UGet(i) | USet(i) => i.hash(state),
        Unary(op) => op.hash(state),
        Arithmetic(op) | Compare(op) | Logical(op) | Float64Arithmetic(op) | Float64Bitwise(op)
        | Float64Compare(op) | BooleanLogic(op) | StringCompare(op) => op.hash(state),
        ICall(ic) => ic.hash(state),
        Phi { region }
        | EffectPhi { region }
        | LoopEffectPhi { region }
        | LoopIV { region }
        | LoopIVFloat64 { region }
        | LoopIVInt64 { region } => region.hash(state),
        Checkpoint { pc } => pc.hash(state),
        Box(t) | Unbox(t) | TestType(t) => t.hash(state),
        If { merge } | LoopHeader { merge } => merge.hash(state),
        _ => {}
    }
}

/// Structural hash over kind, payload and edge ids.
fn structural_hash(graph: &Graph, id: NodeId) -> u64 {
    let mut state = AHasher::default();
    let node = graph.node(id);
    hash_kind(&node.kind, &mut state);
    for op in node.operands() {
        op.hash(&mut state);
    }
    for e in node.effects() {
        e.hash(&mut state);
    }
    state.finish()
}

/// Structural equality matching the hash.
fn structural_eq(graph: &Graph, a: NodeId, b: NodeId) -> bool {
    let na = graph.node(a);
    let nb = graph.node(b);
    na.kind.gvn_eq(&nb.kind) && na.operands() == nb.operands() && na.effects() == nb.effects()
}

impl HirPass for Gvn {
    fn name(&self) -> &'static str {
        "gvn"
    }

    fn perform(&mut self, graph: &mut Graph, flag: PassFlag) -> bool {
        let mut visited = DenseBitSet::new(graph.max_id());
        let mut table: FxHashMap<u64, Vec<NodeId>> = FxHashMap::default();
        let mut changed = false;

        for cf in control_rpo(graph) {
            let roots: Vec<NodeId> = graph.node(cf).operands().to_vec();
            for root in roots {
                for sub in expr_postorder(graph, root, &mut visited) {
                    if !gvnable(graph.kind(sub)) {
                        continue;
                    }
                    let hash = structural_hash(graph, sub);
                    let bucket = table.entry(hash).or_default();
                    match bucket
                        .iter()
                        .copied()
                        .find(|&c| c != sub && structural_eq(graph, c, sub))
                    {
                        Some(canonical) => {
                            trace!(?sub, ?canonical, "gvn replace");
                            graph.replace(sub, canonical);
                            changed = true;
                        }
                        None => {
                            if !bucket.contains(&sub) {
                                bucket.push(sub);
                            }
                        }
                    }
                }
            }
        }
        if flag == PassFlag::Debug {
            debug_assert!(super::verify_edges(graph));
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::BinOp;
    use crate::types::TypeKind;

    fn with_anchors() -> (Graph, NodeId) {
        let mut g = Graph::new();
        let start = g.new_node(NodeKind::Start, &[]).unwrap();
        let region = g.new_node(NodeKind::Region, &[]).unwrap();
        let end = g.new_node(NodeKind::End, &[]).unwrap();
        g.link(start, region);
        g.link(region, end);
        g.initialize(start, end).unwrap();
        (g, region)
    }

    #[test]
    fn duplicate_expressions_merge() {
        let (mut g, region) = with_anchors();
        let a1 = g.float64(1.0).unwrap();
        let b1 = g.float64(2.0).unwrap();
        let add1 = g
            .new_node(NodeKind::Float64Arithmetic(BinOp::Add), &[a1, b1])
            .unwrap();
        let a2 = g.float64(1.0).unwrap();
        let b2 = g.float64(2.0).unwrap();
        let add2 = g
            .new_node(NodeKind::Float64Arithmetic(BinOp::Add), &[a2, b2])
            .unwrap();
        // pin both so the pass can see them from the control flow
        g.add_operand(region, add1);
        g.add_operand(region, add2);

        assert!(Gvn.perform(&mut g, PassFlag::Debug));
        // the second tree collapsed onto the first
        assert_eq!(g.node(region).operands(), &[add1, add1]);
        assert!(g.node(add2).is_dead());
        assert!(g.node(a2).is_dead());
    }

    #[test]
    fn different_payloads_do_not_merge() {
        let (mut g, region) = with_anchors();
        let a = g.float64(1.0).unwrap();
        let b = g.float64(2.0).unwrap();
        let add = g
            .new_node(NodeKind::Float64Arithmetic(BinOp::Add), &[a, b])
            .unwrap();
        let sub = g
            .new_node(NodeKind::Float64Arithmetic(BinOp::Sub), &[a, b])
            .unwrap();
        g.add_operand(region, add);
        g.add_operand(region, sub);

        Gvn.perform(&mut g, PassFlag::Debug);
        assert_eq!(g.node(region).operands(), &[add, sub]);
    }

    #[test]
    fn gvn_is_idempotent() {
        let (mut g, region) = with_anchors();
        for _ in 0..2 {
            let a = g.float64(5.0).unwrap();
            let t = g
                .new_node(NodeKind::TestType(TypeKind::Float64), &[a])
                .unwrap();
            g.add_operand(region, t);
        }
        assert!(Gvn.perform(&mut g, PassFlag::Debug));
        assert!(!Gvn.perform(&mut g, PassFlag::Debug), "second run is a no-op");
    }

    #[test]
    fn effectful_reads_merge_only_with_same_memory_state() {
        let (mut g, region) = with_anchors();
        let key = g.string("k").unwrap();
        let e0 = g.new_node(NodeKind::InitBarrier, &[]).unwrap();
        let g1 = g.new_node(NodeKind::GGet, &[key]).unwrap();
        g.add_effect(g1, e0);
        let set = g.new_node(NodeKind::GSet, &[key, g1]).unwrap();
        g.add_effect(set, e0);
        let g2 = g.new_node(NodeKind::GGet, &[key]).unwrap();
        g.add_effect(g2, set);
        g.add_operand(region, g1);
        g.add_operand(region, set);
        g.add_operand(region, g2);

        Gvn.perform(&mut g, PassFlag::Debug);
        // different effect operands keep the reads apart
        assert!(!g.node(g2).is_dead());
        assert_ne!(g.node(region).operands()[0], g.node(region).operands()[2]);
    }

    #[test]
    fn calls_never_merge() {
        let (mut g, region) = with_anchors();
        let callee = g.nil().unwrap();
        let c1 = g.new_node(NodeKind::Call, &[callee]).unwrap();
        let c2 = g.new_node(NodeKind::Call, &[callee]).unwrap();
        g.add_operand(region, c1);
        g.add_operand(region, c2);
        Gvn.perform(&mut g, PassFlag::Debug);
        assert!(!g.node(c1).is_dead());
        assert!(!g.node(c2).is_dead());
        assert_ne!(g.node(region).operands()[0], g.node(region).operands()[1]);
    }
}
