//! Loop induction variable typing.
//!
//! Graph construction marks every loop-carried candidate with a plain
//! `LoopIV`. This pass propagates type information backward from the
//! step expression: when both the initial value and the step are
//! float64-typed (or int64-typed), the node specializes to its typed
//! form and every generic use goes through a fresh `Box`, keeping the
//! universal representation at the seams.

use tracing::debug;

use crate::fold;
use crate::graph::Graph;
use crate::node::{NodeId, NodeKind, RefKind};
use crate::types::{TypeInference, TypeKind};

use super::{HirPass, LoopAnalysis, PassFlag};

pub struct LoopInduction;

/// Type of a step expression. A generic arithmetic step counts as typed
/// when its other operand is: the iv itself contributes the induction
/// hypothesis.
fn step_type(
    graph: &Graph,
    ti: &mut TypeInference,
    iv: NodeId,
    step: NodeId,
) -> TypeKind {
    let direct = ti.type_of(graph, step);
    if direct != TypeKind::Unknown {
        return direct;
    }
    if let NodeKind::Arithmetic(op) = graph.kind(step) {
        if op.is_arithmetic() {
            let ops = graph.node(step).operands();
            let other = if ops[0] == iv { ops[1] } else { ops[0] };
            if ops.contains(&iv) {
                return ti.type_of(graph, other);
            }
        }
    }
    TypeKind::Unknown
}

impl HirPass for LoopInduction {
    fn name(&self) -> &'static str {
        "loop-induction"
    }

    fn perform(&mut self, graph: &mut Graph, flag: PassFlag) -> bool {
        let analysis = LoopAnalysis::analyze(graph);
        let mut ti = TypeInference::new(graph);
        let mut changed = false;

        for l in &analysis.loops {
            for c in &l.inductions {
                let NodeKind::LoopIV { region } = graph.kind(c.iv) else {
                    continue;
                };
                let init_ty = ti.type_of(graph, c.init);
                let step_ty = step_type(graph, &mut ti, c.iv, c.step);
                let specialized = match (init_ty, step_ty) {
                    (TypeKind::Float64, TypeKind::Float64) => {
                        NodeKind::LoopIVFloat64 { region }
                    }
                    (TypeKind::Int64, TypeKind::Int64) => NodeKind::LoopIVInt64 { region },
                    _ => continue,
                };
                let box_ty = match specialized {
                    NodeKind::LoopIVFloat64 { .. } => TypeKind::Float64,
                    _ => TypeKind::Int64,
                };
                debug!(iv = ?c.iv, ty = box_ty.name(), "specializing loop induction variable");

                // the typed iv produces an unboxed value; generic users
                // keep seeing the universal representation through a Box
                let users: Vec<(NodeId, u32)> = graph
                    .node(c.iv)
                    .refs()
                    .iter()
                    .filter(|r| r.kind == RefKind::Operand)
                    .filter(|r| r.user != l.header)
                    .map(|r| (r.user, r.pos))
                    .collect();
                graph.retag(c.iv, specialized);
                if users.is_empty() {
                    changed = true;
                    continue;
                }
                let boxed = match fold::new_box(graph, c.iv, box_ty) {
                    Ok(b) => b,
                    Err(_) => continue,
                };
                for (user, pos) in users {
                    if user == boxed {
                        continue;
                    }
                    graph.replace_operand(user, pos as usize, boxed);
                }
                changed = true;
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

    fn float_loop() -> (Graph, NodeId, NodeId, NodeId) {
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
        (g, header, iv, step)
    }

    #[test]
    fn float_iv_specializes() {
        let (mut g, _header, iv, step) = float_loop();
        assert!(LoopInduction.perform(&mut g, PassFlag::Debug));
        assert!(matches!(g.kind(iv), NodeKind::LoopIVFloat64 { .. }));

        // generic users now consume the boxed value
        let step_ops = g.node(step).operands();
        assert!(matches!(g.kind(step_ops[0]), NodeKind::Box(TypeKind::Float64)));
    }

    #[test]
    fn untyped_init_stays_generic() {
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
        let init = g.new_node(NodeKind::Arg(0), &[]).unwrap();
        let one = g.float64(1.0).unwrap();
        let iv = g
            .new_node(NodeKind::LoopIV { region: header }, &[init])
            .unwrap();
        g.add_operand(header, iv);
        let step = g
            .new_node(NodeKind::Arithmetic(BinOp::Add), &[iv, one])
            .unwrap();
        g.add_operand(iv, step);
        let exit = g.new_node(NodeKind::LoopExit, &[one]).unwrap();
        let end = g.new_node(NodeKind::End, &[]).unwrap();
        g.set_merge(header, exit);
        g.link(start, header);
        g.link(header, body);
        g.link(body, header);
        g.link(header, exit);
        g.link(exit, end);
        g.initialize(start, end).unwrap();

        assert!(!LoopInduction.perform(&mut g, PassFlag::Debug));
        assert!(matches!(g.kind(iv), NodeKind::LoopIV { .. }));
    }
}
