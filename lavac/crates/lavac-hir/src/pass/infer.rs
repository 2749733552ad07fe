//! Predicate-based branch inference (the ranger).
//!
//! Each conditional branch contributes a condition group: the predicate
//! its condition imposes on the single variable it constrains, affirmed on
//! the true side and negated on the false side, intersected with whatever
//! the immediate dominator already proved (both hold in the dominated
//! region). A branch whose condition the accumulated predicate decides is
//! rewritten to a boolean constant; DCE then prunes the dead arm.
//!
//! Only simple constraints participate: a tree of typed float64
//! comparisons against constants, or a possibly negated boolean variable,
//! combined with boolean logic, all over one variable. Anything else
//! bails out and that branch contributes no information.

use lavac_util::FxHashMap;
use tracing::debug;

use crate::dominators::Dominators;
use crate::graph::Graph;
use crate::node::{BinOp, NodeId, NodeKind, UnaryOp};
use crate::predicate::{BooleanPredicate, Float64Predicate, Inference, Predicate};
use crate::types::{TypeInference, TypeKind};

use super::{HirPass, PassFlag};

pub struct Infer;

/// See through representation adapters: the constraint engine reasons
/// about the underlying value.
fn strip(graph: &Graph, mut id: NodeId) -> NodeId {
    loop {
        match graph.kind(id) {
            NodeKind::Box(_) | NodeKind::Unbox(_) => id = graph.node(id).operands()[0],
            _ => return id,
        }
    }
}

fn float_const(graph: &Graph, id: NodeId) -> Option<f64> {
    match graph.kind(id) {
        NodeKind::Float64(v) => Some(v),
        _ => None,
    }
}

/// Swap sides of a comparison: `c op x` into `x op' c`.
fn flip(op: BinOp) -> BinOp {
    match op {
        BinOp::Lt => BinOp::Gt,
        BinOp::Le => BinOp::Ge,
        BinOp::Gt => BinOp::Lt,
        BinOp::Ge => BinOp::Le,
        other => other,
    }
}

/// The simple-constraint checker: decide whether `cond` is a supported
/// constraint and name the one variable it talks about.
fn check_simple(
    graph: &Graph,
    ti: &mut TypeInference,
    cond: NodeId,
) -> Option<(NodeId, TypeKind)> {
    let mut var: Option<NodeId> = None;
    let mut ty = TypeKind::Unknown;
    if check_expr(graph, ti, cond, &mut var, &mut ty) {
        var.map(|v| (v, ty))
    } else {
        None
    }
}

fn check_expr(
    graph: &Graph,
    ti: &mut TypeInference,
    expr: NodeId,
    var: &mut Option<NodeId>,
    ty: &mut TypeKind,
) -> bool {
    let expr = strip(graph, expr);
    match graph.kind(expr) {
        NodeKind::Float64Compare(_) => {
            if *ty == TypeKind::Boolean {
                return false;
            }
            let lhs = strip(graph, graph.node(expr).operands()[0]);
            let rhs = strip(graph, graph.node(expr).operands()[1]);
            let candidate = if float_const(graph, lhs).is_some() {
                rhs
            } else if float_const(graph, rhs).is_some() {
                lhs
            } else {
                return false;
            };
            *ty = TypeKind::Float64;
            match *var {
                Some(v) => v == candidate,
                None => {
                    *var = Some(candidate);
                    true
                }
            }
        }
        NodeKind::BooleanLogic(_) => {
            let lhs = graph.node(expr).operands()[0];
            let rhs = graph.node(expr).operands()[1];
            check_expr(graph, ti, lhs, var, ty) && check_expr(graph, ti, rhs, var, ty)
        }
        NodeKind::BooleanNot | NodeKind::Unary(UnaryOp::Not) => {
            let inner = strip(graph, graph.node(expr).operands()[0]);
            check_boolean_var(graph, ti, inner, var, ty)
        }
        _ => check_boolean_var(graph, ti, expr, var, ty),
    }
}

fn check_boolean_var(
    graph: &Graph,
    ti: &mut TypeInference,
    expr: NodeId,
    var: &mut Option<NodeId>,
    ty: &mut TypeKind,
) -> bool {
    if graph.kind(expr).is_constant() {
        return false;
    }
    if ti.type_of(graph, expr) != TypeKind::Boolean || *ty == TypeKind::Float64 {
        return false;
    }
    *ty = TypeKind::Boolean;
    match *var {
        Some(v) => v == expr,
        None => {
            *var = Some(expr);
            true
        }
    }
}

/// Translate a checked condition into the predicate it imposes on `var`.
/// `negate` builds the false-side predicate via De Morgan.
fn build_predicate(
    graph: &Graph,
    cond: NodeId,
    var: NodeId,
    negate: bool,
) -> Option<Predicate> {
    let cond = strip(graph, cond);
    match graph.kind(cond) {
        NodeKind::Float64Compare(op) => {
            let lhs = strip(graph, graph.node(cond).operands()[0]);
            let rhs = strip(graph, graph.node(cond).operands()[1]);
            let (mut op, c) = if let Some(c) = float_const(graph, rhs) {
                (op, c)
            } else if let Some(c) = float_const(graph, lhs) {
                (flip(op), c)
            } else {
                return None;
            };
            if negate {
                op = op.negated_comparison();
            }
            let mut p = Float64Predicate::new();
            p.union(op, c);
            Some(Predicate::Float64(p))
        }
        NodeKind::BooleanLogic(logic_op) => {
            let lhs = graph.node(cond).operands()[0];
            let rhs = graph.node(cond).operands()[1];
            let p1 = build_predicate(graph, lhs, var, negate)?;
            let p2 = build_predicate(graph, rhs, var, negate)?;
            // !(a && b) == !a || !b
            let intersect = (logic_op == BinOp::And) != negate;
            combine(p1, p2, intersect)
        }
        NodeKind::BooleanNot | NodeKind::Unary(UnaryOp::Not) => {
            let inner = graph.node(cond).operands()[0];
            build_predicate(graph, inner, var, !negate)
        }
        _ if strip(graph, cond) == var => {
            Some(Predicate::Boolean(BooleanPredicate::with_value(!negate)))
        }
        _ => None,
    }
}

fn combine(a: Predicate, b: Predicate, intersect: bool) -> Option<Predicate> {
    match (a, b) {
        (Predicate::Float64(mut a), Predicate::Float64(b)) => {
            if intersect {
                a.intersect_with(&b);
            } else {
                a.union_with(&b);
            }
            Some(Predicate::Float64(a))
        }
        (Predicate::Boolean(mut a), Predicate::Boolean(b)) => {
            if intersect {
                a.intersect_with(&b);
            } else {
                a.union_with(&b);
            }
            Some(Predicate::Boolean(a))
        }
        _ => None,
    }
}

fn infer_against(known: &Predicate, query: &Predicate) -> Inference {
    match (known, query) {
        (Predicate::Float64(p), Predicate::Float64(q)) => p.infer_predicate(q),
        (Predicate::Boolean(p), Predicate::Boolean(q)) => p.infer_predicate(q),
        _ => Inference::Unknown,
    }
}

type Group = FxHashMap<NodeId, Predicate>;

fn add_constraint(group: &mut Group, var: NodeId, pred: Predicate) {
    match group.get_mut(&var) {
        Some(existing) => {
            // both constraints hold in the dominated region
            let merged = combine(existing.clone(), pred, true);
            if let Some(m) = merged {
                *existing = m;
            } else {
                *existing = Predicate::Unknown;
            }
        }
        None => {
            group.insert(var, pred);
        }
    }
}

impl HirPass for Infer {
    fn name(&self) -> &'static str {
        "infer"
    }

    fn perform(&mut self, graph: &mut Graph, flag: PassFlag) -> bool {
        let dom = Dominators::build(graph);
        let mut ti = TypeInference::new(graph);
        let mut groups: FxHashMap<NodeId, Group> = FxHashMap::default();
        let mut changed = false;

        for &cf in dom.rpo() {
            // a node's group: whatever its branch parent installed, else
            // the immediate dominator's
            let group = match groups.get(&cf) {
                Some(g) => g.clone(),
                None => dom
                    .immediate_dominator(cf)
                    .and_then(|idom| groups.get(&idom).cloned())
                    .unwrap_or_default(),
            };

            if let NodeKind::If { .. } = graph.kind(cf) {
                let cond = graph.node(cf).operands()[0];
                if let Some((var, _ty)) = check_simple(graph, &mut ti, cond) {
                    // decide this branch under the dominating constraints
                    if let (Some(known), Some(query)) = (
                        group.get(&var),
                        build_predicate(graph, cond, var, false),
                    ) {
                        match infer_against(known, &query) {
                            Inference::AlwaysTrue => {
                                debug!(branch = ?cf, "condition proven true");
                                let t = graph.boolean(true).unwrap_or(cond);
                                graph.replace_operand(cf, 0, t);
                                changed = true;
                            }
                            Inference::AlwaysFalse => {
                                debug!(branch = ?cf, "condition proven false");
                                let f = graph.boolean(false).unwrap_or(cond);
                                graph.replace_operand(cf, 0, f);
                                changed = true;
                            }
                            Inference::Unknown => {}
                        }
                    }

                    // install the affirmed/negated groups on the arms
                    let cond_now = graph.node(cf).operands()[0];
                    if let (Some(affirm), Some(negated)) = (
                        build_predicate(graph, cond_now, var, false),
                        build_predicate(graph, cond_now, var, true),
                    ) {
                        let succs = graph.node(cf).succs();
                        if succs.len() == 2 {
                            let (if_true, if_false) = (succs[0], succs[1]);
                            let mut tg = group.clone();
                            add_constraint(&mut tg, var, affirm);
                            groups.insert(if_true, tg);
                            let mut fg = group.clone();
                            add_constraint(&mut fg, var, negated);
                            groups.insert(if_false, fg);
                        }
                    }
                }
            }
            groups.entry(cf).or_insert(group);
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
    use crate::kit::Kit;
    use crate::pass::Dce;

    fn float_cmp(kit: &mut Kit, var: NodeId, op: BinOp, c: f64) -> NodeId {
        let c = kit.float64(c);
        kit.graph
            .new_node(NodeKind::Float64Compare(op), &[var, c])
            .unwrap()
    }

    #[test]
    fn dominated_weaker_bound_proves_true() {
        // if (x > 5) { if (x > 3) {...} }
        let mut kit = Kit::new();
        let x = kit.arg(0);
        let outer = float_cmp(&mut kit, x, BinOp::Gt, 5.0);
        kit.do_if(outer);
        let inner_cond = float_cmp(&mut kit, x, BinOp::Gt, 3.0);
        let (inner_if, _, _) = kit.do_if(inner_cond);
        kit.do_else();
        kit.do_end_if();
        kit.do_else();
        kit.do_end_if();
        let nil = kit.nil();
        kit.do_return(nil);
        let mut g = kit.finish();

        assert!(Infer.perform(&mut g, PassFlag::Debug));
        let cond = g.node(inner_if).operands()[0];
        assert_eq!(g.kind(cond), NodeKind::Boolean(true));

        // DCE can now prune the dominated IfFalse
        assert!(Dce.perform(&mut g, PassFlag::Debug));
        assert!(g.node(inner_if).succs().is_empty());
    }

    #[test]
    fn dominated_contradiction_proves_false() {
        // if (x < 2) { if (x > 3) {...} }
        let mut kit = Kit::new();
        let x = kit.arg(0);
        let outer = float_cmp(&mut kit, x, BinOp::Lt, 2.0);
        kit.do_if(outer);
        let inner_cond = float_cmp(&mut kit, x, BinOp::Gt, 3.0);
        let (inner_if, _, _) = kit.do_if(inner_cond);
        kit.do_else();
        kit.do_end_if();
        kit.do_else();
        kit.do_end_if();
        let nil = kit.nil();
        kit.do_return(nil);
        let mut g = kit.finish();

        assert!(Infer.perform(&mut g, PassFlag::Debug));
        let cond = g.node(inner_if).operands()[0];
        assert_eq!(g.kind(cond), NodeKind::Boolean(false));
    }

    #[test]
    fn false_side_carries_negated_constraint() {
        // if (x > 5) {} else { if (x <= 5) ... always true }
        let mut kit = Kit::new();
        let x = kit.arg(0);
        let outer = float_cmp(&mut kit, x, BinOp::Gt, 5.0);
        kit.do_if(outer);
        kit.do_else();
        let inner_cond = float_cmp(&mut kit, x, BinOp::Le, 5.0);
        let (inner_if, _, _) = kit.do_if(inner_cond);
        kit.do_else();
        kit.do_end_if();
        kit.do_end_if();
        let nil = kit.nil();
        kit.do_return(nil);
        let mut g = kit.finish();

        assert!(Infer.perform(&mut g, PassFlag::Debug));
        let cond = g.node(inner_if).operands()[0];
        assert_eq!(g.kind(cond), NodeKind::Boolean(true));
    }

    #[test]
    fn unrelated_variable_stays_unknown() {
        let mut kit = Kit::new();
        let x = kit.arg(0);
        let y = kit.arg(1);
        let outer = float_cmp(&mut kit, x, BinOp::Gt, 5.0);
        kit.do_if(outer);
        let inner_cond = float_cmp(&mut kit, y, BinOp::Gt, 3.0);
        let (inner_if, _, _) = kit.do_if(inner_cond);
        kit.do_else();
        kit.do_end_if();
        kit.do_else();
        kit.do_end_if();
        let nil = kit.nil();
        kit.do_return(nil);
        let mut g = kit.finish();

        assert!(!Infer.perform(&mut g, PassFlag::Debug));
        assert_eq!(g.node(inner_if).operands()[0], inner_cond);
    }

    #[test]
    fn overlapping_bound_is_undecided() {
        // if (x > 5) { if (x > 7) ... } neither provable nor refutable
        let mut kit = Kit::new();
        let x = kit.arg(0);
        let outer = float_cmp(&mut kit, x, BinOp::Gt, 5.0);
        kit.do_if(outer);
        let inner_cond = float_cmp(&mut kit, x, BinOp::Gt, 7.0);
        let (inner_if, _, _) = kit.do_if(inner_cond);
        kit.do_else();
        kit.do_end_if();
        kit.do_else();
        kit.do_end_if();
        let nil = kit.nil();
        kit.do_return(nil);
        let mut g = kit.finish();

        assert!(!Infer.perform(&mut g, PassFlag::Debug));
        assert_eq!(g.node(inner_if).operands()[0], inner_cond);
    }

    #[test]
    fn boolean_variable_constraint() {
        // if (b) { if (b) ... always true }
        let mut kit = Kit::new();
        let list = kit.graph.new_node(NodeKind::List, &[]).unwrap();
        let itr = kit.graph.new_node(NodeKind::ItrNew, &[list]).unwrap();
        let b = kit.graph.new_node(NodeKind::ItrTest, &[itr]).unwrap();
        kit.do_if(b);
        let (inner_if, _, _) = kit.do_if(b);
        kit.do_else();
        kit.do_end_if();
        kit.do_else();
        kit.do_end_if();
        let nil = kit.nil();
        kit.do_return(nil);
        let mut g = kit.finish();

        assert!(Infer.perform(&mut g, PassFlag::Debug));
        let cond = g.node(inner_if).operands()[0];
        assert_eq!(g.kind(cond), NodeKind::Boolean(true));
    }
}
