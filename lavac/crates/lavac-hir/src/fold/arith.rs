//! Unary, binary, logical and ternary folds.

use crate::graph::{Graph, GraphResult};
use crate::node::{BinOp, NodeId, NodeKind, UnaryOp};
use crate::types::{TypeInference, TypeKind};

use super::{bool_val, float_val, is_nil, new_box, new_unbox};

fn is_unary_minus(graph: &Graph, id: NodeId) -> bool {
    matches!(graph.kind(id), NodeKind::Unary(UnaryOp::Minus))
}

fn is_unary_not(graph: &Graph, id: NodeId) -> bool {
    matches!(graph.kind(id), NodeKind::Unary(UnaryOp::Not))
}

fn operand0(graph: &Graph, id: NodeId) -> NodeId {
    graph.node(id).operands()[0]
}

/// Truthiness of `id` given its inferred tag, for short-circuit folds.
fn is_known_true(graph: &Graph, id: NodeId, tp: TypeKind) -> bool {
    bool_val(graph, id) == Some(true) || tp.to_boolean() == Some(true)
}

fn is_known_false(graph: &Graph, id: NodeId, tp: TypeKind) -> bool {
    bool_val(graph, id) == Some(false) || tp.to_boolean() == Some(false)
}

fn is_number(graph: &Graph, id: NodeId, value: f64) -> bool {
    float_val(graph, id) == Some(value)
}

/// Fold a unary operation, or `None` when nothing applies.
pub fn fold_unary(
    graph: &mut Graph,
    ti: &mut TypeInference,
    op: UnaryOp,
    expr: NodeId,
) -> GraphResult<Option<NodeId>> {
    match op {
        UnaryOp::Minus => {
            if let Some(v) = float_val(graph, expr) {
                return Ok(Some(graph.float64(-v)?));
            }
            // peel nested negations two at a time: --a => a, ---a => -a
            let mut output = None;
            let mut temp = expr;
            while is_unary_minus(graph, temp) {
                output = Some(operand0(graph, temp));
                temp = output.unwrap();
                if is_unary_minus(graph, temp) {
                    temp = operand0(graph, temp);
                } else {
                    break;
                }
            }
            Ok(output)
        }
        UnaryOp::Not => {
            match graph.kind(expr) {
                NodeKind::Float64(_)
                | NodeKind::SStr(_)
                | NodeKind::LStr(_)
                | NodeKind::List
                | NodeKind::Object => Ok(Some(graph.boolean(false)?)),
                NodeKind::Boolean(v) => Ok(Some(graph.boolean(!v)?)),
                NodeKind::Nil => Ok(Some(graph.boolean(true)?)),
                _ => {
                    // fall back to the static type to decide truthiness
                    if let Some(bv) = ti.type_of(graph, expr).to_boolean() {
                        Ok(Some(graph.boolean(!bv)?))
                    } else {
                        Ok(None)
                    }
                }
            }
        }
    }
}

/// Algebraic reassociation over float64 operands.
///
/// Floating point admits very little: only the sign juggling below and
/// division by ±1 are value-preserving.
///
/// 1. `-a + b  => b - a`
/// 2. `a + (-b) => a - b`
/// 3. `-a - b  => -b - a`
/// 4. `a - (-b) => a + b`
/// 5. `a / 1   => a`
/// 6. `a / -1  => -a`
/// 7. `-a * -b => a * b`
fn float64_reassociate(
    graph: &mut Graph,
    op: BinOp,
    lhs: NodeId,
    rhs: NodeId,
) -> GraphResult<Option<NodeId>> {
    if is_unary_minus(graph, lhs) && op == BinOp::Add {
        let a = operand0(graph, lhs);
        let ub_rhs = new_unbox(graph, rhs, TypeKind::Float64)?;
        let ub_a = new_unbox(graph, a, TypeKind::Float64)?;
        let sub = graph.new_node(NodeKind::Float64Arithmetic(BinOp::Sub), &[ub_rhs, ub_a])?;
        Ok(Some(new_box(graph, sub, TypeKind::Float64)?))
    } else if is_unary_minus(graph, rhs) && op == BinOp::Add {
        let b = operand0(graph, rhs);
        let ub_lhs = new_unbox(graph, lhs, TypeKind::Float64)?;
        let ub_b = new_unbox(graph, b, TypeKind::Float64)?;
        let sub = graph.new_node(NodeKind::Float64Arithmetic(BinOp::Sub), &[ub_lhs, ub_b])?;
        Ok(Some(new_box(graph, sub, TypeKind::Float64)?))
    } else if is_unary_minus(graph, lhs) && op == BinOp::Sub {
        let a = operand0(graph, lhs);
        let ub_rhs = new_unbox(graph, rhs, TypeKind::Float64)?;
        let neg = graph.new_node(NodeKind::Float64Negate, &[ub_rhs])?;
        let ub_neg = new_unbox(graph, neg, TypeKind::Float64)?;
        let ub_a = new_unbox(graph, a, TypeKind::Float64)?;
        let sub = graph.new_node(NodeKind::Float64Arithmetic(BinOp::Sub), &[ub_neg, ub_a])?;
        Ok(Some(new_box(graph, sub, TypeKind::Float64)?))
    } else if is_unary_minus(graph, rhs) && op == BinOp::Sub {
        let b = operand0(graph, rhs);
        let ub_lhs = new_unbox(graph, lhs, TypeKind::Float64)?;
        let ub_b = new_unbox(graph, b, TypeKind::Float64)?;
        let add = graph.new_node(NodeKind::Float64Arithmetic(BinOp::Add), &[ub_lhs, ub_b])?;
        Ok(Some(new_box(graph, add, TypeKind::Float64)?))
    } else if op == BinOp::Div && is_number(graph, rhs, 1.0) {
        Ok(Some(lhs))
    } else if op == BinOp::Div && is_number(graph, rhs, -1.0) {
        let ub_lhs = new_unbox(graph, lhs, TypeKind::Float64)?;
        let neg = graph.new_node(NodeKind::Float64Negate, &[ub_lhs])?;
        Ok(Some(new_box(graph, neg, TypeKind::Float64)?))
    } else if is_unary_minus(graph, lhs) && is_unary_minus(graph, rhs) && op == BinOp::Mul {
        let a = operand0(graph, lhs);
        let b = operand0(graph, rhs);
        let ub_a = new_unbox(graph, a, TypeKind::Float64)?;
        let ub_b = new_unbox(graph, b, TypeKind::Float64)?;
        let mul = graph.new_node(NodeKind::Float64Arithmetic(BinOp::Mul), &[ub_a, ub_b])?;
        Ok(Some(new_box(graph, mul, TypeKind::Float64)?))
    } else {
        Ok(None)
    }
}

fn simplify_logic_and(
    graph: &mut Graph,
    lhs_type: TypeKind,
    lhs: NodeId,
    rhs: NodeId,
) -> GraphResult<Option<NodeId>> {
    if is_known_false(graph, lhs, lhs_type) {
        return Ok(Some(graph.boolean(false)?)); // false && any ==> false
    }
    if is_known_true(graph, lhs, lhs_type) {
        return Ok(Some(rhs)); // true && any ==> any
    }
    if lhs == rhs && !graph.node(lhs).has_side_effect() {
        return Ok(Some(lhs)); // a && a ==> a
    }
    if is_unary_not(graph, lhs) && operand0(graph, lhs) == rhs {
        return Ok(Some(graph.boolean(false)?)); // !a && a ==> false
    }
    if is_unary_not(graph, rhs) && operand0(graph, rhs) == lhs {
        return Ok(Some(graph.boolean(false)?)); // a && !a ==> false
    }
    Ok(None)
}

fn simplify_logic_or(
    graph: &mut Graph,
    lhs_type: TypeKind,
    lhs: NodeId,
    rhs: NodeId,
) -> GraphResult<Option<NodeId>> {
    if is_known_true(graph, lhs, lhs_type) {
        return Ok(Some(graph.boolean(true)?)); // true || any ==> true
    }
    if is_known_false(graph, lhs, lhs_type) {
        return Ok(Some(rhs)); // false || any ==> any
    }
    if lhs == rhs && !graph.node(lhs).has_side_effect() {
        return Ok(Some(lhs)); // a || a ==> a
    }
    if is_unary_not(graph, lhs) && operand0(graph, lhs) == rhs {
        return Ok(Some(graph.boolean(true)?)); // !a || a ==> true
    }
    if is_unary_not(graph, rhs) && operand0(graph, rhs) == lhs {
        return Ok(Some(graph.boolean(true)?)); // a || !a ==> true
    }
    Ok(None)
}

/// `a == true` / `false != b` style comparisons against a speculative
/// boolean collapse to the variable itself (possibly negated). In boolean
/// context `a` evaluates to `a`, while `a == true` evaluates to a fresh
/// boolean, so this only applies when one side is typed boolean. The infer
/// pass relies on the normalized form.
fn simplify_boolean_compare(
    graph: &mut Graph,
    op: BinOp,
    var: NodeId,
    literal: bool,
) -> GraphResult<Option<NodeId>> {
    let keep = literal == (op == BinOp::Eq);
    if keep {
        Ok(Some(var))
    } else {
        let unboxed = new_unbox(graph, var, TypeKind::Boolean)?;
        let not = graph.new_node(NodeKind::BooleanNot, &[unboxed])?;
        Ok(Some(new_box(graph, not, TypeKind::Boolean)?))
    }
}

fn simplify_binary(
    graph: &mut Graph,
    ti: &mut TypeInference,
    op: BinOp,
    lhs: NodeId,
    rhs: NodeId,
) -> GraphResult<Option<NodeId>> {
    let lhs_type = ti.type_of(graph, lhs);
    let rhs_type = ti.type_of(graph, rhs);

    // a negation is float64-shaped for reassociation when what it negates
    // is float64-typed
    let eff = |graph: &Graph, ti: &mut TypeInference, id: NodeId, tag: TypeKind| {
        if tag == TypeKind::Unknown && is_unary_minus(graph, id) {
            ti.type_of(graph, operand0(graph, id))
        } else {
            tag
        }
    };
    let lhs_eff = eff(graph, ti, lhs, lhs_type);
    let rhs_eff = eff(graph, ti, rhs, rhs_type);
    if lhs_eff == TypeKind::Float64 && rhs_eff == TypeKind::Float64 {
        return float64_reassociate(graph, op, lhs, rhs);
    }
    if op == BinOp::And {
        return simplify_logic_and(graph, lhs_type, lhs, rhs);
    }
    if op == BinOp::Or {
        return simplify_logic_or(graph, lhs_type, lhs, rhs);
    }
    if op == BinOp::Eq || op == BinOp::Ne {
        if lhs_type == TypeKind::Boolean {
            if let Some(v) = bool_val(graph, rhs) {
                return simplify_boolean_compare(graph, op, lhs, v);
            }
        }
        if rhs_type == TypeKind::Boolean {
            if let Some(v) = bool_val(graph, lhs) {
                return simplify_boolean_compare(graph, op, rhs, v);
            }
        }
    }
    Ok(None)
}

/// Fold a binary operation, or `None` when nothing applies.
///
/// Constant float64 division and modulo by zero never fold; the runtime
/// semantics of those stay behind the unoptimized node.
pub fn fold_binary(
    graph: &mut Graph,
    ti: &mut TypeInference,
    op: BinOp,
    lhs: NodeId,
    rhs: NodeId,
) -> GraphResult<Option<NodeId>> {
    if let (Some(lval), Some(rval)) = (float_val(graph, lhs), float_val(graph, rhs)) {
        let folded = match op {
            BinOp::Add => Some(graph.float64(lval + rval)?),
            BinOp::Sub => Some(graph.float64(lval - rval)?),
            BinOp::Mul => Some(graph.float64(lval * rval)?),
            BinOp::Div => {
                if rval == 0.0 {
                    None
                } else {
                    Some(graph.float64(lval / rval)?)
                }
            }
            BinOp::Mod => {
                let lint = lval as i64;
                let rint = rval as i64;
                if rint == 0 {
                    None
                } else {
                    Some(graph.float64((lint % rint) as f64)?)
                }
            }
            BinOp::Pow => Some(graph.float64(lval.powf(rval))?),
            BinOp::Lt => Some(graph.boolean(lval < rval)?),
            BinOp::Le => Some(graph.boolean(lval <= rval)?),
            BinOp::Gt => Some(graph.boolean(lval > rval)?),
            BinOp::Ge => Some(graph.boolean(lval >= rval)?),
            BinOp::Eq => Some(graph.boolean(lval == rval)?),
            BinOp::Ne => Some(graph.boolean(lval != rval)?),
            BinOp::And => Some(graph.float64(rval)?),
            BinOp::Or => Some(graph.float64(lval)?),
        };
        if folded.is_some() {
            return Ok(folded);
        }
    } else if graph.kind(lhs).is_string_constant() && graph.kind(rhs).is_string_constant() {
        let l = graph.str_value(lhs).unwrap();
        let r = graph.str_value(rhs).unwrap();
        let result = match op {
            BinOp::Lt => Some(l < r),
            BinOp::Le => Some(l <= r),
            BinOp::Gt => Some(l > r),
            BinOp::Ge => Some(l >= r),
            BinOp::Eq => Some(l == r),
            BinOp::Ne => Some(l != r),
            _ => None,
        };
        if let Some(b) = result {
            return Ok(Some(graph.boolean(b)?));
        }
        return Ok(None);
    } else if is_nil(graph, lhs) || is_nil(graph, rhs) {
        let lnil = is_nil(graph, lhs);
        let rnil = is_nil(graph, rhs);
        // nil != x decides by the other side being a non-nil constant;
        // nil against a non-constant stays put
        if lnil && rnil {
            return match op {
                BinOp::Eq => Ok(Some(graph.boolean(true)?)),
                BinOp::Ne => Ok(Some(graph.boolean(false)?)),
                _ => Ok(None),
            };
        }
        let other = if lnil { rhs } else { lhs };
        // `nil != x` decides by whether x can be nil at all, which the
        // static tag answers for every typed node
        let tag = ti.type_of(graph, other);
        if tag != TypeKind::Unknown {
            let other_is_nil = tag == TypeKind::Nil;
            return match op {
                BinOp::Eq => Ok(Some(graph.boolean(other_is_nil)?)),
                BinOp::Ne => Ok(Some(graph.boolean(!other_is_nil)?)),
                _ => Ok(None),
            };
        }
        return Ok(None);
    }

    simplify_binary(graph, ti, op, lhs, rhs)
}

/// Simplify a logical operation without constant operands.
pub fn simplify_logic(
    graph: &mut Graph,
    ti: &mut TypeInference,
    op: BinOp,
    lhs: NodeId,
    rhs: NodeId,
) -> GraphResult<Option<NodeId>> {
    let lhs_type = ti.type_of(graph, lhs);
    match op {
        BinOp::And => simplify_logic_and(graph, lhs_type, lhs, rhs),
        BinOp::Or => simplify_logic_or(graph, lhs_type, lhs, rhs),
        _ => Ok(None),
    }
}

/// Fold `cond ? lhs : rhs`, or `None` when the condition stays opaque.
pub fn fold_ternary(
    graph: &mut Graph,
    ti: &mut TypeInference,
    cond: NodeId,
    lhs: NodeId,
    rhs: NodeId,
) -> GraphResult<Option<NodeId>> {
    match graph.kind(cond) {
        NodeKind::Float64(_)
        | NodeKind::LStr(_)
        | NodeKind::SStr(_)
        | NodeKind::List
        | NodeKind::Object => return Ok(Some(lhs)),
        NodeKind::Nil => return Ok(Some(rhs)),
        NodeKind::Boolean(v) => return Ok(Some(if v { lhs } else { rhs })),
        _ => {
            if let Some(bv) = ti.boolean_value(graph, cond) {
                return Ok(Some(if bv { lhs } else { rhs }));
            }
        }
    }
    // both arms agree and the condition cannot trap: pick either
    if lhs == rhs && !graph.node(cond).has_side_effect() {
        return Ok(Some(lhs));
    }
    // cond ? true : false collapses to a coercion, the inverted pair to
    // the negated coercion
    if let (Some(lb), Some(rb)) = (bool_val(graph, lhs), bool_val(graph, rhs)) {
        if lb != rb {
            let kind = if lb {
                NodeKind::ConvBoolean
            } else {
                NodeKind::ConvNBoolean
            };
            return Ok(Some(graph.new_node(kind, &[cond])?));
        }
    }
    Ok(None)
}
