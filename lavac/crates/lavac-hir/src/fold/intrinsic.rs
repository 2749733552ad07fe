//! Pure evaluation of intrinsic calls over constant arguments.
//!
//! Each intrinsic folds only when every argument is a constant of the type
//! it expects; anything else leaves the `ICall` in place for the runtime
//! to sort out.

use lavac_bc::Intrinsic;

use crate::graph::{Graph, GraphResult};
use crate::node::{NodeId, NodeKind};

use super::float_val;

fn as_u32(graph: &Graph, id: NodeId) -> Option<u32> {
    // shifts and bit ops run on the value truncated to 32 bits
    float_val(graph, id).map(|v| v as u32)
}

fn as_u8(graph: &Graph, id: NodeId) -> Option<u8> {
    // the shift amount register is 8 bits wide
    float_val(graph, id).map(|v| v as u8)
}

fn unary_float(
    graph: &mut Graph,
    args: &[NodeId],
    f: impl FnOnce(f64) -> f64,
) -> GraphResult<Option<NodeId>> {
    match float_val(graph, args[0]) {
        Some(v) => Ok(Some(graph.float64(f(v))?)),
        None => Ok(None),
    }
}

fn binary_float(
    graph: &mut Graph,
    args: &[NodeId],
    f: impl FnOnce(f64, f64) -> f64,
) -> GraphResult<Option<NodeId>> {
    match (float_val(graph, args[0]), float_val(graph, args[1])) {
        (Some(a), Some(b)) => Ok(Some(graph.float64(f(a, b))?)),
        _ => Ok(None),
    }
}

fn shift_like(
    graph: &mut Graph,
    args: &[NodeId],
    f: impl FnOnce(u32, u8) -> u32,
) -> GraphResult<Option<NodeId>> {
    match (as_u32(graph, args[0]), as_u8(graph, args[1])) {
        (Some(a), Some(b)) => Ok(Some(graph.float64(f(a, b) as f64)?)),
        _ => Ok(None),
    }
}

fn bit_like(
    graph: &mut Graph,
    args: &[NodeId],
    f: impl FnOnce(u32, u32) -> u32,
) -> GraphResult<Option<NodeId>> {
    match (as_u32(graph, args[0]), as_u32(graph, args[1])) {
        (Some(a), Some(b)) => Ok(Some(graph.float64(f(a, b) as f64)?)),
        _ => Ok(None),
    }
}

/// Coerce a constant to a number the way the `int`/`real` builtins do.
fn to_real(graph: &Graph, id: NodeId) -> Option<f64> {
    match graph.kind(id) {
        NodeKind::Float64(v) => Some(v),
        NodeKind::Boolean(b) => Some(if b { 1.0 } else { 0.0 }),
        NodeKind::LStr(_) | NodeKind::SStr(_) => graph.str_value(id)?.trim().parse().ok(),
        _ => None,
    }
}

/// Evaluate an intrinsic call over constant arguments, or `None`.
pub fn fold_intrinsic(
    graph: &mut Graph,
    ic: Intrinsic,
    args: &[NodeId],
) -> GraphResult<Option<NodeId>> {
    if args.len() != ic.arg_count() as usize {
        return Ok(None);
    }
    match ic {
        Intrinsic::Max => binary_float(graph, args, f64::max),
        Intrinsic::Min => binary_float(graph, args, f64::min),
        Intrinsic::Sqrt => unary_float(graph, args, f64::sqrt),
        Intrinsic::Sin => unary_float(graph, args, f64::sin),
        Intrinsic::Cos => unary_float(graph, args, f64::cos),
        Intrinsic::Tan => unary_float(graph, args, f64::tan),
        Intrinsic::Abs => unary_float(graph, args, f64::abs),
        Intrinsic::Ceil => unary_float(graph, args, f64::ceil),
        Intrinsic::Floor => unary_float(graph, args, f64::floor),
        Intrinsic::LShift => shift_like(graph, args, |a, b| a.wrapping_shl(b as u32)),
        Intrinsic::RShift => shift_like(graph, args, |a, b| a.wrapping_shr(b as u32)),
        Intrinsic::LRo => shift_like(graph, args, |a, b| a.rotate_left(b as u32 % 32)),
        Intrinsic::RRo => shift_like(graph, args, |a, b| a.rotate_right(b as u32 % 32)),
        Intrinsic::BAnd => bit_like(graph, args, |a, b| a & b),
        Intrinsic::BOr => bit_like(graph, args, |a, b| a | b),
        Intrinsic::BXor => bit_like(graph, args, |a, b| a ^ b),
        Intrinsic::Int => match to_real(graph, args[0]) {
            Some(v) => Ok(Some(graph.float64(v as i32 as f64)?)),
            None => Ok(None),
        },
        Intrinsic::Real => match to_real(graph, args[0]) {
            Some(v) => Ok(Some(graph.float64(v)?)),
            None => Ok(None),
        },
        Intrinsic::String => match graph.kind(args[0]) {
            NodeKind::Float64(v) => {
                let s = format!("{v}");
                Ok(Some(graph.string(&s)?))
            }
            NodeKind::Boolean(b) => {
                let s = if b { "true" } else { "false" };
                Ok(Some(graph.string(s)?))
            }
            NodeKind::LStr(_) | NodeKind::SStr(_) => Ok(Some(args[0])),
            _ => Ok(None),
        },
        Intrinsic::Push => {
            // push on a literal list clones the literal with the element
            // appended; the original literal may have other users
            if matches!(graph.kind(args[0]), NodeKind::List) {
                let mut elems = graph.node(args[0]).operands().to_vec();
                elems.push(args[1]);
                Ok(Some(graph.new_node(NodeKind::List, &elems)?))
            } else {
                Ok(None)
            }
        }
        Intrinsic::Pop => {
            if matches!(graph.kind(args[0]), NodeKind::List)
                && !graph.node(args[0]).operands().is_empty()
            {
                let elems = graph.node(args[0]).operands();
                let elems = elems[..elems.len() - 1].to_vec();
                Ok(Some(graph.new_node(NodeKind::List, &elems)?))
            } else {
                Ok(None)
            }
        }
        Intrinsic::Len => match graph.kind(args[0]) {
            NodeKind::List | NodeKind::Object => {
                let n = graph.node(args[0]).operands().len();
                Ok(Some(graph.float64(n as f64)?))
            }
            NodeKind::LStr(_) | NodeKind::SStr(_) => {
                let n = graph.str_value(args[0]).unwrap().len();
                Ok(Some(graph.float64(n as f64)?))
            }
            _ => Ok(None),
        },
        Intrinsic::Empty => match graph.kind(args[0]) {
            NodeKind::List | NodeKind::Object => {
                let empty = graph.node(args[0]).operands().is_empty();
                Ok(Some(graph.boolean(empty)?))
            }
            NodeKind::LStr(_) | NodeKind::SStr(_) => {
                let empty = graph.str_value(args[0]).unwrap().is_empty();
                Ok(Some(graph.boolean(empty)?))
            }
            _ => Ok(None),
        },
        Intrinsic::Type => {
            let name = match graph.kind(args[0]) {
                NodeKind::Float64(_) => "real",
                NodeKind::Boolean(_) => "boolean",
                NodeKind::Nil => "null",
                NodeKind::LStr(_) | NodeKind::SStr(_) => "string",
                NodeKind::List => "list",
                NodeKind::Object => "object",
                NodeKind::Closure(_) => "closure",
                _ => return Ok(None),
            };
            Ok(Some(graph.string(name)?))
        }
        // container mutators and iteration never fold at compile time
        Intrinsic::Boolean
        | Intrinsic::Set
        | Intrinsic::Has
        | Intrinsic::Update
        | Intrinsic::Put
        | Intrinsic::Delete
        | Intrinsic::Clear
        | Intrinsic::Iter => Ok(None),
    }
}
