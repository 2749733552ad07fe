//! Constant folding and algebraic simplification.
//!
//! Every function here is a purely functional rewrite: it either returns a
//! replacement node or `None`, and never mutates the inputs (the one
//! exception is the in-place store folding on literals in [`memory`],
//! which is the point of that fold). The graph builder runs these on the
//! fly so only unfolded residue ever gets installed; the simplification
//! pass re-runs them over a finished graph.

mod arith;
mod intrinsic;
mod memory;
mod phi;

pub use arith::{fold_binary, fold_ternary, fold_unary, simplify_logic};
pub use intrinsic::fold_intrinsic;
pub use memory::{fold_index_get, fold_index_set, fold_prop_get, fold_prop_set};
pub use phi::{fold_phi, fold_phi_node};

use crate::graph::{Graph, GraphResult};
use crate::node::{NodeId, NodeKind};
use crate::types::TypeKind;

/// Wrap an unboxed value back into the universal representation, cancelling
/// an adjacent `Unbox` of the same type. The cancellation is mandatory:
/// `Box(Unbox(x, T), T)` never survives construction.
pub fn new_box(graph: &mut Graph, value: NodeId, tk: TypeKind) -> GraphResult<NodeId> {
    if let NodeKind::Unbox(t) = graph.kind(value) {
        if t == tk {
            return Ok(graph.node(value).operands()[0]);
        }
    }
    graph.new_node(NodeKind::Box(tk), &[value])
}

/// Load the typed value out of the universal representation, cancelling an
/// adjacent `Box` of the same type.
pub fn new_unbox(graph: &mut Graph, value: NodeId, tk: TypeKind) -> GraphResult<NodeId> {
    if let NodeKind::Box(t) = graph.kind(value) {
        if t == tk {
            return Ok(graph.node(value).operands()[0]);
        }
    }
    graph.new_node(NodeKind::Unbox(tk), &[value])
}

pub(crate) fn float_val(graph: &Graph, id: NodeId) -> Option<f64> {
    match graph.kind(id) {
        NodeKind::Float64(v) => Some(v),
        _ => None,
    }
}

pub(crate) fn bool_val(graph: &Graph, id: NodeId) -> Option<bool> {
    match graph.kind(id) {
        NodeKind::Boolean(v) => Some(v),
        _ => None,
    }
}

pub(crate) fn is_nil(graph: &Graph, id: NodeId) -> bool {
    matches!(graph.kind(id), NodeKind::Nil)
}

/// Float64 index usable for list access: a non-negative integral value.
pub(crate) fn cast_to_index(value: f64) -> Option<u32> {
    if value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Some(value as u32)
    } else {
        None
    }
}
