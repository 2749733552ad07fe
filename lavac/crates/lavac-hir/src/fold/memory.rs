//! Memory-operation folds on literal lists and objects.
//!
//! Get/set folding is limited by design: field mutation is carried by the
//! effect chain rather than reflected back into literal nodes, so these
//! folds only apply while the access provably has no effect dependency.
//! The callers check that before asking.

use crate::graph::{Graph, GraphResult};
use crate::node::{NodeId, NodeKind};

use super::{cast_to_index, float_val};

/// Find the value slot of `key` inside an object literal.
fn object_literal_find(graph: &Graph, obj: NodeId, key: NodeId) -> Option<NodeId> {
    if !matches!(graph.kind(obj), NodeKind::Object) {
        return None;
    }
    let key_str = graph.str_value(key)?;
    for &kv in graph.node(obj).operands() {
        debug_assert!(matches!(graph.kind(kv), NodeKind::ObjectKV));
        let stored_key = graph.node(kv).operands()[0];
        if graph.str_value(stored_key) == Some(key_str) {
            return Some(kv);
        }
    }
    None
}

/// `obj[idx]` on a list or object literal with a literal key. Out-of-bounds
/// list access is left alone: the runtime path raises the error.
pub fn fold_index_get(graph: &Graph, obj: NodeId, idx: NodeId) -> Option<NodeId> {
    if matches!(graph.kind(obj), NodeKind::List) {
        let iidx = cast_to_index(float_val(graph, idx)?)?;
        let elems = graph.node(obj).operands();
        if (iidx as usize) < elems.len() {
            return Some(elems[iidx as usize]);
        }
        return None;
    }
    let kv = object_literal_find(graph, obj, idx)?;
    Some(graph.node(kv).operands()[1])
}

/// `obj.key` on an object literal with a known key.
pub fn fold_prop_get(graph: &Graph, obj: NodeId, key: NodeId) -> Option<NodeId> {
    let kv = object_literal_find(graph, obj, key)?;
    Some(graph.node(kv).operands()[1])
}

/// `obj[idx] = value` on a literal: rewrite the stored slot in place.
/// Returns true when the store was absorbed by the literal.
pub fn fold_index_set(
    graph: &mut Graph,
    obj: NodeId,
    idx: NodeId,
    value: NodeId,
) -> GraphResult<bool> {
    if matches!(graph.kind(obj), NodeKind::List) {
        if let Some(iidx) = float_val(graph, idx).and_then(cast_to_index) {
            if (iidx as usize) < graph.node(obj).operands().len() {
                graph.replace_operand(obj, iidx as usize, value);
                return Ok(true);
            }
        }
        return Ok(false);
    }
    if let Some(kv) = object_literal_find(graph, obj, idx) {
        // the value sits at slot 1, slot 0 is the key
        graph.replace_operand(kv, 1, value);
        return Ok(true);
    }
    Ok(false)
}

/// `obj.key = value` on an object literal with a known key.
pub fn fold_prop_set(
    graph: &mut Graph,
    obj: NodeId,
    key: NodeId,
    value: NodeId,
) -> GraphResult<bool> {
    if let Some(kv) = object_literal_find(graph, obj, key) {
        graph.replace_operand(kv, 1, value);
        return Ok(true);
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_literal(g: &mut Graph, values: &[f64]) -> NodeId {
        let elems: Vec<NodeId> = values.iter().map(|&v| g.float64(v).unwrap()).collect();
        g.new_node(NodeKind::List, &elems).unwrap()
    }

    fn object_literal(g: &mut Graph, pairs: &[(&str, f64)]) -> NodeId {
        let kvs: Vec<NodeId> = pairs
            .iter()
            .map(|&(k, v)| {
                let key = g.string(k).unwrap();
                let val = g.float64(v).unwrap();
                g.new_node(NodeKind::ObjectKV, &[key, val]).unwrap()
            })
            .collect();
        g.new_node(NodeKind::Object, &kvs).unwrap()
    }

    #[test]
    fn list_index_in_bounds() {
        let mut g = Graph::new();
        let list = list_literal(&mut g, &[10.0, 20.0, 30.0]);
        let idx = g.float64(1.0).unwrap();
        let r = fold_index_get(&g, list, idx).unwrap();
        assert_eq!(g.kind(r), NodeKind::Float64(20.0));
    }

    #[test]
    fn list_index_out_of_bounds_bails() {
        let mut g = Graph::new();
        let list = list_literal(&mut g, &[10.0]);
        let idx = g.float64(5.0).unwrap();
        assert!(fold_index_get(&g, list, idx).is_none());
        let neg = g.float64(-1.0).unwrap();
        assert!(fold_index_get(&g, list, neg).is_none());
        let frac = g.float64(0.5).unwrap();
        assert!(fold_index_get(&g, list, frac).is_none());
    }

    #[test]
    fn object_get_by_literal_key() {
        let mut g = Graph::new();
        let obj = object_literal(&mut g, &[("a", 1.0), ("b", 2.0)]);
        let key = g.string("b").unwrap();
        let r = fold_prop_get(&g, obj, key).unwrap();
        assert_eq!(g.kind(r), NodeKind::Float64(2.0));

        let missing = g.string("c").unwrap();
        assert!(fold_prop_get(&g, obj, missing).is_none());
    }

    #[test]
    fn object_set_rewrites_in_place() {
        let mut g = Graph::new();
        let obj = object_literal(&mut g, &[("a", 1.0)]);
        let key = g.string("a").unwrap();
        let new_val = g.float64(9.0).unwrap();
        assert!(fold_prop_set(&mut g, obj, key, new_val).unwrap());
        let r = fold_prop_get(&g, obj, key).unwrap();
        assert_eq!(r, new_val);
    }

    #[test]
    fn list_set_rewrites_in_place() {
        let mut g = Graph::new();
        let list = list_literal(&mut g, &[1.0, 2.0]);
        let idx = g.float64(0.0).unwrap();
        let val = g.float64(7.0).unwrap();
        assert!(fold_index_set(&mut g, list, idx, val).unwrap());
        assert_eq!(g.node(list).operands()[0], val);

        let oob = g.float64(9.0).unwrap();
        assert!(!fold_index_set(&mut g, list, oob, val).unwrap());
    }
}
