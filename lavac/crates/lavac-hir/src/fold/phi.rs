//! Phi folds.

use crate::graph::{Graph, GraphResult};
use crate::node::{NodeId, NodeKind};
use crate::types::TypeInference;

use super::fold_ternary;

/// Fold a two-way merge before the phi exists: identical inputs collapse,
/// and a merge under an `If` with a trap-free condition may fold as a
/// ternary.
pub fn fold_phi(
    graph: &mut Graph,
    ti: &mut TypeInference,
    lhs: NodeId,
    rhs: NodeId,
    region: NodeId,
) -> GraphResult<Option<NodeId>> {
    if lhs == rhs {
        return Ok(Some(lhs));
    }
    if let NodeKind::If { .. } = graph.kind(region) {
        let cond = graph.node(region).operands()[0];
        if !graph.node(cond).has_side_effect() {
            return fold_ternary(graph, ti, cond, lhs, rhs);
        }
    }
    Ok(None)
}

/// Fold an existing two-input phi whose inputs agree.
pub fn fold_phi_node(graph: &Graph, phi: NodeId) -> Option<NodeId> {
    let node = graph.node(phi);
    if node.has_side_effect() || node.operands().len() != 2 {
        return None;
    }
    let lhs = node.operands()[0];
    let rhs = node.operands()[1];
    if lhs == rhs {
        Some(lhs)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs_collapse() {
        let mut g = Graph::new();
        let mut ti = TypeInference::new(&g);
        let region = g.new_node(NodeKind::Region, &[]).unwrap();
        let x = g.float64(1.0).unwrap();
        let r = fold_phi(&mut g, &mut ti, x, x, region).unwrap().unwrap();
        assert_eq!(r, x);
    }

    #[test]
    fn merge_under_decided_if_folds_as_ternary() {
        let mut g = Graph::new();
        let mut ti = TypeInference::new(&g);
        let cond = g.boolean(true).unwrap();
        let if_node = g
            .new_node(
                NodeKind::If {
                    merge: NodeId::INVALID,
                },
                &[cond],
            )
            .unwrap();
        let a = g.float64(1.0).unwrap();
        let b = g.float64(2.0).unwrap();
        let r = fold_phi(&mut g, &mut ti, a, b, if_node).unwrap().unwrap();
        assert_eq!(r, a);
    }

    #[test]
    fn existing_phi_with_equal_inputs() {
        let mut g = Graph::new();
        let region = g.new_node(NodeKind::Region, &[]).unwrap();
        let x = g.float64(3.0).unwrap();
        let phi = g.phi(region, &[x, x]).unwrap();
        assert_eq!(fold_phi_node(&g, phi), Some(x));

        let y = g.float64(4.0).unwrap();
        let phi2 = g.phi(region, &[x, y]).unwrap();
        assert_eq!(fold_phi_node(&g, phi2), None);
    }
}
