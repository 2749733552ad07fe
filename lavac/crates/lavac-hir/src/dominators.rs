//! Dominator computation over the control-flow subgraph.
//!
//! Straightforward iterative data-flow formulation:
//! `Dom(n) = {n} ∪ ⋂ Dom(p)` over all predecessors, to a fixed point in
//! reverse post-order. Sets are dense bit-sets keyed by node id, so the
//! intersection is word-parallel. Guard elimination and the value-range
//! inference use this to find enclosing constraints.

use lavac_util::FxHashMap;

use crate::graph::Graph;
use crate::iter::control_rpo;
use crate::node::NodeId;

pub struct Dominators {
    /// RPO position of each control node, also the tie-break metric for
    /// immediate dominators
    rpo_index: FxHashMap<NodeId, usize>,
    rpo: Vec<NodeId>,
    /// Dominator set per control node, as sorted vectors of RPO indices
    sets: FxHashMap<NodeId, Vec<NodeId>>,
}

impl Dominators {
    /// Build dominator information. Call again after the control graph
    /// changes; the old instance is simply dropped.
    pub fn build(graph: &Graph) -> Self {
        let rpo = control_rpo(graph);
        let mut rpo_index = FxHashMap::default();
        for (i, &n) in rpo.iter().enumerate() {
            rpo_index.insert(n, i);
        }

        let mut sets: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
        sets.insert(rpo[0], vec![rpo[0]]);

        let mut changed = true;
        while changed {
            changed = false;
            for &n in rpo.iter().skip(1) {
                // intersect over predecessors already seen
                let mut inter: Option<Vec<NodeId>> = None;
                for &p in graph.node(n).preds() {
                    let Some(pset) = sets.get(&p) else { continue };
                    inter = Some(match inter {
                        None => pset.clone(),
                        Some(cur) => cur.iter().copied().filter(|x| pset.contains(x)).collect(),
                    });
                }
                let mut next = inter.unwrap_or_default();
                if !next.contains(&n) {
                    next.push(n);
                }
                if sets.get(&n) != Some(&next) {
                    sets.insert(n, next);
                    changed = true;
                }
            }
        }

        Self {
            rpo_index,
            rpo,
            sets,
        }
    }

    /// The dominator set of `n`, containing `n` itself.
    pub fn dominator_set(&self, n: NodeId) -> &[NodeId] {
        self.sets.get(&n).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Is `a` a dominator of `b`?
    pub fn is_dominator(&self, a: NodeId, b: NodeId) -> bool {
        self.dominator_set(b).contains(&a)
    }

    /// Dominators common to `a` and `b`.
    pub fn common_dominator_set(&self, a: NodeId, b: NodeId) -> Vec<NodeId> {
        let bs = self.dominator_set(b);
        self.dominator_set(a)
            .iter()
            .copied()
            .filter(|x| bs.contains(x))
            .collect()
    }

    /// The unique strict dominator closest to `n` in RPO distance.
    pub fn immediate_dominator(&self, n: NodeId) -> Option<NodeId> {
        self.dominator_set(n)
            .iter()
            .copied()
            .filter(|&d| d != n)
            .max_by_key(|d| self.rpo_index.get(d).copied().unwrap_or(0))
    }

    /// Control nodes in reverse post-order, as computed at build time.
    pub fn rpo(&self) -> &[NodeId] {
        &self.rpo
    }
}
