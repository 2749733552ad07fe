//! Guard elimination.
//!
//! A guard is redundant when a dominating control node already guards the
//! same value with the same type test: whatever made the first guard pass
//! makes the second pass too. The pass walks control flow in RPO carrying
//! the set of (value, type) annotations proven so far along the dominator
//! chain; each redundant guard is unpinned from its region and its uses
//! rerouted to the dominating guard. The walk is monotone under RPO, so
//! one pass suffices.

use lavac_util::FxHashMap;
use tracing::debug;

use crate::dominators::Dominators;
use crate::graph::Graph;
use crate::node::{NodeId, NodeKind};
use crate::types::TypeKind;

use super::{purge_if_dead, HirPass, PassFlag};

pub struct GuardEliminate;

/// What a guard proves: this value has this type.
type Annotation = (NodeId, TypeKind);

fn guard_annotation(graph: &Graph, guard: NodeId) -> Option<(Annotation, NodeId)> {
    if !matches!(graph.kind(guard), NodeKind::Guard) {
        return None;
    }
    let test = graph.node(guard).operands()[0];
    match graph.kind(test) {
        NodeKind::TestType(tk) => {
            let value = graph.node(test).operands()[0];
            Some(((value, tk), test))
        }
        _ => None,
    }
}

impl HirPass for GuardEliminate {
    fn name(&self) -> &'static str {
        "guard-eliminate"
    }

    fn perform(&mut self, graph: &mut Graph, flag: PassFlag) -> bool {
        let dom = Dominators::build(graph);
        // annotations proven at each control node, including inherited ones
        let mut proven: FxHashMap<NodeId, FxHashMap<Annotation, NodeId>> = FxHashMap::default();
        let mut changed = false;

        for &cf in dom.rpo() {
            let mut here = match dom.immediate_dominator(cf) {
                Some(idom) => proven.get(&idom).cloned().unwrap_or_default(),
                None => FxHashMap::default(),
            };
            // regions merging several predecessors only keep facts proven
            // on every incoming path; inheriting from the immediate
            // dominator alone gives exactly that
            let guards: Vec<NodeId> = graph.node(cf).operands().to_vec();
            for guard in guards {
                let Some((ann, test)) = guard_annotation(graph, guard) else {
                    continue;
                };
                match here.get(&ann) {
                    Some(&canonical) if canonical != guard => {
                        debug!(?guard, ?canonical, "removing dominated guard");
                        let checkpoint = graph.node(guard).operands()[1];
                        graph.remove_operand_value(cf, guard);
                        graph.replace(guard, canonical);
                        purge_if_dead(graph, test);
                        purge_if_dead(graph, checkpoint);
                        changed = true;
                    }
                    _ => {
                        here.insert(ann, guard);
                    }
                }
            }
            proven.insert(cf, here);
        }

        if flag == PassFlag::Debug {
            debug_assert!(super::verify_edges(graph));
        }
        changed
    }
}
