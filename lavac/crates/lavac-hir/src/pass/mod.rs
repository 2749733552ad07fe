//! Optimization passes.
//!
//! Each pass takes the graph, mutates it in place and reports whether it
//! changed anything. Passes observe the graph exactly as the previous
//! pass left it; nothing here runs concurrently. The name is the handle
//! used to enable or disable a pass from configuration.

mod dce;
mod guard_eliminate;
mod gvn;
mod infer;
mod loop_analyze;
mod loop_induction;
mod simplify;

pub use dce::Dce;
pub use guard_eliminate::GuardEliminate;
pub use gvn::Gvn;
pub use infer::Infer;
pub use loop_analyze::{InductionCandidate, LoopAnalysis, LoopNest};
pub use loop_induction::LoopInduction;
pub use simplify::Simplify;

use crate::graph::Graph;
use crate::node::RefKind;

/// Pass execution mode. `Debug` re-checks the edge invariants after the
/// pass ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassFlag {
    Normal,
    Debug,
}

/// A named graph transformation.
pub trait HirPass {
    /// Name used for dynamic enable/disable.
    fn name(&self) -> &'static str;

    /// Run over the graph. Returns true when the graph changed.
    fn perform(&mut self, graph: &mut Graph, flag: PassFlag) -> bool;
}

/// Drop a dead expression and every operand that dies with it.
pub(crate) fn purge_if_dead(graph: &mut Graph, id: crate::node::NodeId) {
    if !graph.node(id).is_dead() {
        return;
    }
    let mut worklist = vec![id];
    while let Some(n) = worklist.pop() {
        if !graph.node(n).is_dead() {
            continue;
        }
        let children: Vec<_> = graph
            .node(n)
            .operands()
            .iter()
            .chain(graph.node(n).effects().iter())
            .copied()
            .collect();
        graph.clear_edges(n);
        worklist.extend(children);
    }
}

/// Check invariant: every operand/effect edge has a matching back-ref and
/// vice versa. Debug builds trip on violation.
pub fn verify_edges(graph: &Graph) -> bool {
    for id in graph.node_ids() {
        let node = graph.node(id);
        for (pos, &v) in node.operands().iter().enumerate() {
            let ok = graph
                .node(v)
                .refs()
                .iter()
                .any(|r| r.user == id && r.kind == RefKind::Operand && r.pos == pos as u32);
            if !ok {
                return false;
            }
        }
        for (pos, &v) in node.effects().iter().enumerate() {
            let ok = graph
                .node(v)
                .refs()
                .iter()
                .any(|r| r.user == id && r.kind == RefKind::Effect && r.pos == pos as u32);
            if !ok {
                return false;
            }
        }
        for r in node.refs() {
            let user = graph.node(r.user);
            let slot = match r.kind {
                RefKind::Operand => user.operands().get(r.pos as usize),
                RefKind::Effect => user.effects().get(r.pos as usize),
            };
            if slot != Some(&id) {
                return false;
            }
        }
    }
    true
}
