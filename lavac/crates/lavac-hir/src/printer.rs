//! Render a graph as a dot description.
//!
//! Control edges are solid, operand edges dashed, effect edges dotted.
//! Output is deterministic (id order) so tests can assert on substrings.

use std::fmt::Write;

use crate::graph::Graph;
use crate::node::{NodeId, NodeKind};

fn label(graph: &Graph, id: NodeId) -> String {
    let kind = graph.kind(id);
    match kind {
        NodeKind::Float64(v) => format!("float64({v})"),
        NodeKind::Int64(v) => format!("int64({v})"),
        NodeKind::Boolean(v) => format!("boolean({v})"),
        NodeKind::LStr(_) | NodeKind::SStr(_) => {
            format!("{}({:?})", kind.mnemonic(), graph.str_value(id).unwrap_or(""))
        }
        NodeKind::Arg(i) => format!("arg({i})"),
        NodeKind::UGet(i) => format!("uget({i})"),
        NodeKind::USet(i) => format!("uset({i})"),
        NodeKind::Projection(i) => format!("projection({i})"),
        NodeKind::OSRLoad(i) => format!("osr_load({i})"),
        NodeKind::StackSlot(i) => format!("stack_slot({i})"),
        NodeKind::Checkpoint { pc } => format!("checkpoint(pc={pc})"),
        NodeKind::Unary(op) => format!("unary({})", op.name()),
        NodeKind::Arithmetic(op)
        | NodeKind::Compare(op)
        | NodeKind::Logical(op)
        | NodeKind::Float64Arithmetic(op)
        | NodeKind::Float64Bitwise(op)
        | NodeKind::Float64Compare(op)
        | NodeKind::BooleanLogic(op)
        | NodeKind::StringCompare(op) => format!("{}({})", kind.mnemonic(), op.name()),
        NodeKind::ICall(ic) => format!("icall({})", ic.name()),
        NodeKind::Box(t) | NodeKind::Unbox(t) | NodeKind::TestType(t) => {
            format!("{}({})", kind.mnemonic(), t.name())
        }
        _ => kind.mnemonic().to_string(),
    }
}

/// Dot text for the whole graph.
pub fn print_graph(graph: &Graph) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph hir {{");
    let _ = writeln!(out, "  node [fontname=monospace];");

    for id in graph.node_ids() {
        let node = graph.node(id);
        // dead floating nodes would only clutter the picture
        if node.is_dead() && node.preds().is_empty() && node.succs().is_empty() {
            continue;
        }
        let shape = if node.kind.is_control() {
            "box"
        } else {
            "ellipse"
        };
        let _ = writeln!(
            out,
            "  n{} [label=\"{}:{}\" shape={}];",
            id.0,
            id.0,
            label(graph, id),
            shape
        );
    }

    for id in graph.node_ids() {
        let node = graph.node(id);
        if node.is_dead() && node.preds().is_empty() && node.succs().is_empty() {
            continue;
        }
        for &s in node.succs() {
            let _ = writeln!(out, "  n{} -> n{};", id.0, s.0);
        }
        for &op in node.operands() {
            let _ = writeln!(out, "  n{} -> n{} [style=dashed];", id.0, op.0);
        }
        for &e in node.effects() {
            let _ = writeln!(out, "  n{} -> n{} [style=dotted];", id.0, e.0);
        }
    }
    let _ = writeln!(out, "}}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit::Kit;

    #[test]
    fn renders_nodes_and_edges() {
        let mut kit = Kit::new();
        let v = kit.float64(4.0);
        kit.do_return(v);
        let g = kit.finish();
        let dot = print_graph(&g);
        assert!(dot.starts_with("digraph hir {"));
        assert!(dot.contains("float64(4)"));
        assert!(dot.contains("shape=box"));
        assert!(dot.contains("[style=dashed]"));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn dead_nodes_are_omitted() {
        let mut kit = Kit::new();
        let dead = kit.float64(7.0);
        let live = kit.float64(1.0);
        kit.do_return(live);
        let g = kit.finish();
        let dot = print_graph(&g);
        let _ = dead;
        assert!(!dot.contains("float64(7)"));
        assert!(dot.contains("float64(1)"));
    }
}
