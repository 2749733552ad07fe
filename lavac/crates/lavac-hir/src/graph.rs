//! The graph: node container, id assignment and the edge model.
//!
//! A [`Graph`] owns exactly one arena; every node of a compilation lives in
//! it and dies with it. Ids are assigned monotonically at construction and
//! never reused, so any pass can size a dense side table with
//! [`Graph::max_id`].
//!
//! Edges are bidirectional by construction: whenever node `a` holds node
//! `b` in an operand or effect slot, `b`'s ref list carries `(a, slot)`.
//! Every mutation goes through the methods here, which keep the two sides
//! consistent; [`Graph::replace`] is the single graph-rewriting primitive
//! all optimizations use.

use lavac_util::{Arena, ArenaError, Interner, Sym};
use thiserror::Error;

use crate::node::{Node, NodeId, NodeKind, Ref, RefKind};

/// Strings at most this long are small strings with a dedicated constant
/// kind (and typed equality nodes).
pub const SSO_MAX_LEN: usize = 31;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error(transparent)]
    Arena(#[from] ArenaError),

    #[error("graph anchors already initialized")]
    AlreadyInitialized,
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Container of nodes plus the two control anchors.
pub struct Graph {
    nodes: Arena<Node>,
    strings: Interner,
    start: Option<NodeId>,
    end: Option<NodeId>,
    osr_start: Option<NodeId>,
    osr_end: Option<NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            nodes: Arena::new(),
            strings: Interner::new(),
            start: None,
            end: None,
            osr_start: None,
            osr_end: None,
        }
    }

    /// One past the highest id handed out so far.
    pub fn max_id(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    /// Kind tag of a node (payloads are `Copy`).
    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind
    }

    /// Iterate every node id allocated so far, in id order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.max_id() as u32).map(NodeId)
    }

    // ------------------------------------------------------------------
    // anchors
    // ------------------------------------------------------------------

    /// Record the two control anchors. May be called exactly once.
    pub fn initialize(&mut self, start: NodeId, end: NodeId) -> GraphResult<()> {
        if self.start.is_some() {
            return Err(GraphError::AlreadyInitialized);
        }
        debug_assert!(matches!(self.kind(start), NodeKind::Start | NodeKind::OSRStart));
        debug_assert!(matches!(self.kind(end), NodeKind::End | NodeKind::OSREnd));
        self.start = Some(start);
        self.end = Some(end);
        Ok(())
    }

    /// Record the OSR entry anchors for a graph that has a second entry.
    pub fn initialize_osr(&mut self, osr_start: NodeId, osr_end: NodeId) {
        debug_assert!(matches!(self.kind(osr_start), NodeKind::OSRStart));
        debug_assert!(matches!(self.kind(osr_end), NodeKind::OSREnd));
        self.osr_start = Some(osr_start);
        self.osr_end = Some(osr_end);
    }

    pub fn start(&self) -> NodeId {
        debug_assert!(self.start.is_some(), "graph anchors not initialized");
        self.start.unwrap_or(NodeId::INVALID)
    }

    pub fn end(&self) -> NodeId {
        debug_assert!(self.end.is_some(), "graph anchors not initialized");
        self.end.unwrap_or(NodeId::INVALID)
    }

    pub fn osr_start(&self) -> Option<NodeId> {
        self.osr_start
    }

    pub fn osr_end(&self) -> Option<NodeId> {
        self.osr_end
    }

    // ------------------------------------------------------------------
    // construction
    // ------------------------------------------------------------------

    /// Allocate a node of `kind` with the given operands.
    pub fn new_node(&mut self, kind: NodeKind, operands: &[NodeId]) -> GraphResult<NodeId> {
        debug_assert!(
            kind.arity().admits(operands.len()),
            "arity mismatch constructing {} with {} operands",
            kind.mnemonic(),
            operands.len()
        );
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.alloc(Node::new(id, kind))?;
        for &op in operands {
            self.add_operand(id, op);
        }
        Ok(id)
    }

    // constant factories

    pub fn float64(&mut self, value: f64) -> GraphResult<NodeId> {
        self.new_node(NodeKind::Float64(value), &[])
    }

    pub fn int64(&mut self, value: i64) -> GraphResult<NodeId> {
        self.new_node(NodeKind::Int64(value), &[])
    }

    pub fn boolean(&mut self, value: bool) -> GraphResult<NodeId> {
        self.new_node(NodeKind::Boolean(value), &[])
    }

    pub fn nil(&mut self) -> GraphResult<NodeId> {
        self.new_node(NodeKind::Nil, &[])
    }

    /// Build a string constant, picking the small or long kind by length.
    pub fn string(&mut self, value: &str) -> GraphResult<NodeId> {
        let sym = self.strings.intern(value);
        if value.len() <= SSO_MAX_LEN {
            self.new_node(NodeKind::SStr(sym), &[])
        } else {
            self.new_node(NodeKind::LStr(sym), &[])
        }
    }

    /// Intern without building a node.
    pub fn intern(&mut self, value: &str) -> Sym {
        self.strings.intern(value)
    }

    /// Payload of a string constant node.
    pub fn str_value(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::LStr(sym) | NodeKind::SStr(sym) => Some(self.strings.get(sym)),
            _ => None,
        }
    }

    pub fn str_of(&self, sym: Sym) -> &str {
        self.strings.get(sym)
    }

    // ------------------------------------------------------------------
    // edge model
    // ------------------------------------------------------------------

    /// Append `value` to `user`'s operand list and record the back-ref.
    /// A side-effecting operand marks the user side-effecting too.
    pub fn add_operand(&mut self, user: NodeId, value: NodeId) {
        let pos = self.node(user).operands.len() as u32;
        self.node_mut(user).operands.push(value);
        self.node_mut(value).refs.push(Ref {
            user,
            kind: RefKind::Operand,
            pos,
        });
        if self.node(value).side_effect {
            self.node_mut(user).side_effect = true;
        }
    }

    /// Swap the operand at `pos` for `value`, fixing both ref lists.
    pub fn replace_operand(&mut self, user: NodeId, pos: usize, value: NodeId) {
        let old = self.node(user).operands[pos];
        self.remove_ref(old, user, RefKind::Operand, pos as u32);
        self.node_mut(user).operands[pos] = value;
        self.node_mut(value).refs.push(Ref {
            user,
            kind: RefKind::Operand,
            pos: pos as u32,
        });
        if self.node(value).side_effect {
            self.node_mut(user).side_effect = true;
        }
    }

    /// Remove the operand at `pos`, shifting later slots down.
    pub fn remove_operand(&mut self, user: NodeId, pos: usize) {
        let old = self.node(user).operands[pos];
        self.remove_ref(old, user, RefKind::Operand, pos as u32);
        self.node_mut(user).operands.remove(pos);
        // later slots moved down one; their back-refs must follow
        let shifted: Vec<NodeId> = self.node(user).operands[pos..].to_vec();
        for (i, v) in shifted.into_iter().enumerate() {
            let new_pos = (pos + i) as u32;
            for r in self.node_mut(v).refs.iter_mut() {
                if r.user == user && r.kind == RefKind::Operand && r.pos == new_pos + 1 {
                    r.pos = new_pos;
                    break;
                }
            }
        }
    }

    /// Remove the first occurrence of `value` from `user`'s operand list.
    pub fn remove_operand_value(&mut self, user: NodeId, value: NodeId) -> bool {
        if let Some(pos) = self.node(user).operands.iter().position(|&v| v == value) {
            self.remove_operand(user, pos);
            true
        } else {
            false
        }
    }

    /// Append `value` to `user`'s effect list. Only memory-affecting nodes
    /// may appear there; anything else is silently skipped, as the check is
    /// structural by kind.
    pub fn add_effect(&mut self, user: NodeId, value: NodeId) {
        if !self.kind(value).is_memory_effect() {
            return;
        }
        let pos = self.node(user).effects.len() as u32;
        self.node_mut(user).effects.push(value);
        self.node_mut(value).refs.push(Ref {
            user,
            kind: RefKind::Effect,
            pos,
        });
        self.node_mut(user).side_effect = true;
    }

    /// Deduplicated [`Graph::add_effect`].
    pub fn add_effect_if_not_exist(&mut self, user: NodeId, value: NodeId) {
        if self.node(user).effects.contains(&value) {
            return;
        }
        self.add_effect(user, value);
    }

    /// Redirect every reference of `old` to `new` and strip `old`'s edges.
    ///
    /// After this call nothing points at `old`; it is dead unless it is a
    /// control anchor. This is the only rewriting primitive.
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        if old == new {
            return;
        }
        let refs = std::mem::take(&mut self.node_mut(old).refs);
        let new_has_effect = self.node(new).side_effect;
        for r in refs {
            match r.kind {
                RefKind::Operand => self.node_mut(r.user).operands[r.pos as usize] = new,
                RefKind::Effect => self.node_mut(r.user).effects[r.pos as usize] = new,
            }
            self.node_mut(new).refs.push(r);
            if new_has_effect {
                self.node_mut(r.user).side_effect = true;
            }
        }
        // the replaced node keeps no edges of its own
        self.clear_edges(old);
    }

    /// Drop every operand and effect edge leaving `id`.
    pub fn clear_edges(&mut self, id: NodeId) {
        let operands = std::mem::take(&mut self.node_mut(id).operands);
        for (pos, v) in operands.into_iter().enumerate() {
            self.remove_ref(v, id, RefKind::Operand, pos as u32);
        }
        let effects = std::mem::take(&mut self.node_mut(id).effects);
        for (pos, v) in effects.into_iter().enumerate() {
            self.remove_ref(v, id, RefKind::Effect, pos as u32);
        }
    }

    fn remove_ref(&mut self, value: NodeId, user: NodeId, kind: RefKind, pos: u32) {
        let refs = &mut self.node_mut(value).refs;
        if let Some(i) = refs
            .iter()
            .position(|r| r.user == user && r.kind == kind && r.pos == pos)
        {
            refs.swap_remove(i);
        }
    }

    // ------------------------------------------------------------------
    // control edges
    // ------------------------------------------------------------------

    /// Wire control flow from `from` to `to`. The successor order of a
    /// branch is significant: IfTrue is linked before IfFalse so that
    /// indexing successors by 0/1 is well defined.
    pub fn link(&mut self, from: NodeId, to: NodeId) {
        debug_assert!(self.kind(from).is_control() && self.kind(to).is_control());
        self.node_mut(from).succs.push(to);
        self.node_mut(to).preds.push(from);
    }

    /// Remove the control edge `from -> to`, if present.
    pub fn unlink(&mut self, from: NodeId, to: NodeId) {
        if let Some(i) = self.node(from).succs.iter().position(|&s| s == to) {
            self.node_mut(from).succs.remove(i);
        }
        if let Some(i) = self.node(to).preds.iter().position(|&p| p == from) {
            self.node_mut(to).preds.remove(i);
        }
    }

    /// Drop every incoming control edge of `id`.
    pub fn clear_preds(&mut self, id: NodeId) {
        let preds = std::mem::take(&mut self.node_mut(id).preds);
        for p in preds {
            if let Some(i) = self.node(p).succs.iter().position(|&s| s == id) {
                self.node_mut(p).succs.remove(i);
            }
        }
    }

    /// Move every pinned statement of region `from` onto region `to`,
    /// preserving order.
    pub fn move_statements(&mut self, from: NodeId, to: NodeId) {
        while !self.node(from).operands.is_empty() {
            let stmt = self.node(from).operands[0];
            self.remove_operand(from, 0);
            self.add_operand(to, stmt);
        }
    }

    /// The IfTrue child of an If node.
    pub fn if_true_of(&self, if_node: NodeId) -> NodeId {
        debug_assert!(matches!(self.kind(if_node), NodeKind::If { .. }));
        self.node(if_node).succs[0]
    }

    /// The IfFalse child of an If node.
    pub fn if_false_of(&self, if_node: NodeId) -> NodeId {
        debug_assert!(matches!(self.kind(if_node), NodeKind::If { .. }));
        self.node(if_node).succs[1]
    }

    /// Store the merge region on a branch head once it exists.
    pub fn set_merge(&mut self, branch: NodeId, merge: NodeId) {
        let node = self.node_mut(branch);
        match &mut node.kind {
            NodeKind::If { merge: m } | NodeKind::LoopHeader { merge: m } => *m = merge,
            other => debug_assert!(false, "set_merge on {}", other.mnemonic()),
        }
    }

    /// Update the region payload of a phi-like node.
    pub fn set_phi_region(&mut self, phi: NodeId, region: NodeId) {
        let node = self.node_mut(phi);
        match &mut node.kind {
            NodeKind::Phi { region: r }
            | NodeKind::EffectPhi { region: r }
            | NodeKind::LoopEffectPhi { region: r }
            | NodeKind::LoopIV { region: r }
            | NodeKind::LoopIVFloat64 { region: r }
            | NodeKind::LoopIVInt64 { region: r } => *r = region,
            other => debug_assert!(false, "set_phi_region on {}", other.mnemonic()),
        }
    }

    /// Rewrite a node's kind in place, keeping every edge. Used by the
    /// loop-induction pass to specialize `LoopIV` nodes.
    pub fn retag(&mut self, id: NodeId, kind: NodeKind) {
        self.node_mut(id).kind = kind;
    }

    // ------------------------------------------------------------------
    // compound factories
    // ------------------------------------------------------------------

    /// Phi merging `operands` at `region`. The phi is pinned onto the
    /// region's operand list, which is how merge regions enumerate their
    /// phis.
    pub fn phi(&mut self, region: NodeId, operands: &[NodeId]) -> GraphResult<NodeId> {
        let phi = self.new_node(NodeKind::Phi { region }, operands)?;
        self.add_operand(region, phi);
        Ok(phi)
    }

    /// A checkpoint materializing interpreter state at `pc`. Slots are
    /// added afterwards with [`Graph::add_stack_slot`].
    pub fn checkpoint(&mut self, pc: lavac_bc::Pc) -> GraphResult<NodeId> {
        self.new_node(NodeKind::Checkpoint { pc }, &[])
    }

    pub fn add_stack_slot(
        &mut self,
        checkpoint: NodeId,
        value: NodeId,
        index: u32,
    ) -> GraphResult<()> {
        let slot = self.new_node(NodeKind::StackSlot(index), &[value])?;
        self.add_operand(checkpoint, slot);
        Ok(())
    }

    /// Release the arena. Every outstanding id is invalidated; callers use
    /// this on compilation abort.
    pub fn reset(&mut self) {
        self.nodes.reset();
        self.start = None;
        self.end = None;
        self.osr_start = None;
        self.osr_end = None;
    }

    /// Arena statistics for diagnostics.
    pub fn arena_stats(&self) -> lavac_util::ArenaStats {
        self.nodes.stats()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::BinOp;

    #[test]
    fn ids_are_monotone() {
        let mut g = Graph::new();
        let a = g.float64(1.0).unwrap();
        let b = g.float64(2.0).unwrap();
        assert!(a.0 < b.0);
        assert_eq!(g.max_id(), 2);
    }

    #[test]
    fn edges_are_bidirectional() {
        let mut g = Graph::new();
        let a = g.float64(1.0).unwrap();
        let b = g.float64(2.0).unwrap();
        let add = g
            .new_node(NodeKind::Arithmetic(BinOp::Add), &[a, b])
            .unwrap();
        assert_eq!(g.node(add).operands(), &[a, b]);
        assert!(g
            .node(a)
            .refs()
            .iter()
            .any(|r| r.user == add && r.kind == RefKind::Operand && r.pos == 0));
        assert!(g
            .node(b)
            .refs()
            .iter()
            .any(|r| r.user == add && r.pos == 1));
    }

    #[test]
    fn replace_rewires_all_users() {
        let mut g = Graph::new();
        let a = g.float64(1.0).unwrap();
        let b = g.float64(2.0).unwrap();
        let u1 = g.new_node(NodeKind::Unary(crate::node::UnaryOp::Minus), &[a]).unwrap();
        let u2 = g
            .new_node(NodeKind::Arithmetic(BinOp::Add), &[a, a])
            .unwrap();
        g.replace(a, b);
        assert_eq!(g.node(u1).operands(), &[b]);
        assert_eq!(g.node(u2).operands(), &[b, b]);
        assert!(g.node(a).refs().is_empty());
        assert!(g.node(a).is_dead());
        assert_eq!(g.node(b).refs().len(), 3);
    }

    #[test]
    fn replace_operand_keeps_refs_consistent() {
        let mut g = Graph::new();
        let a = g.float64(1.0).unwrap();
        let b = g.float64(2.0).unwrap();
        let c = g.float64(3.0).unwrap();
        let add = g
            .new_node(NodeKind::Arithmetic(BinOp::Add), &[a, b])
            .unwrap();
        g.replace_operand(add, 1, c);
        assert_eq!(g.node(add).operands(), &[a, c]);
        assert!(g.node(b).refs().is_empty());
        assert!(g.node(c).refs().iter().any(|r| r.user == add && r.pos == 1));
    }

    #[test]
    fn effect_list_rejects_pure_nodes() {
        let mut g = Graph::new();
        let pure = g.float64(1.0).unwrap();
        let write = g.new_node(NodeKind::EmptyWriteEffect, &[]).unwrap();
        let obj = g.new_node(NodeKind::Object, &[]).unwrap();
        let key = g.string("k").unwrap();
        let get = g.new_node(NodeKind::PGet, &[obj, key]).unwrap();
        g.add_effect(get, pure);
        assert!(g.node(get).effects().is_empty());
        g.add_effect(get, write);
        assert_eq!(g.node(get).effects(), &[write]);
        assert!(g.node(get).has_side_effect());
        g.add_effect_if_not_exist(get, write);
        assert_eq!(g.node(get).effects().len(), 1);
    }

    #[test]
    fn side_effect_flag_is_sticky_through_operands() {
        let mut g = Graph::new();
        let call = g.nil().unwrap();
        let callee = g.new_node(NodeKind::Call, &[call]).unwrap();
        assert!(g.node(callee).has_side_effect());
        let user = g
            .new_node(NodeKind::Unary(crate::node::UnaryOp::Not), &[callee])
            .unwrap();
        assert!(g.node(user).has_side_effect());
    }

    #[test]
    fn anchors_initialize_once() {
        let mut g = Graph::new();
        let start = g.new_node(NodeKind::Start, &[]).unwrap();
        let end = g.new_node(NodeKind::End, &[]).unwrap();
        g.initialize(start, end).unwrap();
        assert!(matches!(
            g.initialize(start, end),
            Err(GraphError::AlreadyInitialized)
        ));
        assert_eq!(g.start(), start);
        assert_eq!(g.end(), end);
    }

    #[test]
    fn string_constants_split_on_sso_boundary() {
        let mut g = Graph::new();
        let small = g.string("short").unwrap();
        let long = g.string(&"x".repeat(40)).unwrap();
        assert!(matches!(g.kind(small), NodeKind::SStr(_)));
        assert!(matches!(g.kind(long), NodeKind::LStr(_)));
        assert_eq!(g.str_value(small), Some("short"));
    }
}
