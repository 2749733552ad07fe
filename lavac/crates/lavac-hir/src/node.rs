//! The HIR node taxonomy.
//!
//! Every graph element is a [`Node`]: a kind tag with its payload, the
//! forward operand list, the effect (memory-order) list, and the backward
//! ref list recording every user. Kinds form a closed enumeration; all
//! dispatch is a `match` on [`NodeKind`], and the per-kind metadata
//! (mnemonic, leaf trait, effect trait, arity) drives generic traversals.

use lavac_bc::{Intrinsic, Pc, PrototypeHandle};
use lavac_util::{define_idx, Sym};

use crate::types::TypeKind;

define_idx!(NodeId);

impl NodeId {
    /// Placeholder for a link that is wired up later in construction
    /// (e.g. an `If` that has not met its merge region yet).
    pub const INVALID: NodeId = NodeId(u32::MAX);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

/// Unary operators of the polymorphic [`NodeKind::Unary`] node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Minus,
    Not,
}

impl UnaryOp {
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Minus => "minus",
            UnaryOp::Not => "not",
        }
    }
}

/// Binary operators shared by the polymorphic and the typed binary nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod | BinOp::Pow
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne
        )
    }

    pub fn is_logic(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }

    /// The comparison answering `!(x op c)`.
    pub fn negated_comparison(self) -> BinOp {
        match self {
            BinOp::Lt => BinOp::Ge,
            BinOp::Le => BinOp::Gt,
            BinOp::Gt => BinOp::Le,
            BinOp::Ge => BinOp::Lt,
            BinOp::Eq => BinOp::Ne,
            BinOp::Ne => BinOp::Eq,
            other => other,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Mod => "mod",
            BinOp::Pow => "pow",
            BinOp::Lt => "lt",
            BinOp::Le => "le",
            BinOp::Gt => "gt",
            BinOp::Ge => "ge",
            BinOp::Eq => "eq",
            BinOp::Ne => "ne",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }
}

impl From<lavac_bc::ArithOp> for BinOp {
    fn from(op: lavac_bc::ArithOp) -> Self {
        use lavac_bc::ArithOp::*;
        match op {
            Add => BinOp::Add,
            Sub => BinOp::Sub,
            Mul => BinOp::Mul,
            Div => BinOp::Div,
            Mod => BinOp::Mod,
            Pow => BinOp::Pow,
        }
    }
}

impl From<lavac_bc::CompOp> for BinOp {
    fn from(op: lavac_bc::CompOp) -> Self {
        use lavac_bc::CompOp::*;
        match op {
            Lt => BinOp::Lt,
            Le => BinOp::Le,
            Gt => BinOp::Gt,
            Ge => BinOp::Ge,
            Eq => BinOp::Eq,
            Ne => BinOp::Ne,
        }
    }
}

impl From<lavac_bc::LogicOp> for BinOp {
    fn from(op: lavac_bc::LogicOp) -> Self {
        match op {
            lavac_bc::LogicOp::And => BinOp::And,
            lavac_bc::LogicOp::Or => BinOp::Or,
        }
    }
}

/// The closed kind enumeration. Payloads hold everything that is not an
/// edge; node-to-node links live only in the operand/effect/control lists.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodeKind {
    // --- constants (leaves, no effect) ---
    Float64(f64),
    Int64(i64),
    LStr(Sym),
    SStr(Sym),
    Boolean(bool),
    Nil,

    // --- high level polymorphic ---
    List,
    ObjectKV,
    Object,
    Closure(PrototypeHandle),
    InitCls(PrototypeHandle),
    Arg(u32),
    Unary(UnaryOp),
    Arithmetic(BinOp),
    Compare(BinOp),
    Logical(BinOp),
    Ternary,
    UGet(u8),
    USet(u8),
    PGet,
    PSet,
    IGet,
    ISet,
    GGet,
    GSet,
    ItrNew,
    ItrNext,
    ItrTest,
    ItrDeref,
    Call,
    ICall(Intrinsic),
    Phi { region: NodeId },
    Projection(u32),
    OSRLoad(u32),
    /// Loop induction candidate; specialized by the loop-induction pass
    LoopIV { region: NodeId },
    LoopIVFloat64 { region: NodeId },
    LoopIVInt64 { region: NodeId },

    // --- checkpoints ---
    Checkpoint { pc: Pc },
    StackSlot(u32),

    // --- effect nodes ---
    LoopEffectPhi { region: NodeId },
    EffectPhi { region: NodeId },
    InitBarrier,
    EmptyWriteEffect,
    BranchStartEffect,

    // --- low level typed ---
    Float64Negate,
    Float64Arithmetic(BinOp),
    Float64Bitwise(BinOp),
    Float64Compare(BinOp),
    BooleanNot,
    BooleanLogic(BinOp),
    StringCompare(BinOp),
    SStringEq,
    SStringNe,
    ObjectFind,
    ObjectUpdate,
    ObjectInsert,
    ListIndex,
    ListInsert,
    ObjectRefGet,
    ObjectRefSet,
    ListRefGet,
    ListRefSet,

    // --- boxing / casts ---
    Box(TypeKind),
    Unbox(TypeKind),
    ConvBoolean,
    ConvNBoolean,

    // --- tests & guards ---
    TestType(TypeKind),
    Guard,

    // --- control flow ---
    Start,
    End,
    OSRStart,
    OSREnd,
    InlineStart,
    InlineEnd,
    LoopHeader { merge: NodeId },
    Loop,
    LoopExit,
    If { merge: NodeId },
    IfTrue,
    IfFalse,
    Jump,
    JumpValue,
    Region,
    Return,
    Success,
    Fail,
    Trap,
    CondTrap,
}

// the kind tag rides along every dispatch, keep it register-sized
static_assertions::const_assert!(std::mem::size_of::<NodeKind>() <= 16);

/// Declared operand count for a kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    pub fn admits(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Any => true,
        }
    }
}

impl NodeKind {
    /// Mnemonic used by the printer and debugging output.
    pub fn mnemonic(&self) -> &'static str {
        use NodeKind::*;
        match self {
            Float64(_) => "float64",
            Int64(_) => "int64",
            LStr(_) => "lstring",
            SStr(_) => "small_string",
            Boolean(_) => "boolean",
            Nil => "null",
            List => "list",
            ObjectKV => "object_kv",
            Object => "object",
            Closure(_) => "closure",
            InitCls(_) => "init_cls",
            Arg(_) => "arg",
            Unary(_) => "unary",
            Arithmetic(_) => "arithmetic",
            Compare(_) => "compare",
            Logical(_) => "logical",
            Ternary => "ternary",
            UGet(_) => "uget",
            USet(_) => "uset",
            PGet => "pget",
            PSet => "pset",
            IGet => "iget",
            ISet => "iset",
            GGet => "gget",
            GSet => "gset",
            ItrNew => "itr_new",
            ItrNext => "itr_next",
            ItrTest => "itr_test",
            ItrDeref => "itr_deref",
            Call => "call",
            ICall(_) => "icall",
            Phi { .. } => "phi",
            Projection(_) => "projection",
            OSRLoad(_) => "osr_load",
            LoopIV { .. } => "loop_iv",
            LoopIVFloat64 { .. } => "loop_iv_float64",
            LoopIVInt64 { .. } => "loop_iv_int64",
            Checkpoint { .. } => "checkpoint",
            StackSlot(_) => "stack_slot",
            LoopEffectPhi { .. } => "loop_effect_phi",
            EffectPhi { .. } => "effect_phi",
            InitBarrier => "init_barrier",
            EmptyWriteEffect => "empty_write_effect",
            BranchStartEffect => "branch_start_effect",
            Float64Negate => "float64_negate",
            Float64Arithmetic(_) => "float64_arithmetic",
            Float64Bitwise(_) => "float64_bitwise",
            Float64Compare(_) => "float64_compare",
            BooleanNot => "boolean_not",
            BooleanLogic(_) => "boolean_logic",
            StringCompare(_) => "string_compare",
            SStringEq => "sstring_eq",
            SStringNe => "sstring_ne",
            ObjectFind => "object_find",
            ObjectUpdate => "object_update",
            ObjectInsert => "object_insert",
            ListIndex => "list_index",
            ListInsert => "list_insert",
            ObjectRefGet => "object_ref_get",
            ObjectRefSet => "object_ref_set",
            ListRefGet => "list_ref_get",
            ListRefSet => "list_ref_set",
            Box(_) => "box",
            Unbox(_) => "unbox",
            ConvBoolean => "conv_boolean",
            ConvNBoolean => "conv_nboolean",
            TestType(_) => "test_type",
            Guard => "guard",
            Start => "start",
            End => "end",
            OSRStart => "osr_start",
            OSREnd => "osr_end",
            InlineStart => "inline_start",
            InlineEnd => "inline_end",
            LoopHeader { .. } => "loop_header",
            Loop => "loop",
            LoopExit => "loop_exit",
            If { .. } => "if",
            IfTrue => "if_true",
            IfFalse => "if_false",
            Jump => "jump",
            JumpValue => "jump_value",
            Region => "region",
            Return => "return",
            Success => "success",
            Fail => "fail",
            Trap => "trap",
            CondTrap => "cond_trap",
        }
    }

    /// Leaf nodes never have operands.
    pub fn is_leaf(&self) -> bool {
        use NodeKind::*;
        matches!(
            self,
            Float64(_)
                | Int64(_)
                | LStr(_)
                | SStr(_)
                | Boolean(_)
                | Nil
                | Closure(_)
                | Arg(_)
                | UGet(_)
                | OSRLoad(_)
                | InitBarrier
                | EmptyWriteEffect
                | Fail
        )
    }

    pub fn is_constant(&self) -> bool {
        use NodeKind::*;
        matches!(
            self,
            Float64(_) | Int64(_) | LStr(_) | SStr(_) | Boolean(_) | Nil
        )
    }

    pub fn is_string_constant(&self) -> bool {
        matches!(self, NodeKind::LStr(_) | NodeKind::SStr(_))
    }

    pub fn is_control(&self) -> bool {
        use NodeKind::*;
        matches!(
            self,
            Start
                | End
                | OSRStart
                | OSREnd
                | InlineStart
                | InlineEnd
                | LoopHeader { .. }
                | Loop
                | LoopExit
                | If { .. }
                | IfTrue
                | IfFalse
                | Jump
                | JumpValue
                | Region
                | Return
                | Success
                | Fail
                | Trap
                | CondTrap
        )
    }

    /// Nodes allowed inside effect lists: explicit effect placeholders and
    /// memory reads/writes whose order the list pins down.
    pub fn is_memory_effect(&self) -> bool {
        use NodeKind::*;
        matches!(
            self,
            LoopEffectPhi { .. }
                | EffectPhi { .. }
                | InitBarrier
                | EmptyWriteEffect
                | BranchStartEffect
                | PGet
                | PSet
                | IGet
                | ISet
                | GGet
                | GSet
                | USet(_)
                | ObjectFind
                | ObjectUpdate
                | ObjectInsert
                | ListIndex
                | ListInsert
                | ObjectRefGet
                | ObjectRefSet
                | ListRefGet
                | ListRefSet
                | Call
                | ICall(_)
                | ItrNew
                | ItrNext
                | ItrDeref
        )
    }

    /// Kinds that order against the heap no matter what their effect list
    /// holds. The sticky side-effect bit is seeded from this.
    pub fn has_inherent_side_effect(&self) -> bool {
        use NodeKind::*;
        matches!(self, Call | ICall(_))
    }

    pub fn is_phi_like(&self) -> bool {
        use NodeKind::*;
        matches!(
            self,
            Phi { .. }
                | EffectPhi { .. }
                | LoopEffectPhi { .. }
                | LoopIV { .. }
                | LoopIVFloat64 { .. }
                | LoopIVInt64 { .. }
        )
    }

    /// The region a phi-like node merges at.
    pub fn phi_region(&self) -> Option<NodeId> {
        use NodeKind::*;
        match *self {
            Phi { region }
            | EffectPhi { region }
            | LoopEffectPhi { region }
            | LoopIV { region }
            | LoopIVFloat64 { region }
            | LoopIVInt64 { region } => Some(region),
            _ => None,
        }
    }

    /// Declared operand count, enforced at construction.
    pub fn arity(&self) -> Arity {
        use NodeKind::*;
        match self {
            k if k.is_leaf() => Arity::Exact(0),
            Unary(_) | Float64Negate | BooleanNot | ConvBoolean | ConvNBoolean | TestType(_)
            | Box(_) | Unbox(_) | Projection(_) | ItrNew | ItrNext | ItrTest | ItrDeref
            | GGet | Return | JumpValue | LoopExit | If { .. } | StackSlot(_) | Trap => Arity::Exact(1),
            Arithmetic(_) | Compare(_) | Logical(_) | Float64Arithmetic(_) | Float64Bitwise(_)
            | Float64Compare(_) | BooleanLogic(_) | StringCompare(_) | SStringEq | SStringNe
            | ObjectKV | PGet | IGet | GSet | ObjectFind | ListIndex | ObjectRefGet
            | ListRefGet | Guard | CondTrap => Arity::Exact(2),
            Ternary | PSet | ISet | ObjectUpdate | ObjectInsert | ListInsert | ObjectRefSet
            | ListRefSet => Arity::Exact(3),
            USet(_) | InitCls(_) => Arity::Exact(1),
            Call => Arity::AtLeast(1),
            ICall(ic) => Arity::Exact(ic.arg_count() as usize),
            List | Object | Checkpoint { .. } | Phi { .. } | EffectPhi { .. }
            | LoopEffectPhi { .. } | LoopIV { .. } | LoopIVFloat64 { .. }
            | LoopIVInt64 { .. } => Arity::Any,
            // control nodes carry pinned statements in their operand list
            _ => Arity::Any,
        }
    }

    /// Structural equality for value numbering: payloads compare bitwise
    /// (NaN equals NaN, 0.0 differs from -0.0).
    pub fn gvn_eq(&self, other: &NodeKind) -> bool {
        use NodeKind::*;
        match (self, other) {
            (Float64(a), Float64(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }
}

/// A back-reference slot: which list of the user holds this node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefKind {
    Operand,
    Effect,
}

/// One entry of a node's ref list: `user.list[pos] == this`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ref {
    pub user: NodeId,
    pub kind: RefKind,
    pub pos: u32,
}

/// A single HIR element. All lists hold [`NodeId`]s into the owning
/// graph's arena; nothing here owns another node.
#[derive(Debug)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub(crate) operands: Vec<NodeId>,
    pub(crate) effects: Vec<NodeId>,
    pub(crate) refs: Vec<Ref>,
    /// Control predecessors (backward edges); control nodes only
    pub(crate) preds: Vec<NodeId>,
    /// Control successors (forward edges); control nodes only
    pub(crate) succs: Vec<NodeId>,
    pub(crate) side_effect: bool,
}

impl Node {
    pub(crate) fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            operands: Vec::new(),
            effects: Vec::new(),
            refs: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
            side_effect: kind.has_inherent_side_effect(),
        }
    }

    pub fn operands(&self) -> &[NodeId] {
        &self.operands
    }

    pub fn effects(&self) -> &[NodeId] {
        &self.effects
    }

    pub fn refs(&self) -> &[Ref] {
        &self.refs
    }

    pub fn preds(&self) -> &[NodeId] {
        &self.preds
    }

    pub fn succs(&self) -> &[NodeId] {
        &self.succs
    }

    pub fn has_side_effect(&self) -> bool {
        self.side_effect
    }

    /// Dead expression: nothing refers to it and it is not a control anchor.
    pub fn is_dead(&self) -> bool {
        self.refs.is_empty() && !self.kind.is_control()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_declarations() {
        assert!(NodeKind::Float64(1.0).arity().admits(0));
        assert!(!NodeKind::Float64(1.0).arity().admits(1));
        assert!(NodeKind::Arithmetic(BinOp::Add).arity().admits(2));
        assert!(!NodeKind::Arithmetic(BinOp::Add).arity().admits(3));
        assert!(NodeKind::Ternary.arity().admits(3));
        assert!(NodeKind::Phi { region: NodeId(0) }.arity().admits(7));
    }

    #[test]
    fn gvn_eq_is_bitwise_on_floats() {
        assert!(NodeKind::Float64(f64::NAN).gvn_eq(&NodeKind::Float64(f64::NAN)));
        assert!(!NodeKind::Float64(0.0).gvn_eq(&NodeKind::Float64(-0.0)));
        assert!(NodeKind::Boolean(true).gvn_eq(&NodeKind::Boolean(true)));
    }

    #[test]
    fn classification() {
        assert!(NodeKind::Start.is_control());
        assert!(!NodeKind::Phi { region: NodeId(0) }.is_control());
        assert!(NodeKind::PSet.is_memory_effect());
        assert!(!NodeKind::Float64Arithmetic(BinOp::Add).is_memory_effect());
        assert!(NodeKind::Boolean(true).is_leaf());
        assert!(NodeKind::Call.has_inherent_side_effect());
    }
}
