//! The type lattice and static type inference.
//!
//! Tags form a small closed set with exactly one subtyping edge pair: the
//! two string subkinds sit under `String`. Inference is a pure function
//! from node to tag, cached in a dense table sized by the graph's max id;
//! cycles through loop phis saturate to `Unknown`.

use lavac_bc::Intrinsic;
use lavac_util::DenseBitSet;

use crate::graph::Graph;
use crate::node::{NodeId, NodeKind};

/// Type tag of an HIR value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Float64,
    Int64,
    SmallString,
    LongString,
    /// Either string subkind
    String,
    Boolean,
    Nil,
    List,
    Object,
    Iterator,
    Closure,
    Unknown,
}

impl TypeKind {
    pub fn is_string(self) -> bool {
        matches!(
            self,
            TypeKind::String | TypeKind::SmallString | TypeKind::LongString
        )
    }

    /// Subtype check: the only non-reflexive containment is
    /// `String ⊇ {SmallString, LongString}`.
    pub fn contains(self, other: TypeKind) -> bool {
        self == other || (self == TypeKind::String && other.is_string())
    }

    /// Truthiness decidable from the tag alone: collections, strings,
    /// closures, iterators and numbers are truthy, nil is falsy. Boolean
    /// and Unknown need the value.
    pub fn to_boolean(self) -> Option<bool> {
        match self {
            TypeKind::Float64
            | TypeKind::Int64
            | TypeKind::SmallString
            | TypeKind::LongString
            | TypeKind::String
            | TypeKind::List
            | TypeKind::Object
            | TypeKind::Iterator
            | TypeKind::Closure => Some(true),
            TypeKind::Nil => Some(false),
            TypeKind::Boolean | TypeKind::Unknown => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeKind::Float64 => "float64",
            TypeKind::Int64 => "int64",
            TypeKind::SmallString => "small_string",
            TypeKind::LongString => "long_string",
            TypeKind::String => "string",
            TypeKind::Boolean => "boolean",
            TypeKind::Nil => "nil",
            TypeKind::List => "list",
            TypeKind::Object => "object",
            TypeKind::Iterator => "iterator",
            TypeKind::Closure => "closure",
            TypeKind::Unknown => "unknown",
        }
    }
}

impl From<lavac_bc::ObservedType> for TypeKind {
    fn from(t: lavac_bc::ObservedType) -> Self {
        use lavac_bc::ObservedType::*;
        match t {
            Float64 => TypeKind::Float64,
            SmallString => TypeKind::SmallString,
            LongString => TypeKind::LongString,
            Boolean => TypeKind::Boolean,
            Nil => TypeKind::Nil,
            List => TypeKind::List,
            Object => TypeKind::Object,
            Closure => TypeKind::Closure,
            Iterator => TypeKind::Iterator,
        }
    }
}

/// Return type of each intrinsic.
pub fn intrinsic_type(ic: Intrinsic) -> TypeKind {
    use Intrinsic::*;
    match ic {
        Min | Max | Sqrt | Sin | Cos | Tan | Abs | Ceil | Floor | LShift | RShift | LRo | RRo
        | BAnd | BOr | BXor | Int | Real | Len => TypeKind::Float64,
        String | Type => TypeKind::String,
        Boolean | Pop | Push | Set | Has | Update | Put | Delete | Clear | Empty => {
            TypeKind::Boolean
        }
        Iter => TypeKind::Iterator,
    }
}

/// Cached static type inference over one graph.
///
/// The cache is written on first query per node and, because inference is
/// pure, never invalidated within a pass; passes that rewrite nodes build
/// a fresh context.
pub struct TypeInference {
    cache: Vec<Option<TypeKind>>,
    in_progress: DenseBitSet,
}

impl TypeInference {
    pub fn new(graph: &Graph) -> Self {
        Self {
            cache: vec![None; graph.max_id()],
            in_progress: DenseBitSet::new(graph.max_id()),
        }
    }

    /// Infer the tag of `id`. Idempotent: a second call returns the cached
    /// tag without re-walking operands.
    pub fn type_of(&mut self, graph: &Graph, id: NodeId) -> TypeKind {
        let slot = id.0 as usize;
        if slot >= self.cache.len() {
            self.cache.resize(graph.max_id().max(slot + 1), None);
            self.in_progress.grow(graph.max_id().max(slot + 1));
        }
        if let Some(t) = self.cache[slot] {
            return t;
        }
        // a cycle re-entering this node saturates to Unknown
        if !self.in_progress.insert(slot) {
            return TypeKind::Unknown;
        }
        let t = self.compute(graph, id);
        self.in_progress.remove(slot);
        self.cache[slot] = Some(t);
        t
    }

    /// `(known, value)` boolean projection: decide truthiness of a node
    /// without computing it, when the tag or a boolean constant allows.
    pub fn boolean_value(&mut self, graph: &Graph, id: NodeId) -> Option<bool> {
        match self.type_of(graph, id) {
            TypeKind::Boolean => match graph.kind(id) {
                NodeKind::Boolean(v) => Some(v),
                _ => None,
            },
            TypeKind::Unknown => None,
            t => t.to_boolean(),
        }
    }

    fn compute(&mut self, graph: &Graph, id: NodeId) -> TypeKind {
        use NodeKind::*;
        match graph.kind(id) {
            Float64(_) | LoopIVFloat64 { .. } | Float64Negate | Float64Arithmetic(_)
            | Float64Bitwise(_) => TypeKind::Float64,
            Int64(_) | LoopIVInt64 { .. } => TypeKind::Int64,
            LStr(_) => TypeKind::LongString,
            SStr(_) => TypeKind::SmallString,
            Boolean(_) => TypeKind::Boolean,
            Nil => TypeKind::Nil,
            List => TypeKind::List,
            Object => TypeKind::Object,
            Closure(_) => TypeKind::Closure,
            ItrNew => TypeKind::Iterator,
            ItrTest | Float64Compare(_) | StringCompare(_) | SStringEq | SStringNe
            | BooleanLogic(_) | BooleanNot | ConvBoolean | ConvNBoolean => TypeKind::Boolean,
            ICall(ic) => intrinsic_type(ic),
            Box(t) | Unbox(t) => t,
            Guard => {
                let test = graph.node(id).operands()[0];
                match graph.kind(test) {
                    TestType(t) => t,
                    _ => TypeKind::Unknown,
                }
            }
            Phi { .. } => self.phi_type(graph, id),
            _ => TypeKind::Unknown,
        }
    }

    /// A phi's tag is the shared tag of its operands, or Unknown the
    /// moment they disagree or the walk re-enters the phi.
    fn phi_type(&mut self, graph: &Graph, id: NodeId) -> TypeKind {
        let operands: Vec<NodeId> = graph.node(id).operands().to_vec();
        let mut iter = operands.into_iter();
        let first = match iter.next() {
            Some(op) => op,
            None => return TypeKind::Unknown,
        };
        let tk = self.type_of(graph, first);
        if tk == TypeKind::Unknown {
            return TypeKind::Unknown;
        }
        for op in iter {
            if op == id {
                return TypeKind::Unknown;
            }
            if self.type_of(graph, op) != tk {
                return TypeKind::Unknown;
            }
        }
        tk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::BinOp;

    #[test]
    fn constants_resolve_by_construction() {
        let mut g = Graph::new();
        let f = g.float64(1.0).unwrap();
        let b = g.boolean(true).unwrap();
        let n = g.nil().unwrap();
        let s = g.string("abc").unwrap();
        let mut ti = TypeInference::new(&g);
        assert_eq!(ti.type_of(&g, f), TypeKind::Float64);
        assert_eq!(ti.type_of(&g, b), TypeKind::Boolean);
        assert_eq!(ti.type_of(&g, n), TypeKind::Nil);
        assert_eq!(ti.type_of(&g, s), TypeKind::SmallString);
    }

    #[test]
    fn inference_is_idempotent() {
        let mut g = Graph::new();
        let a = g.float64(1.0).unwrap();
        let b = g.float64(2.0).unwrap();
        let add = g
            .new_node(NodeKind::Float64Arithmetic(BinOp::Add), &[a, b])
            .unwrap();
        let mut ti = TypeInference::new(&g);
        let first = ti.type_of(&g, add);
        let second = ti.type_of(&g, add);
        assert_eq!(first, second);
        assert_eq!(first, TypeKind::Float64);
    }

    #[test]
    fn phi_of_same_types() {
        let mut g = Graph::new();
        let region = g.new_node(NodeKind::Region, &[]).unwrap();
        let a = g.float64(1.0).unwrap();
        let b = g.float64(2.0).unwrap();
        let phi = g.phi(region, &[a, b]).unwrap();
        let mut ti = TypeInference::new(&g);
        assert_eq!(ti.type_of(&g, phi), TypeKind::Float64);
    }

    #[test]
    fn phi_of_mixed_types_is_unknown() {
        let mut g = Graph::new();
        let region = g.new_node(NodeKind::Region, &[]).unwrap();
        let a = g.float64(1.0).unwrap();
        let b = g.boolean(true).unwrap();
        let phi = g.phi(region, &[a, b]).unwrap();
        let mut ti = TypeInference::new(&g);
        assert_eq!(ti.type_of(&g, phi), TypeKind::Unknown);
    }

    #[test]
    fn self_referential_phi_terminates() {
        let mut g = Graph::new();
        let region = g.new_node(NodeKind::Region, &[]).unwrap();
        let a = g.float64(1.0).unwrap();
        let phi = g.phi(region, &[a]).unwrap();
        g.add_operand(phi, phi);
        let mut ti = TypeInference::new(&g);
        assert_eq!(ti.type_of(&g, phi), TypeKind::Unknown);
    }

    #[test]
    fn guard_takes_test_type() {
        let mut g = Graph::new();
        let v = g.nil().unwrap();
        let test = g
            .new_node(NodeKind::TestType(TypeKind::Float64), &[v])
            .unwrap();
        let cp = g.checkpoint(0).unwrap();
        let guard = g.new_node(NodeKind::Guard, &[test, cp]).unwrap();
        let mut ti = TypeInference::new(&g);
        assert_eq!(ti.type_of(&g, guard), TypeKind::Float64);
    }

    #[test]
    fn boolean_projection() {
        let mut g = Graph::new();
        let f = g.float64(3.0).unwrap();
        let n = g.nil().unwrap();
        let t = g.boolean(true).unwrap();
        let list = g.new_node(NodeKind::List, &[]).unwrap();
        let mut ti = TypeInference::new(&g);
        assert_eq!(ti.boolean_value(&g, f), Some(true));
        assert_eq!(ti.boolean_value(&g, n), Some(false));
        assert_eq!(ti.boolean_value(&g, t), Some(true));
        assert_eq!(ti.boolean_value(&g, list), Some(true));
    }

    #[test]
    fn intrinsic_table() {
        assert_eq!(intrinsic_type(Intrinsic::Min), TypeKind::Float64);
        assert_eq!(intrinsic_type(Intrinsic::Type), TypeKind::String);
        assert_eq!(intrinsic_type(Intrinsic::Len), TypeKind::Float64);
        assert_eq!(intrinsic_type(Intrinsic::Iter), TypeKind::Iterator);
        assert_eq!(intrinsic_type(Intrinsic::Push), TypeKind::Boolean);
    }
}
