//! lavac-bc - Bytecode surface of the lavascript compiler.
//!
//! The optimizer never parses source text; its sole input is the bytecode
//! stream the interpreter executes, plus the sidecars recorded around it:
//! the constant pool, the per-instruction type-trace feedback, and the
//! static analysis (block boundaries, liveness, loop nests) the graph
//! builder consumes. This crate defines those shapes together with the
//! opaque runtime handles that cross the heap boundary.

pub mod analysis;
pub mod feedback;
pub mod handle;
pub mod inliner;
pub mod intrinsic;
pub mod opcode;

pub use analysis::{AnalysisError, Block, BlockId, BytecodeAnalysis, LoopInfo, RegSet, Structure};
pub use feedback::{ObservedType, TypeFeedback};
pub use handle::{Prototype, PrototypeHandle, Script, ScriptHandle, StringHandle};
pub use inliner::{Inliner, NoInline, StaticInliner};
pub use intrinsic::Intrinsic;
pub use opcode::{
    ArithOp, BytecodeChunk, CompOp, ConstantPool, CpIndex, Instruction, LogicOp, Pc, Reg,
};
