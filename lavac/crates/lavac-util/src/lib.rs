//! lavac-util - Foundation types for the lavascript compiler.
//!
//! Everything here is infrastructure shared by the compiler crates: the
//! arena (zone) allocator that owns all HIR nodes of a compilation, typed
//! indices, dense bit-sets keyed by node ids, and the string interner that
//! backs string constants.

pub mod arena;
pub mod bitset;
pub mod error;
pub mod index_vec;
pub mod interner;

pub use arena::{Arena, ArenaStats};
pub use bitset::DenseBitSet;
pub use error::ArenaError;
pub use index_vec::{Idx, IndexVec};
pub use interner::{Interner, Sym};

// Re-export commonly used hash containers
pub use rustc_hash::FxHashMap;
pub use rustc_hash::FxHashSet;
