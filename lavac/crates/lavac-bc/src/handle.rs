//! Opaque runtime handles.
//!
//! Three handle types cross the compiler/heap boundary: strings,
//! prototypes and scripts. The compiler inspects prototypes (for inlining)
//! and references interned strings; it never allocates heap objects or
//! mutates anything behind a handle.

use lavac_util::{define_idx, IndexVec};
use serde::{Deserialize, Serialize};

use crate::feedback::TypeFeedback;
use crate::opcode::BytecodeChunk;

/// Handle to an interned runtime string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StringHandle(pub u32);

define_idx!(PrototypeHandle);

impl Serialize for PrototypeHandle {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for PrototypeHandle {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        u32::deserialize(d).map(PrototypeHandle)
    }
}

/// Handle to a loaded script unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScriptHandle(pub u32);

/// One compiled-to-bytecode function as the runtime exposes it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Prototype {
    pub name: Option<String>,
    pub arg_count: u8,
    pub code: BytecodeChunk,
    pub feedback: TypeFeedback,
}

impl Prototype {
    /// Bytecode length, the unit the inliner budgets in.
    pub fn code_size(&self) -> usize {
        self.code.len()
    }
}

/// Read-only view of a script's prototypes.
///
/// The runtime hands this to a compilation; prototype handles inside
/// bytecode (`LoadCls`) index into it.
#[derive(Clone, Debug)]
pub struct Script {
    pub protos: IndexVec<PrototypeHandle, Prototype>,
    pub main: PrototypeHandle,
}

impl Script {
    /// Wrap a single function with no callees.
    pub fn single(proto: Prototype) -> Self {
        let mut protos = IndexVec::new();
        let main = protos.push(proto);
        Self { protos, main }
    }

    pub fn proto(&self, handle: PrototypeHandle) -> &Prototype {
        &self.protos[handle]
    }

    pub fn main(&self) -> &Prototype {
        &self.protos[self.main]
    }
}
