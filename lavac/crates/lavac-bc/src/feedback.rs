//! Per-instruction type-trace sidecar.
//!
//! While interpreting, the runtime records the concrete type each operand
//! of a profiled instruction carried. The graph builder reads this back to
//! decide where speculative typed nodes plus their guards pay off.

use serde::{Deserialize, Serialize};

use crate::opcode::Pc;

/// A type the interpreter observed for a value at a profiled site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObservedType {
    Float64,
    SmallString,
    LongString,
    Boolean,
    Nil,
    List,
    Object,
    Closure,
    Iterator,
}

/// Observed operand types for the instructions of one function.
///
/// Sites with no entry were never profiled (or were polymorphic); the
/// builder treats those generically.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeFeedback {
    entries: Vec<(Pc, Vec<ObservedType>)>,
}

impl TypeFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the operand types observed at `pc`. A later record for the
    /// same pc replaces the earlier one (last trace wins).
    pub fn record(&mut self, pc: Pc, types: Vec<ObservedType>) {
        if let Some(entry) = self.entries.iter_mut().find(|(p, _)| *p == pc) {
            entry.1 = types;
        } else {
            self.entries.push((pc, types));
        }
    }

    /// Observed operand types at `pc`, if the site was profiled.
    pub fn at(&self, pc: Pc) -> Option<&[ObservedType]> {
        self.entries
            .iter()
            .find(|(p, _)| *p == pc)
            .map(|(_, t)| t.as_slice())
    }

    /// True when every operand at `pc` was observed as `ty`.
    pub fn all_observed(&self, pc: Pc, ty: ObservedType) -> bool {
        self.at(pc)
            .map(|types| !types.is_empty() && types.iter().all(|&t| t == ty))
            .unwrap_or(false)
    }
}
