//! Static bytecode analysis.
//!
//! One pass over a chunk produces everything the graph builder needs to
//! know about shape before it simulates a single instruction: basic-block
//! boundaries with per-block successors, loop nests keyed by back edges,
//! per-pc live register sets, and the classification of each conditional
//! branch into an if/else diamond or a loop test.
//!
//! The analysis only accepts the reducible shapes the bytecode generator
//! emits; anything else is reported as [`AnalysisError::Unsupported`] and
//! the compilation bails out to the interpreter.

use lavac_util::{define_idx, Idx};
use thiserror::Error;

use crate::opcode::{BytecodeChunk, Instruction, Pc, Reg};

define_idx!(BlockId);

/// Analysis failure. Not a compiler bug: the chunk simply has a shape the
/// optimizer does not handle, and the interpreter keeps running it.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("unsupported control flow at pc {pc}: {reason}")]
    Unsupported { pc: Pc, reason: &'static str },
}

/// A set of interpreter registers.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct RegSet {
    bits: [u64; 4],
}

impl RegSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn insert(&mut self, reg: Reg) {
        self.bits[(reg / 64) as usize] |= 1u64 << (reg % 64);
    }

    #[inline]
    pub fn remove(&mut self, reg: Reg) {
        self.bits[(reg / 64) as usize] &= !(1u64 << (reg % 64));
    }

    #[inline]
    pub fn contains(&self, reg: Reg) -> bool {
        self.bits[(reg / 64) as usize] & (1u64 << (reg % 64)) != 0
    }

    pub fn union_with(&mut self, other: &RegSet) -> bool {
        let mut changed = false;
        for (w, o) in self.bits.iter_mut().zip(other.bits.iter()) {
            let next = *w | *o;
            changed |= next != *w;
            *w = next;
        }
        changed
    }

    pub fn iter(&self) -> impl Iterator<Item = Reg> + '_ {
        (0u16..256).filter(|&r| self.contains(r as Reg)).map(|r| r as Reg)
    }

    pub fn len(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&w| w == 0)
    }
}

impl std::fmt::Debug for RegSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Half-open range of instructions ending in a jump, return or fallthrough.
#[derive(Clone, Debug)]
pub struct Block {
    pub start: Pc,
    /// Exclusive end
    pub end: Pc,
    pub succs: Vec<BlockId>,
}

/// One natural loop discovered from a back edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopInfo {
    /// First pc of the condition evaluation
    pub head: Pc,
    /// The `JumpIfFalse` that exits the loop
    pub test: Pc,
    /// The backward `Jump` closing the loop
    pub back: Pc,
    /// First pc after the loop
    pub exit: Pc,
    /// Nesting depth, outermost loop is 1
    pub depth: u32,
}

/// Shape of a conditional branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Structure {
    /// `if` with or without an `else` arm; ranges are half-open
    If {
        test: Pc,
        then_range: (Pc, Pc),
        else_range: Option<(Pc, Pc)>,
        merge: Pc,
    },
    /// Loop exit test
    LoopTest { head: Pc },
}

/// The full sidecar for one chunk.
pub struct BytecodeAnalysis {
    blocks: Vec<Block>,
    /// Block owning each pc
    block_of: Vec<BlockId>,
    loops: Vec<LoopInfo>,
    /// Live registers on entry to each pc
    live_in: Vec<RegSet>,
}

impl BytecodeAnalysis {
    /// Analyze a chunk. Fails only on control flow the optimizer rejects.
    pub fn run(chunk: &BytecodeChunk) -> Result<Self, AnalysisError> {
        let loops = find_loops(chunk)?;
        let (blocks, block_of) = build_blocks(chunk);
        let live_in = liveness(chunk, &blocks, &block_of);
        Ok(Self {
            blocks,
            block_of,
            loops,
            live_in,
        })
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block_of(&self, pc: Pc) -> BlockId {
        self.block_of[pc as usize]
    }

    pub fn loops(&self) -> &[LoopInfo] {
        &self.loops
    }

    /// The loop whose condition evaluation starts at `pc`, if any.
    pub fn loop_at(&self, pc: Pc) -> Option<&LoopInfo> {
        self.loops.iter().find(|l| l.head == pc)
    }

    /// Live registers on entry to `pc`. Checkpoints snapshot exactly this.
    pub fn live_in(&self, pc: Pc) -> &RegSet {
        &self.live_in[pc as usize]
    }

    /// Classify the `JumpIfFalse` at `pc`.
    pub fn structure_at(&self, chunk: &BytecodeChunk, pc: Pc) -> Result<Structure, AnalysisError> {
        let target = match chunk.at(pc) {
            Instruction::JumpIfFalse { target, .. } => target,
            _ => {
                return Err(AnalysisError::Unsupported {
                    pc,
                    reason: "not a conditional branch",
                })
            }
        };
        if let Some(l) = self.loops.iter().find(|l| l.test == pc) {
            return Ok(Structure::LoopTest { head: l.head });
        }
        if target <= pc {
            return Err(AnalysisError::Unsupported {
                pc,
                reason: "backward conditional branch outside a loop",
            });
        }
        // An else arm exists when the then arm ends with a forward jump
        // over [target, merge).
        if target >= 1 {
            if let Instruction::Jump { target: merge } = chunk.at(target - 1) {
                if merge >= target {
                    return Ok(Structure::If {
                        test: pc,
                        then_range: (pc + 1, target - 1),
                        else_range: Some((target, merge)),
                        merge,
                    });
                }
            }
        }
        Ok(Structure::If {
            test: pc,
            then_range: (pc + 1, target),
            else_range: None,
            merge: target,
        })
    }
}

/// Discover natural loops from backward jumps and validate their shape.
fn find_loops(chunk: &BytecodeChunk) -> Result<Vec<LoopInfo>, AnalysisError> {
    let mut loops = Vec::new();
    for (pc, inst) in chunk.code.iter().enumerate() {
        let pc = pc as Pc;
        if let Instruction::Jump { target } = *inst {
            if target > pc {
                continue;
            }
            let head = target;
            // The exit test is the first conditional inside the loop that
            // branches past the back edge.
            let test = (head..pc)
                .find(|&p| {
                    matches!(chunk.at(p),
                        Instruction::JumpIfFalse { target: t, .. } if t > pc)
                })
                .ok_or(AnalysisError::Unsupported {
                    pc,
                    reason: "loop without an exit test",
                })?;
            let exit = match chunk.at(test) {
                Instruction::JumpIfFalse { target, .. } => target,
                _ => unreachable!(),
            };
            loops.push(LoopInfo {
                head,
                test,
                back: pc,
                exit,
                depth: 0,
            });
        }
    }
    // Nesting depth: number of enclosing loop bodies, plus one for itself.
    let spans: Vec<(Pc, Pc)> = loops.iter().map(|l| (l.head, l.back)).collect();
    for l in loops.iter_mut() {
        l.depth = spans
            .iter()
            .filter(|(h, b)| *h <= l.head && l.back <= *b)
            .count() as u32;
    }
    Ok(loops)
}

/// Split the chunk at leaders and record per-block successors.
fn build_blocks(chunk: &BytecodeChunk) -> (Vec<Block>, Vec<BlockId>) {
    let len = chunk.len() as Pc;
    let mut leader = vec![false; len as usize];
    if len > 0 {
        leader[0] = true;
    }
    for (pc, inst) in chunk.code.iter().enumerate() {
        match *inst {
            Instruction::Jump { target } | Instruction::JumpIfFalse { target, .. } => {
                if target < len {
                    leader[target as usize] = true;
                }
                if (pc as Pc) + 1 < len {
                    leader[pc + 1] = true;
                }
            }
            Instruction::Return { .. } | Instruction::ReturnNil => {
                if (pc as Pc) + 1 < len {
                    leader[pc + 1] = true;
                }
            }
            _ => {}
        }
    }

    let mut blocks: Vec<Block> = Vec::new();
    let mut block_of = vec![BlockId(0); len as usize];
    let mut start = 0 as Pc;
    for pc in 0..len {
        if pc > start && leader[pc as usize] {
            blocks.push(Block {
                start,
                end: pc,
                succs: Vec::new(),
            });
            start = pc;
        }
    }
    if len > 0 {
        blocks.push(Block {
            start,
            end: len,
            succs: Vec::new(),
        });
    }
    for (id, block) in blocks.iter().enumerate() {
        for pc in block.start..block.end {
            block_of[pc as usize] = BlockId(id as u32);
        }
    }
    for id in 0..blocks.len() {
        let last = blocks[id].end - 1;
        let mut succs = Vec::new();
        match chunk.at(last) {
            Instruction::Jump { target } => succs.push(block_of[target as usize]),
            Instruction::JumpIfFalse { target, .. } => {
                if blocks[id].end < len {
                    succs.push(block_of[blocks[id].end as usize]);
                }
                succs.push(block_of[target as usize]);
            }
            Instruction::Return { .. } | Instruction::ReturnNil => {}
            _ => {
                if blocks[id].end < len {
                    succs.push(block_of[blocks[id].end as usize]);
                }
            }
        }
        blocks[id].succs = succs;
    }
    (blocks, block_of)
}

/// Backward liveness to a fixed point at block granularity, then one more
/// backward walk to attach a live-in set to every pc.
fn liveness(chunk: &BytecodeChunk, blocks: &[Block], block_of: &[BlockId]) -> Vec<RegSet> {
    let _ = block_of;
    let mut live_in_block = vec![RegSet::new(); blocks.len()];
    let mut uses = Vec::new();

    let mut changed = true;
    while changed {
        changed = false;
        for (id, block) in blocks.iter().enumerate().rev() {
            let mut live = RegSet::new();
            for succ in &block.succs {
                live.union_with(&live_in_block[succ.index()]);
            }
            for pc in (block.start..block.end).rev() {
                let inst = chunk.at(pc);
                if let Some(def) = inst.def() {
                    live.remove(def);
                }
                inst.uses(&mut uses);
                for &r in &uses {
                    live.insert(r);
                }
            }
            // recomputation from empty only ever grows the set
            if live != live_in_block[id] {
                live_in_block[id] = live;
                changed = true;
            }
        }
    }

    let mut live_in = vec![RegSet::new(); chunk.len()];
    for (id, block) in blocks.iter().enumerate() {
        let mut live = RegSet::new();
        for succ in &block.succs {
            live.union_with(&live_in_block[succ.index()]);
        }
        for pc in (block.start..block.end).rev() {
            let inst = chunk.at(pc);
            if let Some(def) = inst.def() {
                live.remove(def);
            }
            inst.uses(&mut uses);
            for &r in &uses {
                live.insert(r);
            }
            live_in[pc as usize] = live;
        }
        debug_assert_eq!(live, live_in_block[id]);
    }
    live_in
}
