//! Bytecode to HIR graph construction.
//!
//! The builder simulates the interpreter's register file with an abstract
//! frame of node ids, one per register, and walks the bytecode in program
//! order. Every arithmetic/comparison/memory node is pushed through the
//! folders first and only the unfolded residue lands in the graph. Sites
//! with monomorphic type feedback are lowered speculatively: a
//! `TestType`+`Guard` pair protects a typed node, with a `Checkpoint`
//! capturing the live frame so a failing guard can resume in the
//! interpreter.
//!
//! Control flow is rebuilt structurally from the bytecode analysis:
//! if/else diamonds become `If`/`IfTrue`/`IfFalse` with a merge `Region`
//! and phis for every register that differs across the arms, loops become
//! `LoopHeader`/`Loop`/`LoopExit` with `LoopIV` placeholders for the
//! loop-carried registers. Known callees are spliced in between
//! `InlineStart`/`InlineEnd` when the policy accepts; an OSR build enters
//! at an arbitrary loop head through `OSRStart`/`OSRLoad`.

use lavac_bc::{
    AnalysisError, BytecodeAnalysis, Inliner, Instruction, Pc, Prototype, Reg, Script, Structure,
};
use lavac_util::FxHashSet;
use thiserror::Error;
use tracing::debug;

use crate::fold;
use crate::graph::{Graph, GraphError};
use crate::node::{BinOp, NodeId, NodeKind, UnaryOp};
use crate::types::{TypeInference, TypeKind};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("unsupported bytecode shape at pc {pc}: {reason}")]
    Unsupported { pc: Pc, reason: &'static str },
}

type BuildResult<T> = std::result::Result<T, BuildError>;

/// Per-function (frame) build state; a fresh one is pushed for every
/// inlined callee.
struct FuncCtx<'p> {
    proto: &'p Prototype,
    analysis: BytecodeAnalysis,
    regs: Vec<NodeId>,
    /// JumpValue nodes produced by returns of an inlined body
    inline_returns: Vec<NodeId>,
    is_inline: bool,
    /// Set once the current path ended in a return
    terminated: bool,
}

pub struct GraphBuilder<'a> {
    script: &'a Script,
    inliner: &'a mut dyn Inliner,
    graph: Graph,
    ti: TypeInference,
    /// Control node receiving pinned statements
    region: NodeId,
    /// Current memory state
    effect: NodeId,
    /// Top-level Return control nodes
    returns: Vec<NodeId>,
    /// Literals with no intervening write or escape; gets on these fold
    clean_literals: FxHashSet<NodeId>,
    depth: usize,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(script: &'a Script, inliner: &'a mut dyn Inliner) -> Self {
        let graph = Graph::new();
        let ti = TypeInference::new(&graph);
        Self {
            script,
            inliner,
            graph,
            ti,
            region: NodeId::INVALID,
            effect: NodeId::INVALID,
            returns: Vec::new(),
            clean_literals: FxHashSet::default(),
            depth: 0,
        }
    }

    /// Build the graph for the script's main prototype.
    pub fn build(mut self) -> BuildResult<Graph> {
        let proto = self.script.main();
        debug!(code_len = proto.code.len(), "building graph");
        let start = self.graph.new_node(NodeKind::Start, &[])?;
        let entry = self.graph.new_node(NodeKind::Region, &[])?;
        self.graph.link(start, entry);
        self.region = entry;
        self.effect = self.graph.new_node(NodeKind::InitBarrier, &[])?;

        let mut ctx = self.push_ctx(proto, None)?;
        self.build_range(&mut ctx, 0, proto.code.len() as Pc)?;
        let end = self.seal(NodeKind::End)?;
        self.graph.initialize(start, end)?;
        Ok(self.graph)
    }

    /// Build an alternate-entry graph starting at `osr_pc`. Every live
    /// interpreter register materializes through an `OSRLoad`.
    pub fn build_osr(mut self, osr_pc: Pc) -> BuildResult<Graph> {
        let proto = self.script.main();
        debug!(osr_pc, "building OSR graph");
        let start = self.graph.new_node(NodeKind::OSRStart, &[])?;
        let entry = self.graph.new_node(NodeKind::Region, &[])?;
        self.graph.link(start, entry);
        self.region = entry;
        // no write is known to precede an OSR entry
        self.effect = self.graph.new_node(NodeKind::EmptyWriteEffect, &[])?;

        let analysis = BytecodeAnalysis::run(&proto.code)?;
        let nil = self.graph.nil()?;
        let mut regs = vec![nil; proto.code.register_count as usize];
        for r in analysis.live_in(osr_pc).iter() {
            regs[r as usize] = self.graph.new_node(NodeKind::OSRLoad(r as u32), &[])?;
        }
        let mut ctx = FuncCtx {
            proto,
            analysis,
            regs,
            inline_returns: Vec::new(),
            is_inline: false,
            terminated: false,
        };
        self.build_range(&mut ctx, osr_pc, proto.code.len() as Pc)?;
        let end = self.seal(NodeKind::OSREnd)?;
        self.graph.initialize(start, end)?;
        let osr_start = start;
        self.graph.initialize_osr(osr_start, end);
        Ok(self.graph)
    }

    fn push_ctx<'p>(
        &mut self,
        proto: &'p Prototype,
        args: Option<Vec<NodeId>>,
    ) -> BuildResult<FuncCtx<'p>> {
        let analysis = BytecodeAnalysis::run(&proto.code)?;
        let nil = self.graph.nil()?;
        let mut regs = vec![nil; proto.code.register_count as usize];
        let is_inline = args.is_some();
        match args {
            Some(args) => {
                for (i, a) in args.into_iter().enumerate() {
                    regs[i] = a;
                }
            }
            None => {
                for i in 0..proto.arg_count {
                    regs[i as usize] = self.graph.new_node(NodeKind::Arg(i as u32), &[])?;
                }
            }
        }
        Ok(FuncCtx {
            proto,
            analysis,
            regs,
            inline_returns: Vec::new(),
            is_inline,
            terminated: false,
        })
    }

    /// Wire up Success/Fail and the terminator once the body is built.
    fn seal(&mut self, end_kind: NodeKind) -> BuildResult<NodeId> {
        let success = self.graph.new_node(NodeKind::Success, &[])?;
        let fail = self.graph.new_node(NodeKind::Fail, &[])?;
        let returns = std::mem::take(&mut self.returns);
        let mut values = Vec::new();
        for r in &returns {
            self.graph.link(*r, success);
            values.push(self.graph.node(*r).operands()[0]);
        }
        if values.len() > 1 {
            self.graph.phi(success, &values)?;
        }
        let end = self.graph.new_node(end_kind, &[])?;
        self.graph.link(success, end);
        self.graph.link(fail, end);
        Ok(end)
    }

    // ------------------------------------------------------------------
    // control structure
    // ------------------------------------------------------------------

    fn build_range(&mut self, ctx: &mut FuncCtx<'_>, from: Pc, to: Pc) -> BuildResult<()> {
        let mut pc = from;
        while pc < to {
            if ctx.terminated {
                break;
            }
            if let Some(&l) = ctx.analysis.loop_at(pc) {
                pc = self.build_loop(ctx, l)?;
                continue;
            }
            let inst = ctx.proto.code.at(pc);
            match inst {
                Instruction::JumpIfFalse { cond, .. } => {
                    let structure = ctx.analysis.structure_at(&ctx.proto.code, pc)?;
                    match structure {
                        Structure::If {
                            then_range,
                            else_range,
                            merge,
                            ..
                        } => {
                            let cond_value = ctx.regs[cond as usize];
                            self.build_if(ctx, cond_value, then_range, else_range, merge)?;
                            pc = merge;
                        }
                        Structure::LoopTest { .. } => {
                            return Err(BuildError::Unsupported {
                                pc,
                                reason: "loop test outside its loop",
                            })
                        }
                    }
                }
                Instruction::Jump { target } => {
                    return Err(BuildError::Unsupported {
                        pc,
                        reason: if target <= pc {
                            "stray back edge"
                        } else {
                            "stray forward jump"
                        },
                    })
                }
                _ => {
                    self.simulate(ctx, pc, inst)?;
                    pc += 1;
                }
            }
        }
        Ok(())
    }

    fn build_if(
        &mut self,
        ctx: &mut FuncCtx<'_>,
        cond: NodeId,
        then_range: (Pc, Pc),
        else_range: Option<(Pc, Pc)>,
        merge_pc: Pc,
    ) -> BuildResult<()> {
        let if_node = self.graph.new_node(
            NodeKind::If {
                merge: NodeId::INVALID,
            },
            &[cond],
        )?;
        self.graph.link(self.region, if_node);
        let if_true = self.graph.new_node(NodeKind::IfTrue, &[])?;
        let if_false = self.graph.new_node(NodeKind::IfFalse, &[])?;
        // order matters: IfTrue is successor 0, IfFalse successor 1
        self.graph.link(if_node, if_true);
        self.graph.link(if_node, if_false);

        let entry_regs = ctx.regs.clone();
        let entry_effect = self.effect;

        // then side
        self.region = if_true;
        let t_branch = self
            .graph
            .new_node(NodeKind::BranchStartEffect, &[entry_effect])?;
        self.effect = t_branch;
        self.build_range(ctx, then_range.0, then_range.1)?;
        let t_region = self.region;
        let t_regs = ctx.regs.clone();
        let t_effect = self.effect;
        let t_alive = !ctx.terminated;
        ctx.terminated = false;

        // else side
        ctx.regs = entry_regs.clone();
        self.region = if_false;
        let f_branch = self
            .graph
            .new_node(NodeKind::BranchStartEffect, &[entry_effect])?;
        self.effect = f_branch;
        if let Some((s, e)) = else_range {
            self.build_range(ctx, s, e)?;
        }
        let f_region = self.region;
        let f_regs = ctx.regs.clone();
        let f_effect = self.effect;
        let f_alive = !ctx.terminated;
        ctx.terminated = false;

        let merge = self.graph.new_node(NodeKind::Region, &[])?;
        self.graph.set_merge(if_node, merge);
        match (t_alive, f_alive) {
            (true, true) => {
                self.graph.link(t_region, merge);
                self.graph.link(f_region, merge);
                // one phi per live register that differs across the arms
                let live = ctx.analysis.live_in(merge_pc.min(ctx.proto.code.len() as Pc - 1));
                let mut merged = entry_regs;
                for r in live.iter() {
                    let tv = t_regs[r as usize];
                    let fv = f_regs[r as usize];
                    if tv == fv {
                        merged[r as usize] = tv;
                        continue;
                    }
                    let folded = fold::fold_phi(&mut self.graph, &mut self.ti, tv, fv, if_node)?;
                    merged[r as usize] = match folded {
                        Some(n) => n,
                        None => self.graph.phi(merge, &[tv, fv])?,
                    };
                }
                ctx.regs = merged;
                self.effect = if t_effect == f_effect {
                    t_effect
                } else {
                    let ephi = self
                        .graph
                        .new_node(NodeKind::EffectPhi { region: merge }, &[t_effect, f_effect])?;
                    self.graph.add_operand(merge, ephi);
                    ephi
                };
            }
            (true, false) => {
                self.graph.link(t_region, merge);
                ctx.regs = t_regs;
                self.effect = t_effect;
            }
            (false, true) => {
                self.graph.link(f_region, merge);
                ctx.regs = f_regs;
                self.effect = f_effect;
            }
            (false, false) => {
                ctx.terminated = true;
            }
        }
        self.region = merge;
        Ok(())
    }

    fn build_loop(&mut self, ctx: &mut FuncCtx<'_>, l: lavac_bc::LoopInfo) -> BuildResult<Pc> {
        debug!(head = l.head, depth = l.depth, "building loop");
        let header = self.graph.new_node(
            NodeKind::LoopHeader {
                merge: NodeId::INVALID,
            },
            &[],
        )?;
        self.graph.link(self.region, header);
        self.region = header;

        // loop-carried registers: live into the head and written anywhere
        // in the loop span
        let mut carried: Vec<Reg> = Vec::new();
        for r in ctx.analysis.live_in(l.head).iter() {
            let written = (l.head..=l.back).any(|pc| ctx.proto.code.at(pc).def() == Some(r));
            if written {
                carried.push(r);
            }
        }
        let mut ivs: Vec<(Reg, NodeId)> = Vec::new();
        for &r in &carried {
            let init = ctx.regs[r as usize];
            let iv = self
                .graph
                .new_node(NodeKind::LoopIV { region: header }, &[init])?;
            self.graph.add_operand(header, iv);
            ctx.regs[r as usize] = iv;
            ivs.push((r, iv));
        }

        let pre_effect = self.effect;
        let loop_ephi = self
            .graph
            .new_node(NodeKind::LoopEffectPhi { region: header }, &[pre_effect])?;
        self.graph.add_operand(header, loop_ephi);
        self.effect = loop_ephi;

        // the condition evaluates inside the header
        for pc in l.head..l.test {
            let inst = ctx.proto.code.at(pc);
            self.simulate(ctx, pc, inst)?;
        }
        let cond_reg = match ctx.proto.code.at(l.test) {
            Instruction::JumpIfFalse { cond, .. } => cond,
            _ => {
                return Err(BuildError::Unsupported {
                    pc: l.test,
                    reason: "loop test is not a conditional branch",
                })
            }
        };
        let cond = ctx.regs[cond_reg as usize];
        let mut header_regs = ctx.regs.clone();

        // body
        let body = self.graph.new_node(NodeKind::Loop, &[])?;
        self.graph.link(header, body);
        self.region = body;
        self.build_range(ctx, l.test + 1, l.back)?;
        if ctx.terminated {
            return Err(BuildError::Unsupported {
                pc: l.back,
                reason: "loop body cannot return on every path",
            });
        }
        self.graph.link(self.region, header);

        // close the loop-carried values
        for &(r, iv) in &ivs {
            let body_val = ctx.regs[r as usize];
            if body_val == iv {
                // never actually rebound in the body: unpin, then route
                // every remaining use straight to the init value
                let init = self.graph.node(iv).operands()[0];
                self.graph.remove_operand_value(header, iv);
                self.graph.replace(iv, init);
                header_regs[r as usize] = init;
            } else {
                self.graph.add_operand(iv, body_val);
            }
        }
        let body_effect = self.effect;
        if body_effect == loop_ephi {
            self.graph.remove_operand_value(header, loop_ephi);
            self.graph.replace(loop_ephi, pre_effect);
            self.effect = pre_effect;
        } else {
            self.graph.add_operand(loop_ephi, body_effect);
            self.effect = loop_ephi;
        }

        // exit: control leaves from the header when the condition fails
        let exit = self.graph.new_node(NodeKind::LoopExit, &[cond])?;
        self.graph.link(header, exit);
        self.graph.set_merge(header, exit);
        self.region = exit;
        ctx.regs = header_regs;
        Ok(l.exit)
    }

    // ------------------------------------------------------------------
    // speculation
    // ------------------------------------------------------------------

    /// Capture the live frame at `pc` into a checkpoint.
    fn checkpoint(&mut self, ctx: &FuncCtx<'_>, pc: Pc) -> BuildResult<NodeId> {
        let cp = self.graph.checkpoint(pc)?;
        for r in ctx.analysis.live_in(pc).iter() {
            self.graph.add_stack_slot(cp, ctx.regs[r as usize], r as u32)?;
        }
        Ok(cp)
    }

    /// Guard `value` to be of type `tk`, deoptimizing through a fresh
    /// checkpoint on failure. The guard node carries the proven value.
    fn speculate(
        &mut self,
        ctx: &FuncCtx<'_>,
        pc: Pc,
        value: NodeId,
        tk: TypeKind,
    ) -> BuildResult<NodeId> {
        // a value the typer already proves needs no guard
        if self.ti.type_of(&self.graph, value) == tk {
            return Ok(value);
        }
        let test = self.graph.new_node(NodeKind::TestType(tk), &[value])?;
        let cp = self.checkpoint(ctx, pc)?;
        let guard = self.graph.new_node(NodeKind::Guard, &[test, cp])?;
        self.graph.add_operand(self.region, guard);
        Ok(guard)
    }

    // ------------------------------------------------------------------
    // memory helpers
    // ------------------------------------------------------------------

    /// A write or call invalidates every literal-folding assumption.
    fn dirty_all_literals(&mut self) {
        self.clean_literals.clear();
    }

    /// Install a memory read: ordered after the current memory state and
    /// pinned to the region.
    fn install_read(&mut self, node: NodeId) {
        let effect = self.effect;
        self.graph.add_effect_if_not_exist(node, effect);
        self.graph.add_operand(self.region, node);
    }

    /// Install a memory write: like a read, but it becomes the new memory
    /// state.
    fn install_write(&mut self, node: NodeId) {
        self.install_read(node);
        self.effect = node;
        self.dirty_all_literals();
    }

    // ------------------------------------------------------------------
    // instruction simulation
    // ------------------------------------------------------------------

    fn simulate(&mut self, ctx: &mut FuncCtx<'_>, pc: Pc, inst: Instruction) -> BuildResult<()> {
        use Instruction::*;
        let g = &mut self.graph;
        match inst {
            LoadR { dst, cp } => {
                let v = ctx.proto.code.pool.real(cp);
                ctx.regs[dst as usize] = g.float64(v)?;
            }
            LoadS { dst, cp } => {
                let s = ctx.proto.code.pool.string(cp).to_string();
                ctx.regs[dst as usize] = g.string(&s)?;
            }
            LoadBool { dst, value } => ctx.regs[dst as usize] = g.boolean(value)?,
            LoadNil { dst } => ctx.regs[dst as usize] = g.nil()?,
            LoadCls { dst, proto } => {
                let handle = lavac_bc::PrototypeHandle(proto as u32);
                ctx.regs[dst as usize] = g.new_node(NodeKind::Closure(handle), &[])?;
            }
            Move { dst, src } => ctx.regs[dst as usize] = ctx.regs[src as usize],

            Negate { dst, src } => {
                let v = ctx.regs[src as usize];
                ctx.regs[dst as usize] = self.build_unary(ctx, pc, UnaryOp::Minus, v)?;
            }
            Not { dst, src } => {
                let v = ctx.regs[src as usize];
                ctx.regs[dst as usize] = self.build_unary(ctx, pc, UnaryOp::Not, v)?;
            }
            Arith { op, dst, lhs, rhs } => {
                let l = ctx.regs[lhs as usize];
                let r = ctx.regs[rhs as usize];
                ctx.regs[dst as usize] = self.build_binary(ctx, pc, op.into(), l, r)?;
            }
            Comp { op, dst, lhs, rhs } => {
                let l = ctx.regs[lhs as usize];
                let r = ctx.regs[rhs as usize];
                ctx.regs[dst as usize] = self.build_binary(ctx, pc, op.into(), l, r)?;
            }
            Logic { op, dst, lhs, rhs } => {
                let l = ctx.regs[lhs as usize];
                let r = ctx.regs[rhs as usize];
                let folded = fold::fold_binary(&mut self.graph, &mut self.ti, op.into(), l, r)?;
                ctx.regs[dst as usize] = match folded {
                    Some(n) => n,
                    None => self
                        .graph
                        .new_node(NodeKind::Logical(op.into()), &[l, r])?,
                };
            }
            Select { dst, cond, lhs, rhs } => {
                let c = ctx.regs[cond as usize];
                let l = ctx.regs[lhs as usize];
                let r = ctx.regs[rhs as usize];
                let folded = fold::fold_ternary(&mut self.graph, &mut self.ti, c, l, r)?;
                ctx.regs[dst as usize] = match folded {
                    Some(n) => n,
                    None => self.graph.new_node(NodeKind::Ternary, &[c, l, r])?,
                };
            }

            NewList { dst, base, count } => {
                let elems: Vec<NodeId> = (base..base + count)
                    .map(|r| ctx.regs[r as usize])
                    .collect();
                let list = g.new_node(NodeKind::List, &elems)?;
                self.clean_literals.insert(list);
                ctx.regs[dst as usize] = list;
            }
            NewObject { dst, base, count } => {
                let mut kvs = Vec::new();
                for i in 0..count {
                    let k = ctx.regs[(base + 2 * i) as usize];
                    let v = ctx.regs[(base + 2 * i + 1) as usize];
                    kvs.push(g.new_node(NodeKind::ObjectKV, &[k, v])?);
                }
                let obj = g.new_node(NodeKind::Object, &kvs)?;
                self.clean_literals.insert(obj);
                ctx.regs[dst as usize] = obj;
            }

            PGet { dst, obj, key } => {
                let o = ctx.regs[obj as usize];
                let key = ctx.proto.code.pool.string(key).to_string();
                let k = self.graph.string(&key)?;
                ctx.regs[dst as usize] = self.build_prop_get(o, k)?;
            }
            PSet { obj, key, src } => {
                let o = ctx.regs[obj as usize];
                let key = ctx.proto.code.pool.string(key).to_string();
                let k = self.graph.string(&key)?;
                let v = ctx.regs[src as usize];
                self.build_prop_set(o, k, v)?;
            }
            IGet { dst, obj, idx } => {
                let o = ctx.regs[obj as usize];
                let i = ctx.regs[idx as usize];
                ctx.regs[dst as usize] = self.build_index_get(o, i)?;
            }
            ISet { obj, idx, src } => {
                let o = ctx.regs[obj as usize];
                let i = ctx.regs[idx as usize];
                let v = ctx.regs[src as usize];
                self.build_index_set(o, i, v)?;
            }
            GGet { dst, key } => {
                let key = ctx.proto.code.pool.string(key).to_string();
                let k = self.graph.string(&key)?;
                let node = self.graph.new_node(NodeKind::GGet, &[k])?;
                self.install_read(node);
                ctx.regs[dst as usize] = node;
            }
            GSet { key, src } => {
                let key = ctx.proto.code.pool.string(key).to_string();
                let k = self.graph.string(&key)?;
                let v = ctx.regs[src as usize];
                let node = self.graph.new_node(NodeKind::GSet, &[k, v])?;
                self.install_write(node);
            }
            UGet { dst, up } => {
                ctx.regs[dst as usize] = g.new_node(NodeKind::UGet(up), &[])?;
            }
            USet { up, src } => {
                let v = ctx.regs[src as usize];
                let node = self.graph.new_node(NodeKind::USet(up), &[v])?;
                self.install_write(node);
            }

            ItrNew { dst, src } => {
                let v = ctx.regs[src as usize];
                let node = self.graph.new_node(NodeKind::ItrNew, &[v])?;
                self.install_read(node);
                ctx.regs[dst as usize] = node;
            }
            ItrTest { dst, itr } => {
                let v = ctx.regs[itr as usize];
                ctx.regs[dst as usize] = self.graph.new_node(NodeKind::ItrTest, &[v])?;
            }
            ItrNext { itr } => {
                let v = ctx.regs[itr as usize];
                let node = self.graph.new_node(NodeKind::ItrNext, &[v])?;
                self.install_write(node);
                ctx.regs[itr as usize] = node;
            }
            ItrDeref { key, val, itr } => {
                let v = ctx.regs[itr as usize];
                // dereferencing a spent iterator deoptimizes instead of
                // reading garbage
                let test = self.graph.new_node(NodeKind::ItrTest, &[v])?;
                let cp = self.checkpoint(ctx, pc)?;
                let trap = self.graph.new_node(NodeKind::CondTrap, &[test, cp])?;
                self.graph.add_operand(self.region, trap);
                let deref = self.graph.new_node(NodeKind::ItrDeref, &[v])?;
                self.install_read(deref);
                ctx.regs[key as usize] = self.graph.new_node(NodeKind::Projection(0), &[deref])?;
                ctx.regs[val as usize] = self.graph.new_node(NodeKind::Projection(1), &[deref])?;
            }

            Call {
                dst,
                callee,
                base,
                argc,
            } => {
                let callee_node = ctx.regs[callee as usize];
                let args: Vec<NodeId> = (base..base + argc)
                    .map(|r| ctx.regs[r as usize])
                    .collect();
                ctx.regs[dst as usize] = self.build_call(ctx, pc, callee_node, args)?;
            }
            ICall {
                dst,
                intrinsic,
                base,
                argc,
            } => {
                let args: Vec<NodeId> = (base..base + argc)
                    .map(|r| ctx.regs[r as usize])
                    .collect();
                let folded = fold::fold_intrinsic(&mut self.graph, intrinsic, &args)?;
                ctx.regs[dst as usize] = match folded {
                    Some(n) => n,
                    None => {
                        let node = self.graph.new_node(NodeKind::ICall(intrinsic), &args)?;
                        self.install_write(node);
                        node
                    }
                };
            }

            Return { src } => {
                let v = ctx.regs[src as usize];
                self.build_return(ctx, v)?;
            }
            ReturnNil => {
                let v = self.graph.nil()?;
                self.build_return(ctx, v)?;
            }

            Jump { .. } | JumpIfFalse { .. } => {
                return Err(BuildError::Unsupported {
                    pc,
                    reason: "control instruction reached the simulator",
                })
            }
        }
        Ok(())
    }

    fn build_return(&mut self, ctx: &mut FuncCtx<'_>, value: NodeId) -> BuildResult<()> {
        if ctx.is_inline {
            let jv = self.graph.new_node(NodeKind::JumpValue, &[value])?;
            self.graph.link(self.region, jv);
            ctx.inline_returns.push(jv);
        } else {
            let ret = self.graph.new_node(NodeKind::Return, &[value])?;
            self.graph.link(self.region, ret);
            self.returns.push(ret);
        }
        ctx.terminated = true;
        Ok(())
    }

    fn build_unary(
        &mut self,
        ctx: &FuncCtx<'_>,
        pc: Pc,
        op: UnaryOp,
        value: NodeId,
    ) -> BuildResult<NodeId> {
        if let Some(n) = fold::fold_unary(&mut self.graph, &mut self.ti, op, value)? {
            return Ok(n);
        }
        if op == UnaryOp::Minus
            && ctx
                .proto
                .feedback
                .all_observed(pc, lavac_bc::ObservedType::Float64)
        {
            let guarded = self.speculate(ctx, pc, value, TypeKind::Float64)?;
            let unboxed = fold::new_unbox(&mut self.graph, guarded, TypeKind::Float64)?;
            let neg = self.graph.new_node(NodeKind::Float64Negate, &[unboxed])?;
            return Ok(fold::new_box(&mut self.graph, neg, TypeKind::Float64)?);
        }
        Ok(self.graph.new_node(NodeKind::Unary(op), &[value])?)
    }

    fn build_binary(
        &mut self,
        ctx: &FuncCtx<'_>,
        pc: Pc,
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
    ) -> BuildResult<NodeId> {
        if let Some(n) = fold::fold_binary(&mut self.graph, &mut self.ti, op, lhs, rhs)? {
            return Ok(n);
        }
        let float_feedback = ctx
            .proto
            .feedback
            .all_observed(pc, lavac_bc::ObservedType::Float64);
        if float_feedback && (op.is_arithmetic() || op.is_comparison()) {
            let gl = self.speculate(ctx, pc, lhs, TypeKind::Float64)?;
            let gr = self.speculate(ctx, pc, rhs, TypeKind::Float64)?;
            let ul = fold::new_unbox(&mut self.graph, gl, TypeKind::Float64)?;
            let ur = fold::new_unbox(&mut self.graph, gr, TypeKind::Float64)?;
            let (kind, tk) = if op.is_arithmetic() {
                (NodeKind::Float64Arithmetic(op), TypeKind::Float64)
            } else {
                (NodeKind::Float64Compare(op), TypeKind::Boolean)
            };
            let typed = self.graph.new_node(kind, &[ul, ur])?;
            return Ok(fold::new_box(&mut self.graph, typed, tk)?);
        }
        // small-string equality has a dedicated typed form
        if (op == BinOp::Eq || op == BinOp::Ne)
            && ctx
                .proto
                .feedback
                .all_observed(pc, lavac_bc::ObservedType::SmallString)
        {
            let gl = self.speculate(ctx, pc, lhs, TypeKind::SmallString)?;
            let gr = self.speculate(ctx, pc, rhs, TypeKind::SmallString)?;
            let kind = if op == BinOp::Eq {
                NodeKind::SStringEq
            } else {
                NodeKind::SStringNe
            };
            let typed = self.graph.new_node(kind, &[gl, gr])?;
            return Ok(fold::new_box(&mut self.graph, typed, TypeKind::Boolean)?);
        }
        let kind = if op.is_arithmetic() {
            NodeKind::Arithmetic(op)
        } else if op.is_comparison() {
            NodeKind::Compare(op)
        } else {
            NodeKind::Logical(op)
        };
        Ok(self.graph.new_node(kind, &[lhs, rhs])?)
    }

    fn build_prop_get(&mut self, obj: NodeId, key: NodeId) -> BuildResult<NodeId> {
        if self.clean_literals.contains(&obj) {
            if let Some(v) = fold::fold_prop_get(&self.graph, obj, key) {
                return Ok(v);
            }
        }
        let node = self.graph.new_node(NodeKind::PGet, &[obj, key])?;
        self.install_read(node);
        Ok(node)
    }

    fn build_prop_set(&mut self, obj: NodeId, key: NodeId, value: NodeId) -> BuildResult<()> {
        if self.clean_literals.contains(&obj)
            && fold::fold_prop_set(&mut self.graph, obj, key, value)?
        {
            return Ok(());
        }
        let node = self.graph.new_node(NodeKind::PSet, &[obj, key, value])?;
        self.install_write(node);
        Ok(())
    }

    fn build_index_get(&mut self, obj: NodeId, idx: NodeId) -> BuildResult<NodeId> {
        if self.clean_literals.contains(&obj) {
            if let Some(v) = fold::fold_index_get(&self.graph, obj, idx) {
                return Ok(v);
            }
        }
        let node = self.graph.new_node(NodeKind::IGet, &[obj, idx])?;
        self.install_read(node);
        Ok(node)
    }

    fn build_index_set(&mut self, obj: NodeId, idx: NodeId, value: NodeId) -> BuildResult<()> {
        if self.clean_literals.contains(&obj)
            && fold::fold_index_set(&mut self.graph, obj, idx, value)?
        {
            return Ok(());
        }
        let node = self.graph.new_node(NodeKind::ISet, &[obj, idx, value])?;
        self.install_write(node);
        Ok(())
    }

    fn build_call(
        &mut self,
        ctx: &FuncCtx<'_>,
        pc: Pc,
        callee: NodeId,
        args: Vec<NodeId>,
    ) -> BuildResult<NodeId> {
        if let NodeKind::Closure(handle) = self.graph.kind(callee) {
            if (handle.0 as usize) < self.script.protos.len() {
                let proto = self.script.proto(handle);
                if self.inliner.should_inline(self.depth + 1, proto) {
                    return self.build_inline(proto, args);
                }
            }
        }
        let mut operands = vec![callee];
        operands.extend(args);
        let node = self.graph.new_node(NodeKind::Call, &operands)?;
        self.install_write(node);
        let _ = pc;
        Ok(node)
    }

    /// Splice a known callee's body into the graph between
    /// `InlineStart`/`InlineEnd`; its returns become `JumpValue` nodes
    /// merging at the end.
    fn build_inline(&mut self, proto: &Prototype, args: Vec<NodeId>) -> BuildResult<NodeId> {
        debug!(callee = ?proto.name, depth = self.depth + 1, "inlining call");
        let inline_start = self.graph.new_node(NodeKind::InlineStart, &[])?;
        self.graph.link(self.region, inline_start);
        self.region = inline_start;
        self.depth += 1;

        let mut callee_ctx = self.push_ctx(proto, Some(args))?;
        self.build_range(&mut callee_ctx, 0, proto.code.len() as Pc)?;
        if !callee_ctx.terminated {
            // fell off the end: an implicit nil return
            let nil = self.graph.nil()?;
            let jv = self.graph.new_node(NodeKind::JumpValue, &[nil])?;
            self.graph.link(self.region, jv);
            callee_ctx.inline_returns.push(jv);
        }

        let inline_end = self.graph.new_node(NodeKind::InlineEnd, &[])?;
        let mut values = Vec::new();
        for jv in &callee_ctx.inline_returns {
            self.graph.link(*jv, inline_end);
            values.push(self.graph.node(*jv).operands()[0]);
        }
        self.depth -= 1;
        self.region = inline_end;
        if values.len() == 1 {
            Ok(values[0])
        } else {
            Ok(self.graph.phi(inline_end, &values)?)
        }
    }
}
