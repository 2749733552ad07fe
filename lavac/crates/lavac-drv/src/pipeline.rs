//! The compilation pipeline.
//!
//! Builds the graph for a script unit and runs the optimization passes in
//! canonical order. A failing build is not an error of the driver: the
//! unit simply keeps running in the interpreter, so the failure is
//! reported as a bailout with its cause attached.

use indexmap::IndexMap;
use lavac_bc::{Pc, Script, StaticInliner};
use lavac_hir::pass::{
    Dce, GuardEliminate, Gvn, HirPass, Infer, LoopInduction, PassFlag, Simplify,
};
use lavac_hir::{BuildError, Graph, GraphBuilder};
use thiserror::Error;
use tracing::{debug, info_span};

use crate::config::Config;

type PassFactory = fn() -> Box<dyn HirPass>;

/// The known passes, in canonical pipeline order.
fn registry() -> IndexMap<&'static str, PassFactory> {
    let mut map: IndexMap<&'static str, PassFactory> = IndexMap::new();
    map.insert("simplify", || Box::new(Simplify));
    map.insert("gvn", || Box::new(Gvn));
    map.insert("infer", || Box::new(Infer));
    map.insert("dce", || Box::new(Dce));
    map.insert("guard-eliminate", || Box::new(GuardEliminate));
    map.insert("loop-induction", || Box::new(LoopInduction));
    map
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("compilation bailed out: {0}")]
    Bailout(#[from] BuildError),

    #[error("unknown pass requested: {0}")]
    UnknownPass(String),
}

pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn inliner(&self) -> StaticInliner {
        StaticInliner::new(
            self.config.compiler.max_inline_bytecode_per_func,
            self.config.compiler.max_inline_bytecode_total,
            self.config.compiler.max_inline_depth,
        )
    }

    fn passes(&self) -> Result<Vec<Box<dyn HirPass>>, CompileError> {
        let registry = registry();
        match &self.config.compiler.passes {
            Some(names) => names
                .iter()
                .map(|name| {
                    registry
                        .get(name.as_str())
                        .map(|factory| factory())
                        .ok_or_else(|| CompileError::UnknownPass(name.clone()))
                })
                .collect(),
            None => Ok(registry.values().map(|factory| factory()).collect()),
        }
    }

    fn optimize(&self, mut graph: Graph) -> Result<Graph, CompileError> {
        let flag = if self.config.compiler.debug_passes {
            PassFlag::Debug
        } else {
            PassFlag::Normal
        };
        for mut pass in self.passes()? {
            let span = info_span!("pass", name = pass.name());
            let _guard = span.enter();
            let changed = pass.perform(&mut graph, flag);
            debug!(changed, "pass finished");
        }
        Ok(graph)
    }

    /// Compile the script's main function.
    pub fn compile(&self, script: &Script) -> Result<Graph, CompileError> {
        let span = info_span!("compile");
        let _guard = span.enter();
        let mut inliner = self.inliner();
        let graph = GraphBuilder::new(script, &mut inliner).build()?;
        self.optimize(graph)
    }

    /// Compile an OSR entry into the main function at `osr_pc`.
    pub fn compile_osr(&self, script: &Script, osr_pc: Pc) -> Result<Graph, CompileError> {
        let span = info_span!("compile_osr", osr_pc);
        let _guard = span.enter();
        let mut inliner = self.inliner();
        let graph = GraphBuilder::new(script, &mut inliner).build_osr(osr_pc)?;
        self.optimize(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lavac_bc::{ArithOp, BytecodeChunk, ConstantPool, Instruction as I, Prototype};
    use lavac_hir::NodeKind;

    fn simple_script() -> Script {
        Script::single(Prototype {
            name: Some("main".into()),
            arg_count: 0,
            code: BytecodeChunk {
                code: vec![
                    I::LoadR { dst: 0, cp: 0 },
                    I::LoadR { dst: 1, cp: 1 },
                    I::Arith {
                        op: ArithOp::Add,
                        dst: 2,
                        lhs: 0,
                        rhs: 1,
                    },
                    I::Return { src: 2 },
                ],
                pool: ConstantPool {
                    reals: vec![1.0, 2.0],
                    strings: vec![],
                },
                register_count: 3,
            },
            feedback: Default::default(),
        })
    }

    #[test]
    fn compiles_and_optimizes() {
        let pipeline = Pipeline::new(Config::default());
        let graph = pipeline.compile(&simple_script()).unwrap();
        let ret = graph
            .node_ids()
            .find(|&id| matches!(graph.kind(id), NodeKind::Return))
            .unwrap();
        let v = graph.node(ret).operands()[0];
        assert!(graph.kind(v).gvn_eq(&NodeKind::Float64(3.0)));
    }

    #[test]
    fn pass_selection_from_config() {
        let mut config = Config::default();
        config.compiler.passes = Some(vec!["gvn".into(), "dce".into()]);
        let pipeline = Pipeline::new(config);
        assert!(pipeline.compile(&simple_script()).is_ok());

        let mut config = Config::default();
        config.compiler.passes = Some(vec!["no-such-pass".into()]);
        let pipeline = Pipeline::new(config);
        assert!(matches!(
            pipeline.compile(&simple_script()),
            Err(CompileError::UnknownPass(_))
        ));
    }

    #[test]
    fn unsupported_shape_bails_out() {
        // an infinite loop with no exit test is rejected by the analysis
        let script = Script::single(Prototype {
            name: None,
            arg_count: 0,
            code: BytecodeChunk {
                code: vec![I::LoadNil { dst: 0 }, I::Jump { target: 0 }],
                pool: ConstantPool::default(),
                register_count: 1,
            },
            feedback: Default::default(),
        });
        let pipeline = Pipeline::new(Config::default());
        assert!(matches!(
            pipeline.compile(&script),
            Err(CompileError::Bailout(_))
        ));
    }
}
