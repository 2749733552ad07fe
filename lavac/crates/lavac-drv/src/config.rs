//! Typed configuration.
//!
//! Options live in a flat dotted namespace with a fixed set of recognized
//! names (`gc.*`, `interpreter.*`, `compiler.*`). The struct is built
//! once, from defaults or a TOML document, and never mutated afterwards;
//! the compiler itself reads only the `compiler.*` subset.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown option: {0}")]
    UnknownOption(String),
}

/// Value of a single option, as surfaced by [`Config::lookup`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptionValue {
    Int64(i64),
    Int32(i32),
    Double(f64),
    Boolean(bool),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GcConfig {
    pub minimum_gap: i64,
    pub factor: f64,
    pub heap_init_capacity: i64,
    pub heap_capacity: i64,
    pub gcref_init_capacity: i64,
    pub gcref_capacity: i64,
    pub sso_init_slot: i64,
    pub sso_init_capacity: i64,
    pub sso_capacity: i64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            minimum_gap: 1 << 20,
            factor: 2.0,
            heap_init_capacity: 1 << 20,
            heap_capacity: 1 << 30,
            gcref_init_capacity: 1 << 10,
            gcref_capacity: 1 << 20,
            sso_init_slot: 256,
            sso_init_capacity: 1 << 16,
            sso_capacity: 1 << 24,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct InterpreterConfig {
    pub init_stack_size: i32,
    pub max_stack_size: i32,
    pub max_call_size: i32,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            init_stack_size: 1024,
            max_stack_size: 1 << 20,
            max_call_size: 256,
        }
    }
}

/// The subset the optimizer consumes: inliner budgets and pass control.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    pub max_inline_bytecode_per_func: usize,
    pub max_inline_bytecode_total: usize,
    pub max_inline_depth: usize,
    /// Pass names to run, in order. `None` means the canonical pipeline.
    pub passes: Option<Vec<String>>,
    /// Re-verify graph invariants after every pass
    pub debug_passes: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_inline_bytecode_per_func: lavac_bc::StaticInliner::DEFAULT_MAX_BYTECODE_PER_FUNC,
            max_inline_bytecode_total: lavac_bc::StaticInliner::DEFAULT_MAX_BYTECODE_TOTAL,
            max_inline_depth: lavac_bc::StaticInliner::DEFAULT_MAX_DEPTH,
            passes: None,
            debug_passes: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub gc: GcConfig,
    pub interpreter: InterpreterConfig,
    pub compiler: CompilerConfig,
}

impl Config {
    /// Parse from a TOML document. Unknown options are rejected.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Flat-namespace accessor over the recognized option names.
    pub fn lookup(&self, name: &str) -> Result<OptionValue, ConfigError> {
        use OptionValue::*;
        let v = match name {
            "gc.minimum_gap" => Int64(self.gc.minimum_gap),
            "gc.factor" => Double(self.gc.factor),
            "gc.heap_init_capacity" => Int64(self.gc.heap_init_capacity),
            "gc.heap_capacity" => Int64(self.gc.heap_capacity),
            "gc.gcref_init_capacity" => Int64(self.gc.gcref_init_capacity),
            "gc.gcref_capacity" => Int64(self.gc.gcref_capacity),
            "gc.sso_init_slot" => Int64(self.gc.sso_init_slot),
            "gc.sso_init_capacity" => Int64(self.gc.sso_init_capacity),
            "gc.sso_capacity" => Int64(self.gc.sso_capacity),
            "interpreter.init_stack_size" => Int32(self.interpreter.init_stack_size),
            "interpreter.max_stack_size" => Int32(self.interpreter.max_stack_size),
            "interpreter.max_call_size" => Int32(self.interpreter.max_call_size),
            "compiler.max_inline_bytecode_per_func" => {
                Int64(self.compiler.max_inline_bytecode_per_func as i64)
            }
            "compiler.max_inline_bytecode_total" => {
                Int64(self.compiler.max_inline_bytecode_total as i64)
            }
            "compiler.max_inline_depth" => Int64(self.compiler.max_inline_depth as i64),
            "compiler.debug_passes" => Boolean(self.compiler.debug_passes),
            other => return Err(ConfigError::UnknownOption(other.to_string())),
        };
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve() {
        let config = Config::default();
        assert_eq!(
            config.lookup("interpreter.max_call_size").unwrap(),
            OptionValue::Int32(256)
        );
        assert_eq!(
            config.lookup("gc.factor").unwrap(),
            OptionValue::Double(2.0)
        );
    }

    #[test]
    fn unknown_option_is_rejected() {
        let config = Config::default();
        assert!(matches!(
            config.lookup("gc.nope"),
            Err(ConfigError::UnknownOption(_))
        ));
    }

    #[test]
    fn toml_overrides() {
        let config = Config::from_toml(
            r#"
            [gc]
            minimum_gap = 4096

            [compiler]
            max_inline_depth = 4
            debug_passes = true
        "#,
        )
        .unwrap();
        assert_eq!(
            config.lookup("gc.minimum_gap").unwrap(),
            OptionValue::Int64(4096)
        );
        assert_eq!(config.compiler.max_inline_depth, 4);
        assert!(config.compiler.debug_passes);
        // untouched sections keep defaults
        assert_eq!(config.interpreter.init_stack_size, 1024);
    }

    #[test]
    fn unknown_toml_key_fails() {
        assert!(Config::from_toml("[gc]\nbogus = 1\n").is_err());
    }
}
