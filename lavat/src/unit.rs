//! On-disk unit format.
//!
//! A unit is the serialized form of what the runtime would hand the
//! compiler: every prototype of a script plus the index of the entry
//! function. JSON keeps the fixtures human-editable.

use anyhow::{bail, Context, Result};
use lavac_bc::{Prototype, PrototypeHandle, Script};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Unit {
    pub protos: Vec<Prototype>,
    #[serde(default)]
    pub main: u32,
}

impl Unit {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("malformed unit file")
    }

    pub fn into_script(self) -> Result<Script> {
        if self.protos.is_empty() {
            bail!("unit has no prototypes");
        }
        if self.main as usize >= self.protos.len() {
            bail!(
                "main index {} out of range ({} prototypes)",
                self.main,
                self.protos.len()
            );
        }
        let mut script = Script {
            protos: Default::default(),
            main: PrototypeHandle(self.main),
        };
        for p in self.protos {
            script.protos.push(p);
        }
        Ok(script)
    }
}
