//! lavat - inspect the lavascript optimizer from the command line.
//!
//! Load a serialized bytecode unit, run it through the compilation
//! pipeline, and print either the optimized graph in dot form or a short
//! summary. Useful for debugging pass behavior on fixtures without a
//! full runtime.

mod unit;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lavac_drv::{Config, Pipeline};
use lavac_hir::printer::print_graph;
use tracing::info;
use tracing_subscriber::EnvFilter;

use unit::Unit;

#[derive(Parser)]
#[command(name = "lavat", version, about = "lavascript optimizer tool")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Optimize a unit and print the resulting graph
    Opt {
        /// Path to a JSON unit file
        unit: PathBuf,

        /// Write the dot graph here instead of stdout
        #[arg(long)]
        dot: Option<PathBuf>,

        /// Build an OSR entry graph at this bytecode position
        #[arg(long)]
        osr: Option<u32>,

        /// Print a node-count summary instead of the graph
        #[arg(long)]
        summary: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(p) => {
            let text = fs::read_to_string(p)
                .with_context(|| format!("reading config {}", p.display()))?;
            Ok(Config::from_toml(&text)?)
        }
        None => Ok(Config::default()),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Opt {
            unit,
            dot,
            osr,
            summary,
        } => {
            let text = fs::read_to_string(&unit)
                .with_context(|| format!("reading unit {}", unit.display()))?;
            let script = Unit::from_json(&text)?.into_script()?;
            let pipeline = Pipeline::new(config);
            let graph = match osr {
                Some(pc) => pipeline.compile_osr(&script, pc)?,
                None => pipeline.compile(&script)?,
            };
            info!(nodes = graph.max_id(), "compilation finished");

            if summary {
                let stats = graph.arena_stats();
                println!("nodes: {}", graph.max_id());
                println!("arena: {} bytes in {} chunks", stats.used_bytes, stats.chunk_count);
            } else {
                let rendered = print_graph(&graph);
                match dot {
                    Some(path) => fs::write(&path, rendered)
                        .with_context(|| format!("writing {}", path.display()))?,
                    None => print!("{rendered}"),
                }
            }
        }
    }
    Ok(())
}
