//! `checkcell cycles` command implementation.

use std::path::PathBuf;

use checkcell::GraphBuilder;
use clap::Args;
use colored::Colorize;

use super::display::format_cycle;

/// Arguments for `checkcell cycles`.
#[derive(Debug, Args)]
pub struct CyclesArgs {
    /// Workbook snapshot (JSONL)
    snapshot: PathBuf,
}

/// Run the cycles command.
pub fn run(args: &CyclesArgs) -> anyhow::Result<()> {
    let snapshot = super::load_snapshot(&args.snapshot)?;
    let graph = GraphBuilder::default().build(&snapshot)?;

    match graph.cycle_labels() {
        None => println!("{}", "No circular references detected.".green()),
        Some(cycle) => {
            println!("{}", "Found a circular reference:".red().bold());
            println!("    {}", format_cycle(&cycle).dimmed());
        }
    }

    Ok(())
}
