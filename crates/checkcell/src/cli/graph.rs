//! `checkcell graph` command implementation.

use std::path::PathBuf;

use checkcell::{GraphBuilder, ParsePolicy};
use clap::Args;
use colored::Colorize;

use super::display::print_list;

/// Arguments for `checkcell graph`.
#[derive(Debug, Args)]
pub struct GraphArgs {
    /// Workbook snapshot (JSONL)
    snapshot: PathBuf,

    /// Print Graphviz DOT instead of statistics
    #[arg(long)]
    dot: bool,

    /// Fail on the first unparseable formula
    #[arg(long)]
    strict: bool,
}

/// Run the graph command.
pub fn run(args: &GraphArgs) -> anyhow::Result<()> {
    let snapshot = super::load_snapshot(&args.snapshot)?;
    let policy = if args.strict {
        ParsePolicy::Strict
    } else {
        ParsePolicy::Downgrade
    };
    let graph = GraphBuilder::new(policy).build(&snapshot)?;

    if args.dot {
        print!("{}", graph.to_dot());
        return Ok(());
    }

    let stats = graph.stats();
    println!("{}", "Dependency Graph".cyan().bold());
    println!();
    println!("  {}: {}", "Cells".white().bold(), stats.cells.to_string().green());
    println!("    {}: {}", "formulas".dimmed(), stats.formulas);
    println!("    {}: {}", "inputs".dimmed(), stats.inputs);
    println!("  {}: {}", "Ranges".white().bold(), stats.ranges);
    println!("  {}: {}", "Edges".white().bold(), stats.edges);
    println!("  {}: {}", "Charts".white().bold(), stats.charts);
    println!();

    let label = |ids: Vec<checkcell::NodeId>| -> Vec<String> {
        ids.into_iter().map(|id| graph.node(id).label()).collect()
    };
    println!("  {}:", "Terminal formulas".white().bold());
    print_list(&label(graph.terminal_formula_nodes(false)), "none");
    println!("  {}:", "Perturbable inputs".white().bold());
    print_list(&label(graph.terminal_input_nodes()), "none");

    if !graph.parse_issues().is_empty() {
        println!("  {}:", "Unparsed formulas".yellow().bold());
        print_list(graph.parse_issues(), "");
    }

    Ok(())
}
