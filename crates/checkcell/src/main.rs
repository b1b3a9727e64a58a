//! CheckCell CLI - find suspicious spreadsheet formulas from the command line.
//!
//! Commands read a JSONL workbook snapshot and evaluate it with the in-memory
//! host.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod cli;

/// CheckCell: statistical localization of spreadsheet formula errors.
#[derive(Parser)]
#[command(name = "checkcell")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every formula and flag the most suspicious one
    Analyze(cli::analyze::AnalyzeArgs),

    /// Show dependency graph statistics or Graphviz output
    Graph(cli::graph::GraphArgs),

    /// Detect circular references
    Cycles(cli::cycles::CyclesArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Analyze(args) => cli::analyze::run(args),
        Commands::Graph(args) => cli::graph::run(args),
        Commands::Cycles(args) => cli::cycles::run(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            for cause in e.chain().skip(1) {
                eprintln!("  {}: {cause}", "caused by".dimmed());
            }
            ExitCode::FAILURE
        }
    }
}
