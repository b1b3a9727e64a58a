//! `checkcell analyze` command implementation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use checkcell::config::{CONFIG_FILE_NAME, DEFAULT_SHEET};
use checkcell::{
    Address, AnalysisConfig, AnalysisStatus, CancelFlag, MemoryHost, QuantileEntry, analyze,
    flag_sequence,
};
use clap::Args;
use colored::Colorize;

use super::display::{format_rank, print_list};

/// Arguments for `checkcell analyze`.
#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Workbook snapshot (JSONL)
    snapshot: PathBuf,

    /// Configuration file (defaults to ./checkcell.yaml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of bootstrap rounds
    #[arg(short, long)]
    rounds: Option<usize>,

    /// Significance threshold in (0, 1)
    #[arg(short, long)]
    significance: Option<f64>,

    /// Random seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Cells already confirmed correct (e.g. A3,Sheet2!B7)
    #[arg(short, long, value_delimiter = ',')]
    known_good: Vec<String>,

    /// Write the ranked scores as JSONL
    #[arg(long)]
    report: Option<PathBuf>,

    /// Number of ranked formulas to show
    #[arg(short, long, default_value = "10")]
    top: usize,

    /// Show every flag a reviewer would see, in order
    #[arg(short, long)]
    all: bool,
}

fn load_config(args: &AnalyzeArgs) -> anyhow::Result<AnalysisConfig> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AnalysisConfig::load_or_default(Path::new(CONFIG_FILE_NAME))
            .with_context(|| format!("failed to load {CONFIG_FILE_NAME}"))?,
    };
    if let Some(rounds) = args.rounds {
        config.rounds = rounds;
    }
    if let Some(significance) = args.significance {
        config.significance = significance;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    Ok(config)
}

/// Run the analyze command.
pub fn run(args: &AnalyzeArgs) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let known_good = args
        .known_good
        .iter()
        .map(|text| {
            Address::parse(text, DEFAULT_SHEET)
                .with_context(|| format!("invalid --known-good cell `{text}`"))
        })
        .collect::<anyhow::Result<BTreeSet<_>>>()?;

    let snapshot = super::load_snapshot(&args.snapshot)?;
    let mut host = MemoryHost::from_snapshot(&snapshot);
    let (report, graph) = analyze(&mut host, &config, &known_good, &CancelFlag::new())?;

    println!("{}", "CheckCell Analysis".cyan().bold());
    println!();
    println!(
        "  {}: {} formulas, {} inputs, {} ranges",
        "Graph".white().bold(),
        report.stats.formulas,
        report.stats.inputs,
        report.stats.ranges
    );
    println!(
        "  {}: {} (seed {})",
        "Rounds".white().bold(),
        report.rounds,
        report.seed
    );
    println!();

    if report.status == AnalysisStatus::NoEligibleInputs {
        println!("{}", "No perturbable inputs found; nothing to score.".yellow());
        return Ok(());
    }

    println!("  {}:", "Most sensitive formulas".white().bold());
    for entry in report.quantiles.descending().take(args.top) {
        let dominant = report
            .scores
            .iter()
            .find(|s| s.address == entry.address)
            .and_then(|s| s.record.dominant_input())
            .map(|(input, _)| graph.node(input).label())
            .unwrap_or_default();
        let marker = if report.flagged.as_ref() == Some(&entry.address) {
            "▶".red().bold().to_string()
        } else {
            "•".dimmed().to_string()
        };
        println!(
            "    {marker} {:<16} score {:>10.6}  rank {:>6}  {}",
            entry.address.to_string(),
            entry.score,
            format_rank(entry.rank),
            dominant.dimmed()
        );
    }
    println!();

    let significance = config.significance()?;
    match &report.flagged {
        Some(address) => println!(
            "{} {} (above {} significance)",
            "Flagged:".red().bold(),
            address.to_string().bold(),
            significance
        ),
        None => println!(
            "{}",
            format!("No formula ranks above {significance} significance.").green()
        ),
    }

    if args.all {
        println!();
        println!("  {}:", "Review order".white().bold());
        let sequence = flag_sequence(&report.quantiles, significance, &known_good);
        print_list(&sequence, "nothing to review");
    }

    if !report.parse_issues.is_empty() {
        println!();
        println!(
            "  {} ({} treated as inputs):",
            "Unparsed formulas".yellow().bold(),
            report.parse_issues.len()
        );
        print_list(&report.parse_issues, "");
    }

    if !report.round_errors.is_empty() {
        println!();
        println!(
            "  {} ({}):",
            "Evaluation errors".yellow().bold(),
            report.round_errors.len()
        );
        print_list(&report.round_errors, "");
    }

    if let Some(path) = &args.report {
        write_report(path, report.quantiles.entries())?;
        println!();
        println!("Report written to {}", path.display());
    }

    Ok(())
}

fn write_report(path: &Path, entries: &[QuantileEntry]) -> anyhow::Result<()> {
    checkcell_jsonl::write_jsonl(path, entries)
        .with_context(|| format!("failed to write report {}", path.display()))
}
