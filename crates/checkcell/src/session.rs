//! The analysis pipeline and the interactive review session around it.
//!
//! [`analyze`] runs one pass: read the workbook, build the graph, reject
//! cycles, bootstrap, rank, flag. [`Session`] keeps what a reviewer needs
//! between passes: the confirmed-good cells, the current flag and the last
//! report.

use std::collections::BTreeSet;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::bootstrap::{Bootstrap, CancelFlag, NodeScore, RoundError};
use crate::config::AnalysisConfig;
use crate::error::{Error, Result};
use crate::flagger::{Significance, flag_top_outlier};
use crate::graph::{DependencyGraph, GraphBuilder, GraphStats, ParseIssue};
use crate::host::HostEvaluator;
use crate::quantile::QuantileTable;

/// How an analysis ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisStatus {
    /// Scores were computed.
    Completed,
    /// Nothing in the workbook could be perturbed; there is nothing to rank.
    NoEligibleInputs,
}

/// Everything one analysis produced.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    /// How the analysis ended.
    pub status: AnalysisStatus,
    /// Ranked formula scores.
    pub quantiles: QuantileTable,
    /// The current top outlier, if any qualifies.
    pub flagged: Option<Address>,
    /// Per-formula statistics, in address order.
    pub scores: Vec<NodeScore>,
    /// Non-fatal failures during bootstrap.
    pub round_errors: Vec<RoundError>,
    /// Formulas treated as inputs because they did not parse.
    pub parse_issues: Vec<ParseIssue>,
    /// Rounds run.
    pub rounds: usize,
    /// Seed the random source was initialised with.
    pub seed: u64,
    /// Graph summary.
    pub stats: GraphStats,
}

/// Run one analysis of the workbook behind `host`.
///
/// Cells in `known_good` are never flagged. Returns the report together with
/// the graph it was computed on.
///
/// # Errors
///
/// - [`Error::InvalidSignificance`] or [`Error::Config`] before any work
/// - [`Error::GraphConstruction`] under the strict parse policy
/// - [`Error::CycleDetected`] if a formula depends on itself
/// - [`Error::Cancelled`] or [`Error::Host`] from the bootstrap
pub fn analyze<H: HostEvaluator + ?Sized>(
    host: &mut H,
    config: &AnalysisConfig,
    known_good: &BTreeSet<Address>,
    cancel: &CancelFlag,
) -> Result<(AnalysisReport, DependencyGraph)> {
    config.validate()?;
    let significance = config.significance()?;

    let snapshot = host.read_workbook()?;
    let mut graph = GraphBuilder::new(config.parse_policy).build(&snapshot)?;
    for address in config.frozen_cells()? {
        if !graph.freeze(&address) {
            warn!(%address, "Cell marked don't-perturb is not in the workbook");
        }
    }

    if let Some(cycle) = graph.cycle_labels() {
        return Err(Error::CycleDetected { cycle });
    }

    let seed = config.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    debug!(seed, rounds = config.rounds, "Starting bootstrap");
    let outcome = Bootstrap::new(&graph, config.bootstrap()).run(host, &mut rng, cancel)?;

    let status = if outcome.inputs == 0 {
        AnalysisStatus::NoEligibleInputs
    } else {
        AnalysisStatus::Completed
    };
    let quantiles = match status {
        AnalysisStatus::Completed => QuantileTable::compute(
            outcome
                .scores
                .iter()
                .map(|s| (s.address.clone(), s.score)),
        ),
        AnalysisStatus::NoEligibleInputs => QuantileTable::default(),
    };
    let flagged = flag_top_outlier(&quantiles, significance, known_good);

    info!(
        status = ?status,
        formulas = quantiles.len(),
        inputs = outcome.inputs,
        rounds = outcome.rounds,
        errors = outcome.errors.len(),
        flagged = %flagged.as_ref().map_or_else(|| "none".to_string(), ToString::to_string),
        "Analysis complete"
    );

    let report = AnalysisReport {
        status,
        quantiles,
        flagged,
        scores: outcome.scores,
        round_errors: outcome.errors,
        parse_issues: graph.parse_issues().to_vec(),
        rounds: outcome.rounds,
        seed,
        stats: graph.stats(),
    };
    Ok((report, graph))
}

/// An interactive review session.
///
/// ```no_run
/// # use checkcell::{AnalysisConfig, MemoryHost, Session, WorkbookSnapshot};
/// # fn main() -> checkcell::Result<()> {
/// # let mut host = MemoryHost::from_snapshot(&WorkbookSnapshot::new());
/// let mut session = Session::start(AnalysisConfig::default())?;
/// session.analyze(&mut host)?;
/// while let Some(cell) = session.flagged().cloned() {
///     // The reviewer inspects `cell` and finds it correct.
///     session.mark_good(cell)?;
/// }
/// let report = session.end();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Session {
    config: AnalysisConfig,
    significance: Significance,
    known_good: BTreeSet<Address>,
    flagged: Option<Address>,
    report: Option<AnalysisReport>,
    graph: Option<DependencyGraph>,
    cancel: CancelFlag,
}

impl Session {
    /// Start a session.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn start(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        let significance = config.significance()?;
        debug!(significance = significance.value(), "Session started");
        Ok(Self {
            config,
            significance,
            known_good: BTreeSet::new(),
            flagged: None,
            report: None,
            graph: None,
            cancel: CancelFlag::new(),
        })
    }

    /// Analyze the workbook behind `host`.
    ///
    /// Cells already marked good stay excluded. A cancellation requested
    /// before this call is cleared.
    ///
    /// # Errors
    ///
    /// See [`analyze`]. On error the previous report is kept.
    pub fn analyze<H: HostEvaluator + ?Sized>(&mut self, host: &mut H) -> Result<&AnalysisReport> {
        self.cancel.reset();
        let (report, graph) = analyze(host, &self.config, &self.known_good, &self.cancel)?;
        self.flagged.clone_from(&report.flagged);
        self.graph = Some(graph);
        Ok(self.report.insert(report))
    }

    /// Confirm `address` as correct and flag the next outlier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveAnalysis`] before the first analysis.
    pub fn mark_good(&mut self, address: Address) -> Result<Option<Address>> {
        let report = self.report.as_mut().ok_or(Error::NoActiveAnalysis)?;
        debug!(%address, "Marked good");
        self.known_good.insert(address);
        let next = flag_top_outlier(&report.quantiles, self.significance, &self.known_good);
        report.flagged.clone_from(&next);
        self.flagged.clone_from(&next);
        Ok(next)
    }

    /// The currently flagged cell.
    #[must_use]
    pub fn flagged(&self) -> Option<&Address> {
        self.flagged.as_ref()
    }

    /// Cells confirmed as correct.
    #[must_use]
    pub fn known_good(&self) -> &BTreeSet<Address> {
        &self.known_good
    }

    /// The last report.
    #[must_use]
    pub fn report(&self) -> Option<&AnalysisReport> {
        self.report.as_ref()
    }

    /// The graph of the last analysis.
    #[must_use]
    pub fn graph(&self) -> Option<&DependencyGraph> {
        self.graph.as_ref()
    }

    /// Session configuration.
    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Handle for cancelling a running analysis from another thread.
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Forget confirmations, the flag, and the last analysis.
    pub fn reset(&mut self) {
        self.known_good.clear();
        self.flagged = None;
        self.report = None;
        self.graph = None;
        debug!("Session reset");
    }

    /// End the session, returning the last report.
    #[must_use]
    pub fn end(self) -> Option<AnalysisReport> {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use crate::snapshot::WorkbookSnapshot;

    fn a(text: &str) -> Address {
        Address::parse(text, "Sheet1").unwrap()
    }

    fn quick() -> AnalysisConfig {
        AnalysisConfig {
            rounds: 5,
            seed: Some(1),
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn mark_good_requires_an_analysis() {
        let mut session = Session::start(quick()).unwrap();
        assert!(matches!(session.mark_good(a("A1")), Err(Error::NoActiveAnalysis)));
    }

    #[test]
    fn invalid_significance_is_rejected_at_start() {
        let config = AnalysisConfig {
            significance: 1.5,
            ..quick()
        };
        assert!(matches!(Session::start(config), Err(Error::InvalidSignificance(_))));
    }

    #[test]
    fn workbook_without_inputs_reports_no_eligible_inputs() {
        let snapshot = WorkbookSnapshot::new().with_formula(a("A1"), "=1+1");
        let mut host = MemoryHost::from_snapshot(&snapshot);
        let mut session = Session::start(quick()).unwrap();

        let report = session.analyze(&mut host).unwrap();
        assert_eq!(report.status, AnalysisStatus::NoEligibleInputs);
        assert!(report.quantiles.is_empty());
        assert!(session.flagged().is_none());
    }

    #[test]
    fn cycles_abort_analysis() {
        let snapshot = WorkbookSnapshot::new()
            .with_value(a("C1"), 1.0)
            .with_formula(a("A1"), "=B1+C1")
            .with_formula(a("B1"), "=A1");
        let mut host = MemoryHost::from_snapshot(&snapshot);
        let mut session = Session::start(quick()).unwrap();

        let err = session.analyze(&mut host).unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));
        assert!(session.report().is_none());
    }

    #[test]
    fn reset_clears_state() {
        let snapshot = WorkbookSnapshot::new()
            .with_value(a("A1"), 1.0)
            .with_formula(a("A2"), "=A1*2");
        let mut host = MemoryHost::from_snapshot(&snapshot);
        let mut session = Session::start(quick()).unwrap();
        session.analyze(&mut host).unwrap();
        session.mark_good(a("A2")).unwrap();

        session.reset();
        assert!(session.known_good().is_empty());
        assert!(session.report().is_none());
        assert!(session.graph().is_none());
        assert!(session.end().is_none());
    }
}
