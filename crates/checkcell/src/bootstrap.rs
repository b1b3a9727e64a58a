//! The bootstrap engine: randomized perturbation rounds against a host.
//!
//! Each round perturbs the eligible inputs one at a time. For every input the
//! engine writes perturbed values, lets the host recalculate, reads the scored
//! formulas that depend on the input, then restores the original values.
//! Attributing each change to a single input keeps per-input sensitivities
//! separable.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::address::Address;
use crate::error::{Error, Result};
use crate::graph::{DependencyGraph, NodeId};
use crate::host::HostEvaluator;
use crate::value::CellValue;

/// Default number of rounds: `ceil(1000 * e)`.
pub const DEFAULT_ROUNDS: usize = 2719;

/// Default relative deviation scale.
pub const DEFAULT_SCALE: f64 = 0.5;

/// Default relative change above which an observation counts as an exceedance.
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

/// How perturbed input values are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PerturbationPolicy {
    /// Resample each numeric cell of the input, with replacement, from the
    /// input's own numeric values.
    Resample,
    /// Move each numeric cell `v` by `max(|v|, 1) * scale * u`, `u` uniform in
    /// `[-1, 1]`.
    Deviation {
        /// Relative deviation scale.
        scale: f64,
    },
    /// Resample inputs with two or more numeric cells, deviate the rest.
    Mixed {
        /// Relative deviation scale for single values.
        scale: f64,
    },
}

impl Default for PerturbationPolicy {
    fn default() -> Self {
        Self::Mixed {
            scale: DEFAULT_SCALE,
        }
    }
}

impl PerturbationPolicy {
    /// Perturbed replacements for `values`, one per value.
    pub fn draw<R: Rng + ?Sized>(&self, values: &[f64], rng: &mut R) -> Vec<f64> {
        match *self {
            Self::Resample => resample(values, rng),
            Self::Deviation { scale } => deviate(values, scale, rng),
            Self::Mixed { scale } if values.len() < 2 => deviate(values, scale, rng),
            Self::Mixed { .. } => resample(values, rng),
        }
    }

    fn scale(&self) -> Option<f64> {
        match *self {
            Self::Resample => None,
            Self::Deviation { scale } | Self::Mixed { scale } => Some(scale),
        }
    }
}

fn resample<R: Rng + ?Sized>(values: &[f64], rng: &mut R) -> Vec<f64> {
    (0..values.len())
        .map(|_| values[rng.gen_range(0..values.len())])
        .collect()
}

fn deviate<R: Rng + ?Sized>(values: &[f64], scale: f64, rng: &mut R) -> Vec<f64> {
    values
        .iter()
        .map(|&v| v + v.abs().max(1.0) * scale * rng.gen_range(-1.0..=1.0))
        .collect()
}

/// How a [`ScoreRecord`] is reduced to one score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScoreStatistic {
    /// Mean relative change per observation.
    #[default]
    MeanMagnitude,
    /// Share of observations whose relative change exceeded the tolerance.
    ExceedanceRate,
}

/// Bootstrap parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapConfig {
    /// Number of rounds.
    pub rounds: usize,
    /// How perturbed values are drawn.
    pub policy: PerturbationPolicy,
    /// Relative change above which an observation is an exceedance.
    pub tolerance: f64,
    /// Score reduction.
    pub statistic: ScoreStatistic,
    /// Score every formula, not only the ones nothing else reads.
    pub all_outputs: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            rounds: DEFAULT_ROUNDS,
            policy: PerturbationPolicy::default(),
            tolerance: DEFAULT_TOLERANCE,
            statistic: ScoreStatistic::default(),
            all_outputs: true,
        }
    }
}

impl BootstrapConfig {
    /// Check parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for zero rounds, a negative or non-finite
    /// tolerance, or a non-positive deviation scale.
    pub fn validate(&self) -> Result<()> {
        if self.rounds == 0 {
            return Err(Error::Config("rounds must be at least 1".into()));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(Error::Config(format!(
                "tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }
        if let Some(scale) = self.policy.scale() {
            if !scale.is_finite() || scale <= 0.0 {
                return Err(Error::Config(format!(
                    "perturbation scale must be positive, got {scale}"
                )));
            }
        }
        Ok(())
    }
}

/// Running statistics for one scored formula.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreRecord {
    observations: u64,
    exceedances: u64,
    total_change: f64,
    by_input: BTreeMap<NodeId, f64>,
}

impl ScoreRecord {
    /// Record one observed relative change caused by perturbing `input`.
    pub fn observe(&mut self, input: NodeId, change: f64, tolerance: f64) {
        self.observations += 1;
        if change > tolerance {
            self.exceedances += 1;
        }
        self.total_change += change;
        *self.by_input.entry(input).or_default() += change;
    }

    /// Observations recorded.
    #[must_use]
    pub fn observations(&self) -> u64 {
        self.observations
    }

    /// Observations above tolerance.
    #[must_use]
    pub fn exceedances(&self) -> u64 {
        self.exceedances
    }

    /// Total relative change attributed to `input`.
    #[must_use]
    pub fn sensitivity(&self, input: NodeId) -> f64 {
        self.by_input.get(&input).copied().unwrap_or(0.0)
    }

    /// The input responsible for the largest share of the change.
    #[must_use]
    pub fn dominant_input(&self) -> Option<(NodeId, f64)> {
        self.by_input
            .iter()
            .map(|(&id, &change)| (id, change))
            .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)))
    }

    /// Reduce to a single score; `0` without observations.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn score(&self, statistic: ScoreStatistic) -> f64 {
        if self.observations == 0 {
            return 0.0;
        }
        let n = self.observations as f64;
        match statistic {
            ScoreStatistic::MeanMagnitude => self.total_change / n,
            ScoreStatistic::ExceedanceRate => self.exceedances as f64 / n,
        }
    }
}

/// A recorded, non-fatal failure during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundError {
    /// Round number, starting at 1; 0 is the baseline read.
    pub round: usize,
    /// Label of the input being perturbed, if any.
    pub input: Option<String>,
    /// The formula cell involved, if any.
    pub node: Option<Address>,
    /// What went wrong.
    pub message: String,
}

impl fmt::Display for RoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.round == 0 {
            f.write_str("baseline")?;
        } else {
            write!(f, "round {}", self.round)?;
        }
        if let Some(input) = &self.input {
            write!(f, ", perturbing {input}")?;
        }
        if let Some(node) = &self.node {
            write!(f, ", reading {node}")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Cooperative cancellation, checked between rounds.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A flag that is not set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Clear the flag.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// The final score of one formula.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeScore {
    /// Graph node.
    pub node: NodeId,
    /// Formula cell address.
    pub address: Address,
    /// Reduced score.
    pub score: f64,
    /// The statistics behind the score.
    pub record: ScoreRecord,
}

/// Result of a bootstrap run.
#[derive(Debug, Clone, Default)]
pub struct BootstrapOutcome {
    /// Scores in address order, one per formula with a readable baseline.
    pub scores: Vec<NodeScore>,
    /// Recorded failures.
    pub errors: Vec<RoundError>,
    /// Rounds run.
    pub rounds: usize,
    /// Inputs perturbed each round.
    pub inputs: usize,
}

/// An input the engine perturbs, with its numeric cells and the scored
/// formulas it affects.
#[derive(Debug, Clone)]
pub struct InputPlan {
    /// The input node.
    pub node: NodeId,
    /// Display label.
    pub label: String,
    /// Numeric cells and their original values.
    pub cells: Vec<(Address, f64)>,
    /// Scored formulas downstream of the input.
    pub downstream: Vec<NodeId>,
}

impl InputPlan {
    fn writes(&self, values: &[f64]) -> Vec<(Address, CellValue)> {
        self.cells
            .iter()
            .zip(values)
            .map(|((address, _), &v)| (address.clone(), CellValue::Number(v)))
            .collect()
    }

    fn originals(&self) -> Vec<(Address, CellValue)> {
        self.cells
            .iter()
            .map(|(address, v)| (address.clone(), CellValue::Number(*v)))
            .collect()
    }
}

/// Runs bootstrap rounds over a dependency graph.
#[derive(Debug)]
pub struct Bootstrap<'g> {
    graph: &'g DependencyGraph,
    config: BootstrapConfig,
}

impl<'g> Bootstrap<'g> {
    /// Engine over `graph`.
    #[must_use]
    pub fn new(graph: &'g DependencyGraph, config: BootstrapConfig) -> Self {
        Self { graph, config }
    }

    /// Formula nodes that receive a score.
    #[must_use]
    pub fn scored_nodes(&self) -> Vec<NodeId> {
        self.graph.terminal_formula_nodes(self.config.all_outputs)
    }

    /// Inputs that will be perturbed, in input order.
    ///
    /// Inputs without numeric cells, or with no scored formula downstream,
    /// are left out.
    #[must_use]
    pub fn plans(&self) -> Vec<InputPlan> {
        let scored: BTreeSet<NodeId> = self.scored_nodes().into_iter().collect();
        let mut plans = Vec::new();

        for id in self.graph.terminal_input_nodes() {
            let node = self.graph.node(id);
            let members: Vec<NodeId> = if node.is_cell() {
                vec![id]
            } else {
                self.graph.inputs(id).collect()
            };

            let mut cells: Vec<(Address, f64)> = members
                .into_iter()
                .map(|member| self.graph.node(member))
                .filter(|member| {
                    !member.dont_perturb && !member.is_formula() && !member.holds_formula_text()
                })
                .filter_map(|member| match (member.address(), &member.value) {
                    (Some(address), CellValue::Number(v)) => Some((address.clone(), *v)),
                    _ => None,
                })
                .collect();
            cells.sort_by(|a, b| a.0.cmp(&b.0));

            let downstream: Vec<NodeId> = self
                .graph
                .downstream_formulas(id)
                .into_iter()
                .filter(|d| scored.contains(d))
                .collect();

            if cells.is_empty() || downstream.is_empty() {
                trace!(input = %node.label(), "Input has nothing to perturb");
                continue;
            }
            plans.push(InputPlan {
                node: id,
                label: node.label(),
                cells,
                downstream,
            });
        }
        plans
    }

    /// Run every round.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if `cancel` is set between rounds
    /// - [`Error::Host`] if the host cannot restore an input's original values
    /// - [`Error::Config`] if the configuration is out of range
    pub fn run<H, R>(&self, host: &mut H, rng: &mut R, cancel: &CancelFlag) -> Result<BootstrapOutcome>
    where
        H: HostEvaluator + ?Sized,
        R: Rng + ?Sized,
    {
        self.config.validate()?;
        let plans = self.plans();
        let mut outcome = BootstrapOutcome {
            inputs: plans.len(),
            ..BootstrapOutcome::default()
        };
        if plans.is_empty() {
            debug!("No perturbable inputs; skipping bootstrap");
            return Ok(outcome);
        }

        let mut baseline: BTreeMap<NodeId, CellValue> = BTreeMap::new();
        for id in self.scored_nodes() {
            let Some(address) = self.graph.node(id).address() else {
                continue;
            };
            match host.read_value(address) {
                Ok(value) if value.is_error() => outcome.errors.push(RoundError {
                    round: 0,
                    input: None,
                    node: Some(address.clone()),
                    message: format!("formula evaluates to {value}"),
                }),
                Ok(value) => {
                    baseline.insert(id, value);
                }
                Err(e) => outcome.errors.push(RoundError {
                    round: 0,
                    input: None,
                    node: Some(address.clone()),
                    message: e.to_string(),
                }),
            }
        }

        let mut records: BTreeMap<NodeId, ScoreRecord> =
            baseline.keys().map(|&id| (id, ScoreRecord::default())).collect();

        for round in 1..=self.config.rounds {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled {
                    completed_rounds: round - 1,
                });
            }
            for plan in &plans {
                self.perturb_input(host, rng, round, plan, &baseline, &mut records, &mut outcome.errors)?;
            }
            outcome.rounds = round;
            trace!(round, "Bootstrap round complete");
        }

        outcome.scores = records
            .into_iter()
            .filter_map(|(id, record)| {
                let address = self.graph.node(id).address()?.clone();
                Some(NodeScore {
                    node: id,
                    address,
                    score: record.score(self.config.statistic),
                    record,
                })
            })
            .collect();
        outcome.scores.sort_by(|a, b| a.address.cmp(&b.address));

        debug!(
            rounds = outcome.rounds,
            inputs = outcome.inputs,
            scored = outcome.scores.len(),
            errors = outcome.errors.len(),
            "Bootstrap finished"
        );
        Ok(outcome)
    }

    #[allow(clippy::too_many_arguments)]
    fn perturb_input<H, R>(
        &self,
        host: &mut H,
        rng: &mut R,
        round: usize,
        plan: &InputPlan,
        baseline: &BTreeMap<NodeId, CellValue>,
        records: &mut BTreeMap<NodeId, ScoreRecord>,
        errors: &mut Vec<RoundError>,
    ) -> Result<()>
    where
        H: HostEvaluator + ?Sized,
        R: Rng + ?Sized,
    {
        let originals: Vec<f64> = plan.cells.iter().map(|(_, v)| *v).collect();
        let drawn = self.config.policy.draw(&originals, rng);

        match host.perturb_and_recalculate(&plan.writes(&drawn)) {
            Ok(()) => {
                for &id in &plan.downstream {
                    let (Some(base), Some(address)) = (baseline.get(&id), self.graph.node(id).address())
                    else {
                        continue;
                    };
                    let failure = match host.read_value(address) {
                        Ok(value) if value.is_error() => format!("formula evaluates to {value}"),
                        Ok(value) => {
                            if let Some(record) = records.get_mut(&id) {
                                record.observe(plan.node, value.relative_change(base), self.config.tolerance);
                            }
                            continue;
                        }
                        Err(e) => e.to_string(),
                    };
                    errors.push(RoundError {
                        round,
                        input: Some(plan.label.clone()),
                        node: Some(address.clone()),
                        message: failure,
                    });
                }
            }
            Err(e) => {
                warn!(round, input = %plan.label, error = %e, "Recalculation failed");
                errors.push(RoundError {
                    round,
                    input: Some(plan.label.clone()),
                    node: None,
                    message: e.to_string(),
                });
            }
        }

        host.perturb_and_recalculate(&plan.originals())
            .map_err(Error::Host)
    }
}
