//! Error types for CheckCell operations.
//!
//! Errors fall into two groups:
//!
//! - **`Error`**: failures that stop an analysis (a cyclic graph, an invalid
//!   threshold, a host that can no longer be restored, ...).
//! - **Collected diagnostics**: [`crate::graph::ParseIssue`] and
//!   [`crate::bootstrap::RoundError`] are gathered while the analysis keeps
//!   going and are returned alongside its results.
//!
//! A single unparseable formula or a single failed recalculation never
//! aborts a run; only problems that make the aggregate result meaningless do.

use thiserror::Error;

use crate::address::Address;
use crate::formula::FormulaError;

/// Result type for CheckCell operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for CheckCell operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A formula could not be parsed and the strict parse policy is active.
    #[error("cannot build dependency graph: formula in {address} ({formula}): {source}")]
    GraphConstruction {
        /// The cell holding the formula.
        address: Address,
        /// The formula text.
        formula: String,
        /// What the parser rejected.
        #[source]
        source: FormulaError,
    },

    /// The dependency graph contains a circular reference.
    #[error("circular reference: {}", cycle.join(" -> "))]
    CycleDetected {
        /// Labels of the nodes on the cycle, in dependency order.
        cycle: Vec<String>,
    },

    /// The significance threshold lies outside the open interval (0, 1).
    #[error("significance must lie strictly between 0 and 1, got {0}")]
    InvalidSignificance(f64),

    /// A configuration value is out of range.
    #[error("configuration error: {0}")]
    Config(String),

    /// The host evaluator failed in a way the analysis cannot recover from.
    #[error("host evaluation failed: {0}")]
    Host(#[from] HostError),

    /// The analysis was cancelled between bootstrap rounds.
    #[error("analysis cancelled after {completed_rounds} completed rounds")]
    Cancelled {
        /// Rounds that finished before cancellation was observed.
        completed_rounds: usize,
    },

    /// A session operation needs a completed analysis.
    #[error("no analysis has been run in this session")]
    NoActiveAnalysis,

    /// A workbook snapshot is unusable.
    #[error("invalid workbook snapshot: {0}")]
    Snapshot(String),

    /// Reading or writing JSONL failed.
    #[error(transparent)]
    Jsonl(#[from] checkcell_jsonl::Error),

    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A failure reported by the host spreadsheet evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}{message}", address.as_ref().map(|a| format!("{a}: ")).unwrap_or_default())]
pub struct HostError {
    /// The cell involved, when the host can tell.
    pub address: Option<Address>,
    /// Human-readable description.
    pub message: String,
}

impl HostError {
    /// A failure not tied to a particular cell.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            address: None,
            message: message.into(),
        }
    }

    /// A failure involving `address`.
    pub fn at(address: Address, message: impl Into<String>) -> Self {
        Self {
            address: Some(address),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_lists_path() {
        let err = Error::CycleDetected {
            cycle: vec!["Sheet1!A1".into(), "Sheet1!B1".into()],
        };
        assert_eq!(err.to_string(), "circular reference: Sheet1!A1 -> Sheet1!B1");
    }

    #[test]
    fn host_error_display_includes_address_when_known() {
        let err = HostError::at(Address::new("Sheet1", 1, 2), "read failed");
        assert_eq!(err.to_string(), "Sheet1!A2: read failed");
        assert_eq!(HostError::new("busy").to_string(), "busy");
    }
}
