//! # CheckCell: statistical localization of spreadsheet formula errors
//!
//! CheckCell builds the dependency graph of a workbook, perturbs its input
//! cells over many randomized bootstrap rounds, and measures how strongly each
//! formula reacts. Formulas whose sensitivity ranks above a significance
//! threshold are flagged one at a time for review; a reviewer confirms each
//! flagged cell as good to see the next one.
//!
//! ## Pipeline
//!
//! ```text
//! snapshot ─> GraphBuilder ─> DependencyGraph ─> Bootstrap (rounds against a host)
//!          ─> scores ─> QuantileTable ─> flag_top_outlier ─> flagged cell
//! ```
//!
//! The workbook is evaluated by a [`HostEvaluator`]. [`MemoryHost`] is an
//! in-process implementation used by the CLI and tests.
//!
//! ## Quick Start
//!
//! ```
//! use checkcell::{Address, AnalysisConfig, MemoryHost, Session, WorkbookSnapshot};
//!
//! let cell = |a1: &str| Address::parse(a1, "Sheet1").unwrap();
//! let snapshot = WorkbookSnapshot::new()
//!     .with_value(cell("A1"), 5.0)
//!     .with_value(cell("A2"), 10.0)
//!     .with_formula(cell("A3"), "=A1+A2");
//! let mut host = MemoryHost::from_snapshot(&snapshot);
//!
//! let config = AnalysisConfig { rounds: 20, seed: Some(42), ..AnalysisConfig::default() };
//! let mut session = Session::start(config)?;
//! let report = session.analyze(&mut host)?;
//! assert_eq!(report.quantiles.len(), 1);
//! # Ok::<(), checkcell::Error>(())
//! ```

pub mod address;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod flagger;
pub mod formula;
pub mod graph;
pub mod host;
pub mod quantile;
pub mod session;
pub mod snapshot;
pub mod value;

pub use address::{Address, RangeRef};
pub use bootstrap::{
    Bootstrap, BootstrapConfig, CancelFlag, NodeScore, PerturbationPolicy, RoundError,
    ScoreRecord, ScoreStatistic,
};
pub use config::AnalysisConfig;
pub use error::{Error, HostError, Result};
pub use flagger::{Significance, flag_sequence, flag_top_outlier};
pub use graph::{DependencyGraph, GraphBuilder, NodeId, NodeKind, ParseIssue, ParsePolicy};
pub use host::{HostEvaluator, MemoryHost};
pub use quantile::{QuantileEntry, QuantileTable};
pub use session::{AnalysisReport, AnalysisStatus, Session, analyze};
pub use snapshot::WorkbookSnapshot;
pub use value::CellValue;
