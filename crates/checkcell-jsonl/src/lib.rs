//! JSONL (JSON Lines) reading and writing for CheckCell.
//!
//! Workbook snapshots and analysis reports are exchanged as JSONL: one JSON
//! record per line. Reading is *resilient*: a malformed line is skipped and
//! reported as a [`warning::Warning`] instead of aborting the whole load, so a
//! single corrupted record in a large snapshot does not hide the rest.

#![forbid(unsafe_code)]

pub mod error;
pub mod reader;
pub mod warning;
pub mod writer;

pub use error::{Error, Result};
pub use reader::{JsonlReader, read_jsonl_resilient};
pub use warning::{LineProblem, Warning};
pub use writer::{JsonlWriter, write_jsonl};
