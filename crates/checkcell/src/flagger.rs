//! Selection of the most anomalous formula above a significance threshold.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::{Error, Result};
use crate::quantile::{QuantileEntry, QuantileTable};

/// Default significance threshold.
pub const DEFAULT_SIGNIFICANCE: f64 = 0.95;

/// A significance threshold strictly between 0 and 1.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Significance(f64);

impl Significance {
    /// Validate a threshold.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignificance`] unless `0 < value < 1`.
    pub fn new(value: f64) -> Result<Self> {
        if value > 0.0 && value < 1.0 {
            Ok(Self(value))
        } else {
            Err(Error::InvalidSignificance(value))
        }
    }

    /// The threshold.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for Significance {
    fn default() -> Self {
        Self(DEFAULT_SIGNIFICANCE)
    }
}

impl TryFrom<f64> for Significance {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Significance> for f64 {
    fn from(s: Significance) -> Self {
        s.0
    }
}

impl fmt::Display for Significance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Higher rank first, then higher score, then smaller address.
fn precedence(a: &QuantileEntry, b: &QuantileEntry) -> Ordering {
    a.rank
        .total_cmp(&b.rank)
        .then_with(|| a.score.total_cmp(&b.score))
        .then_with(|| b.address.cmp(&a.address))
}

/// Entries ranked above `significance` and not in `excluded`.
pub fn candidates<'t>(
    table: &'t QuantileTable,
    significance: Significance,
    excluded: &'t BTreeSet<Address>,
) -> impl Iterator<Item = &'t QuantileEntry> {
    table
        .entries()
        .iter()
        .filter(move |e| e.rank > significance.value() && !excluded.contains(&e.address))
}

/// The most anomalous candidate, if any.
#[must_use]
pub fn flag_top_outlier(
    table: &QuantileTable,
    significance: Significance,
    excluded: &BTreeSet<Address>,
) -> Option<Address> {
    candidates(table, significance, excluded)
        .max_by(|a, b| precedence(a, b))
        .map(|e| e.address.clone())
}

/// Flag, exclude and re-flag until nothing qualifies.
///
/// The result lists candidates in the order a reviewer confirming each one
/// would see them. `excluded` is left untouched.
#[must_use]
pub fn flag_sequence(
    table: &QuantileTable,
    significance: Significance,
    excluded: &BTreeSet<Address>,
) -> Vec<Address> {
    let mut excluded = excluded.clone();
    let mut sequence = Vec::new();
    while let Some(address) = flag_top_outlier(table, significance, &excluded) {
        excluded.insert(address.clone());
        sequence.push(address);
    }
    sequence
}
