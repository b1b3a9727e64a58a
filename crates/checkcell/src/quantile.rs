//! Quantile ranks of formula scores.
//!
//! Entries are sorted by score, then address. The entry at sorted position
//! `p` of `n` gets rank `p / (n - 1)`; equal scores share the mean rank of
//! their positions, and a lone score gets `0.5`. The table depends only on
//! the multiset of (score, address) pairs, never on input order.

use serde::Serialize;

use crate::address::Address;

/// One formula's score and its quantile rank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantileEntry {
    /// Formula cell.
    pub address: Address,
    /// Anomaly score.
    pub score: f64,
    /// Rank in `[0, 1]`.
    pub rank: f64,
}

/// Quantile ranks of a set of scores, in ascending (score, address) order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct QuantileTable {
    entries: Vec<QuantileEntry>,
}

impl QuantileTable {
    /// Rank `scores`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compute(scores: impl IntoIterator<Item = (Address, f64)>) -> Self {
        let mut sorted: Vec<(Address, f64)> = scores.into_iter().collect();
        sorted.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let n = sorted.len();
        let mut entries = Vec::with_capacity(n);
        let mut start = 0;
        while start < n {
            let score = sorted[start].1;
            let end = start
                + sorted[start..]
                    .iter()
                    .take_while(|(_, s)| s.total_cmp(&score).is_eq())
                    .count();

            let rank = if n == 1 {
                0.5
            } else {
                // Mean of positions start..end, over n - 1.
                (start + end - 1) as f64 / 2.0 / (n - 1) as f64
            };
            entries.extend(sorted[start..end].iter().map(|(address, score)| QuantileEntry {
                address: address.clone(),
                score: *score,
                rank,
            }));
            start = end;
        }
        Self { entries }
    }

    /// A table with caller-supplied ranks, sorted like a computed one.
    #[must_use]
    pub fn from_entries(mut entries: Vec<QuantileEntry>) -> Self {
        entries.sort_by(|a, b| a.score.total_cmp(&b.score).then_with(|| a.address.cmp(&b.address)));
        Self { entries }
    }

    /// Entries in ascending order.
    #[must_use]
    pub fn entries(&self) -> &[QuantileEntry] {
        &self.entries
    }

    /// The entry for `address`.
    #[must_use]
    pub fn get(&self, address: &Address) -> Option<&QuantileEntry> {
        self.entries.iter().find(|e| e.address == *address)
    }

    /// Rank of `address`.
    #[must_use]
    pub fn rank_of(&self, address: &Address) -> Option<f64> {
        self.get(address).map(|e| e.rank)
    }

    /// Entries in descending order, most anomalous first.
    pub fn descending(&self) -> impl Iterator<Item = &QuantileEntry> {
        self.entries.iter().rev()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
