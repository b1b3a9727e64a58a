//! Workbook snapshots: the cell contents the dependency graph is built from.
//!
//! On disk a snapshot is JSONL, one record per line:
//!
//! ```text
//! {"kind":"cell","sheet":"Sheet1","address":"A1","value":5}
//! {"kind":"cell","sheet":"Sheet1","address":"A3","formula":"=A1+A2","value":15}
//! {"kind":"chart","sheet":"Sheet1","name":"Chart 1"}
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use checkcell_jsonl::{JsonlWriter, Warning, read_jsonl_resilient};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::address::Address;
use crate::error::Result;
use crate::value::CellValue;

/// One line of a snapshot file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SnapshotRecord {
    /// A used cell.
    Cell(CellRecord),
    /// A chart object.
    Chart(ChartRecord),
}

/// Serialized form of a used cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    /// Worksheet name.
    pub sheet: String,
    /// Sheet-less A1 address.
    pub address: String,
    /// Formula text including the leading `=`, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    /// Current value.
    #[serde(default)]
    pub value: serde_json::Value,
}

/// A chart object. Charts are tracked but never take part in the analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRecord {
    /// Worksheet (or chart sheet) holding the chart.
    pub sheet: String,
    /// Chart name.
    pub name: String,
}

/// A used cell in a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotCell {
    /// Cell address.
    pub address: Address,
    /// Formula text, if the cell holds one.
    pub formula: Option<String>,
    /// Current value.
    pub value: CellValue,
}

/// An in-memory workbook snapshot, keyed and ordered by address.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkbookSnapshot {
    cells: BTreeMap<Address, SnapshotCell>,
    charts: Vec<ChartRecord>,
}

/// A snapshot read from disk plus the lines that had to be skipped.
#[derive(Debug)]
pub struct LoadedSnapshot {
    /// The usable part of the file.
    pub snapshot: WorkbookSnapshot,
    /// Descriptions of skipped lines.
    pub warnings: Vec<String>,
}

impl WorkbookSnapshot {
    /// An empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a cell.
    pub fn insert(&mut self, address: Address, formula: Option<String>, value: CellValue) {
        self.cells.insert(
            address.clone(),
            SnapshotCell {
                address,
                formula,
                value,
            },
        );
    }

    /// Builder-style [`insert`](Self::insert) of a constant.
    #[must_use]
    pub fn with_value(mut self, address: Address, value: impl Into<CellValue>) -> Self {
        self.insert(address, None, value.into());
        self
    }

    /// Builder-style [`insert`](Self::insert) of a formula with no cached value.
    #[must_use]
    pub fn with_formula(mut self, address: Address, formula: impl Into<String>) -> Self {
        self.insert(address, Some(formula.into()), CellValue::Empty);
        self
    }

    /// Record a chart.
    pub fn add_chart(&mut self, chart: ChartRecord) {
        self.charts.push(chart);
    }

    /// Cells in address order.
    pub fn cells(&self) -> impl Iterator<Item = &SnapshotCell> {
        self.cells.values()
    }

    /// Look up a cell.
    #[must_use]
    pub fn cell(&self, address: &Address) -> Option<&SnapshotCell> {
        self.cells.get(address)
    }

    /// Used cells of `sheet` in `column` between `first_row` and `last_row`.
    pub fn column_slice(
        &self,
        sheet: &str,
        column: u32,
        first_row: u32,
        last_row: u32,
    ) -> impl Iterator<Item = &SnapshotCell> {
        self.cells
            .range(Address::new(sheet, column, first_row)..=Address::new(sheet, column, last_row))
            .map(|(_, cell)| cell)
    }

    /// Chart records.
    #[must_use]
    pub fn charts(&self) -> &[ChartRecord] {
        &self.charts
    }

    /// Number of used cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the snapshot has no used cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Build a snapshot from decoded records.
    ///
    /// Records with an unparseable address are skipped and described in the
    /// returned warnings. A later record for the same address replaces an
    /// earlier one.
    #[must_use]
    pub fn from_records(records: Vec<SnapshotRecord>) -> (Self, Vec<String>) {
        let mut snapshot = Self::new();
        let mut warnings = Vec::new();
        for record in records {
            match record {
                SnapshotRecord::Cell(cell) => match Address::from_a1(&cell.sheet, &cell.address) {
                    Ok(address) => {
                        let formula = cell.formula.filter(|f| !f.trim().is_empty());
                        snapshot.insert(address, formula, CellValue::from_json(&cell.value));
                    }
                    Err(e) => {
                        warn!(sheet = %cell.sheet, address = %cell.address, error = %e, "Skipping cell record");
                        warnings.push(format!("{}!{}: {e}", cell.sheet, cell.address));
                    }
                },
                SnapshotRecord::Chart(chart) => snapshot.add_chart(chart),
            }
        }
        (snapshot, warnings)
    }

    /// Serializable records for every cell and chart.
    #[must_use]
    pub fn to_records(&self) -> Vec<SnapshotRecord> {
        self.cells
            .values()
            .map(|cell| {
                SnapshotRecord::Cell(CellRecord {
                    sheet: cell.address.sheet.clone(),
                    address: cell.address.a1(),
                    formula: cell.formula.clone(),
                    value: cell.value.to_json(),
                })
            })
            .chain(self.charts.iter().cloned().map(SnapshotRecord::Chart))
            .collect()
    }

    /// Load a JSONL snapshot, skipping damaged lines.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn load(path: &Path) -> Result<LoadedSnapshot> {
        let (records, line_warnings): (Vec<SnapshotRecord>, Vec<Warning>) =
            read_jsonl_resilient(path)?;
        let (snapshot, mut warnings) = Self::from_records(records);
        warnings.splice(0..0, line_warnings.iter().map(ToString::to_string));

        debug!(
            path = %path.display(),
            cells = snapshot.len(),
            charts = snapshot.charts.len(),
            skipped = warnings.len(),
            "Loaded workbook snapshot"
        );
        Ok(LoadedSnapshot { snapshot, warnings })
    }

    /// Write the snapshot as JSONL.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = JsonlWriter::new(std::fs::File::create(path)?);
        for record in self.to_records() {
            writer.write(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}
