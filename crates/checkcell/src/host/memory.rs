//! An in-process workbook evaluator.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::trace;

use super::HostEvaluator;
use super::eval::Evaluator;
use crate::address::Address;
use crate::error::HostError;
use crate::formula::{self, Expr, Reference};
use crate::snapshot::{ChartRecord, WorkbookSnapshot};
use crate::value::CellValue;

/// A simulated spreadsheet application holding a workbook in memory.
///
/// Formulas are recalculated in dependency order after every write. Cells on
/// a circular reference evaluate to `#CIRC!`, unparseable formulas to
/// `#NAME?`.
///
/// # Example
///
/// ```
/// use checkcell::address::Address;
/// use checkcell::host::{HostEvaluator, MemoryHost};
/// use checkcell::snapshot::WorkbookSnapshot;
/// use checkcell::value::CellValue;
///
/// let a1 = Address::new("Sheet1", 1, 1);
/// let a2 = Address::new("Sheet1", 1, 2);
/// let snapshot = WorkbookSnapshot::new()
///     .with_value(a1.clone(), 5.0)
///     .with_formula(a2.clone(), "=A1*2");
///
/// let mut host = MemoryHost::from_snapshot(&snapshot);
/// assert_eq!(host.read_value(&a2).unwrap(), CellValue::Number(10.0));
///
/// host.perturb_and_recalculate(&[(a1, CellValue::Number(7.0))]).unwrap();
/// assert_eq!(host.read_value(&a2).unwrap(), CellValue::Number(14.0));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    values: BTreeMap<Address, CellValue>,
    formulas: BTreeMap<Address, Formula>,
    charts: Vec<ChartRecord>,
    failing_reads: BTreeSet<Address>,
    failing_writes: BTreeSet<Address>,
    recalculations: usize,
}

#[derive(Debug, Clone)]
struct Formula {
    text: String,
    expr: Option<Expr>,
}

impl MemoryHost {
    /// Load a snapshot and recalculate it.
    #[must_use]
    pub fn from_snapshot(snapshot: &WorkbookSnapshot) -> Self {
        let mut host = Self {
            charts: snapshot.charts().to_vec(),
            ..Self::default()
        };
        for cell in snapshot.cells() {
            match &cell.formula {
                Some(text) if formula::is_formula(text) => {
                    host.formulas.insert(
                        cell.address.clone(),
                        Formula {
                            text: text.clone(),
                            expr: formula::parse(text, &cell.address.sheet).ok(),
                        },
                    );
                }
                _ => {
                    host.values.insert(cell.address.clone(), cell.value.clone());
                }
            }
        }
        host.recalculate();
        host
    }

    /// Make every later [`read_value`](HostEvaluator::read_value) of `address` fail.
    pub fn fail_reads_of(&mut self, address: Address) {
        self.failing_reads.insert(address);
    }

    /// Make every later write to `address` fail before recalculation.
    pub fn fail_writes_to(&mut self, address: Address) {
        self.failing_writes.insert(address);
    }

    /// Number of recalculations performed, the initial one included.
    #[must_use]
    pub fn recalculations(&self) -> usize {
        self.recalculations
    }

    /// Recalculate every formula.
    pub fn recalculate(&mut self) {
        self.recalculations += 1;

        // Formula cells each formula reads, directly or through a range.
        let mut readers: BTreeMap<&Address, Vec<&Address>> = BTreeMap::new();
        let mut waiting: BTreeMap<&Address, usize> = BTreeMap::new();
        for (address, formula) in &self.formulas {
            let sources = formula
                .expr
                .as_ref()
                .map(|expr| self.formula_sources(expr))
                .unwrap_or_default();
            waiting.insert(address, sources.len());
            for source in sources {
                readers.entry(source).or_default().push(address);
            }
        }

        let mut ready: VecDeque<&Address> = waiting
            .iter()
            .filter(|&(_, &count)| count == 0)
            .map(|(&address, _)| address)
            .collect();
        let mut order = Vec::with_capacity(self.formulas.len());
        while let Some(address) = ready.pop_front() {
            order.push(address.clone());
            for &reader in readers.get(address).into_iter().flatten() {
                if let Some(count) = waiting.get_mut(reader) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(reader);
                    }
                }
            }
        }

        let circular: Vec<Address> = waiting
            .iter()
            .filter(|&(_, &count)| count > 0)
            .map(|(&address, _)| address.clone())
            .collect();

        for address in &circular {
            self.values.insert(address.clone(), CellValue::Error("#CIRC!".into()));
        }
        for address in order {
            let value = match self.formulas[&address].expr.as_ref() {
                Some(expr) => Evaluator::new(&self.values).evaluate(expr),
                None => CellValue::Error("#NAME?".into()),
            };
            self.values.insert(address, value);
        }

        trace!(
            formulas = self.formulas.len(),
            circular = circular.len(),
            "Recalculated workbook"
        );
    }

    /// Formula cells an expression reads, without duplicates.
    fn formula_sources(&self, expr: &Expr) -> BTreeSet<&Address> {
        let mut sources = BTreeSet::new();
        for reference in expr.references() {
            match reference {
                Reference::Cell(address) => {
                    if let Some((key, _)) = self.formulas.get_key_value(&address) {
                        sources.insert(key);
                    }
                }
                Reference::Range(range) => {
                    for column in range.first_column..=range.last_column {
                        let bounds = Address::new(range.sheet.as_str(), column, range.first_row)
                            ..=Address::new(range.sheet.as_str(), column, range.last_row);
                        sources.extend(self.formulas.range(bounds).map(|(key, _)| key));
                    }
                }
            }
        }
        sources
    }
}

impl HostEvaluator for MemoryHost {
    fn read_workbook(&self) -> Result<WorkbookSnapshot, HostError> {
        let mut snapshot = WorkbookSnapshot::new();
        for (address, value) in &self.values {
            let formula = self.formulas.get(address).map(|f| f.text.clone());
            snapshot.insert(address.clone(), formula, value.clone());
        }
        for chart in &self.charts {
            snapshot.add_chart(chart.clone());
        }
        Ok(snapshot)
    }

    fn perturb_and_recalculate(&mut self, writes: &[(Address, CellValue)]) -> Result<(), HostError> {
        for (address, value) in writes {
            if self.failing_writes.contains(address) {
                return Err(HostError::at(address.clone(), "write rejected"));
            }
            if self.formulas.contains_key(address) {
                return Err(HostError::at(address.clone(), "cannot overwrite a formula cell"));
            }
            self.values.insert(address.clone(), value.clone());
        }
        self.recalculate();
        Ok(())
    }

    fn read_value(&self, address: &Address) -> Result<CellValue, HostError> {
        if self.failing_reads.contains(address) {
            return Err(HostError::at(address.clone(), "read failed"));
        }
        Ok(self.values.get(address).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(text: &str) -> Address {
        Address::parse(text, "Sheet1").unwrap()
    }

    fn read(host: &MemoryHost, text: &str) -> CellValue {
        host.read_value(&a(text)).unwrap()
    }

    #[test]
    fn recalculates_in_dependency_order() {
        // C1 is listed before the cells it reads.
        let snapshot = WorkbookSnapshot::new()
            .with_formula(a("A3"), "=A2*2")
            .with_formula(a("A2"), "=A1+1")
            .with_value(a("A1"), 1.0)
            .with_formula(a("B1"), "=SUM(A1:A3)");
        let host = MemoryHost::from_snapshot(&snapshot);

        assert_eq!(read(&host, "A2"), CellValue::Number(2.0));
        assert_eq!(read(&host, "A3"), CellValue::Number(4.0));
        assert_eq!(read(&host, "B1"), CellValue::Number(7.0));
    }

    #[test]
    fn circular_cells_evaluate_to_circ() {
        let snapshot = WorkbookSnapshot::new()
            .with_formula(a("A1"), "=B1+1")
            .with_formula(a("B1"), "=A1+1")
            .with_formula(a("C1"), "=A1")
            .with_value(a("D1"), 3.0)
            .with_formula(a("E1"), "=D1");
        let host = MemoryHost::from_snapshot(&snapshot);

        assert_eq!(read(&host, "A1"), CellValue::Error("#CIRC!".into()));
        assert_eq!(read(&host, "C1"), CellValue::Error("#CIRC!".into()));
        assert_eq!(read(&host, "E1"), CellValue::Number(3.0));
    }

    #[test]
    fn unparseable_formula_is_name_error() {
        let snapshot = WorkbookSnapshot::new().with_formula(a("A1"), "=SUM(");
        let host = MemoryHost::from_snapshot(&snapshot);
        assert_eq!(read(&host, "A1"), CellValue::Error("#NAME?".into()));
    }

    #[test]
    fn injected_faults_surface_as_host_errors() {
        let snapshot = WorkbookSnapshot::new()
            .with_value(a("A1"), 1.0)
            .with_formula(a("A2"), "=A1");
        let mut host = MemoryHost::from_snapshot(&snapshot);
        host.fail_reads_of(a("A2"));
        host.fail_writes_to(a("A1"));

        assert!(host.read_value(&a("A2")).is_err());
        assert!(
            host.perturb_and_recalculate(&[(a("A1"), CellValue::Number(2.0))])
                .is_err()
        );
        assert!(
            host.perturb_and_recalculate(&[(a("A2"), CellValue::Number(2.0))])
                .is_err()
        );
    }

    #[test]
    fn read_workbook_reflects_current_values() {
        let snapshot = WorkbookSnapshot::new()
            .with_value(a("A1"), 2.0)
            .with_formula(a("A2"), "=A1*A1");
        let mut host = MemoryHost::from_snapshot(&snapshot);
        host.perturb_and_recalculate(&[(a("A1"), CellValue::Number(3.0))])
            .unwrap();

        let current = host.read_workbook().unwrap();
        let a2 = current.cell(&a("A2")).unwrap();
        assert_eq!(a2.formula.as_deref(), Some("=A1*A1"));
        assert_eq!(a2.value, CellValue::Number(9.0));
        assert_eq!(host.recalculations(), 2);
    }
}
