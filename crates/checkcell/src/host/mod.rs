//! The boundary between the analysis and whatever evaluates the workbook.
//!
//! The analysis never recalculates formulas itself. It reads the workbook,
//! asks the host to write perturbed inputs and recalculate, and reads values
//! back. [`MemoryHost`] implements the contract in-process.

mod eval;
mod memory;

pub use memory::MemoryHost;

use crate::address::Address;
use crate::error::HostError;
use crate::snapshot::WorkbookSnapshot;
use crate::value::CellValue;

/// A synchronous spreadsheet evaluator.
///
/// Implementations are used by one caller at a time.
pub trait HostEvaluator {
    /// Current contents of every used cell, plus the chart list.
    ///
    /// # Errors
    ///
    /// Returns an error if the workbook cannot be read.
    fn read_workbook(&self) -> Result<WorkbookSnapshot, HostError>;

    /// Write `writes`, then recalculate. Returns once dependent formulas have
    /// settled.
    ///
    /// # Errors
    ///
    /// Returns an error if a write is rejected or recalculation fails. The
    /// workbook may then hold some of the writes.
    fn perturb_and_recalculate(&mut self, writes: &[(Address, CellValue)]) -> Result<(), HostError>;

    /// Current value of one cell.
    ///
    /// # Errors
    ///
    /// Returns an error if the cell cannot be read.
    fn read_value(&self, address: &Address) -> Result<CellValue, HostError>;
}

impl<H: HostEvaluator + ?Sized> HostEvaluator for &mut H {
    fn read_workbook(&self) -> Result<WorkbookSnapshot, HostError> {
        (**self).read_workbook()
    }

    fn perturb_and_recalculate(&mut self, writes: &[(Address, CellValue)]) -> Result<(), HostError> {
        (**self).perturb_and_recalculate(writes)
    }

    fn read_value(&self, address: &Address) -> Result<CellValue, HostError> {
        (**self).read_value(address)
    }
}
