//! CLI command implementations.

mod display;

pub mod analyze;
pub mod cycles;
pub mod graph;

use std::path::Path;

use anyhow::Context;
use checkcell::WorkbookSnapshot;

/// Load a snapshot, reporting skipped lines on stderr.
fn load_snapshot(path: &Path) -> anyhow::Result<WorkbookSnapshot> {
    let loaded = WorkbookSnapshot::load(path)
        .with_context(|| format!("failed to load snapshot {}", path.display()))?;
    display::print_warnings(&loaded.warnings);
    Ok(loaded.snapshot)
}
