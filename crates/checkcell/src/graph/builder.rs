//! Construction of the dependency graph from a workbook snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{DependencyGraph, Location, Node, NodeId, NodeKind, ParseIssue};
use crate::address::{Address, RangeRef};
use crate::error::{Error, Result};
use crate::formula::{self, Reference};
use crate::snapshot::WorkbookSnapshot;
use crate::value::CellValue;

/// What to do with a formula whose references cannot be extracted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParsePolicy {
    /// Treat the cell as a plain input and record a [`ParseIssue`].
    #[default]
    Downgrade,
    /// Abort construction with [`Error::GraphConstruction`].
    Strict,
}

/// Builds a [`DependencyGraph`] from a [`WorkbookSnapshot`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphBuilder {
    policy: ParsePolicy,
}

impl GraphBuilder {
    /// Builder with the given parse policy.
    #[must_use]
    pub fn new(policy: ParsePolicy) -> Self {
        Self { policy }
    }

    /// Build the graph.
    ///
    /// Every used cell becomes a node. Each formula gets an edge from every
    /// cell or range it references; a multi-cell range gets an edge from every
    /// used cell inside it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphConstruction`] for the first unparseable formula
    /// when the policy is [`ParsePolicy::Strict`].
    pub fn build(&self, snapshot: &WorkbookSnapshot) -> Result<DependencyGraph> {
        let mut graph = DependencyGraph::default();

        for cell in snapshot.cells() {
            let id = graph.add_node(Node {
                kind: NodeKind::InputCell,
                location: Location::Cell(cell.address.clone()),
                formula: cell.formula.clone(),
                value: cell.value.clone(),
                // Constant and downgraded formulas stay inputs but keep their text.
                dont_perturb: cell.formula.as_deref().is_some_and(formula::is_formula),
            });
            graph.cell_nodes.insert(cell.address.clone(), id);
        }

        for chart in snapshot.charts() {
            graph.charts.push(Node {
                kind: NodeKind::Chart,
                location: Location::Chart {
                    sheet: chart.sheet.clone(),
                    name: chart.name.clone(),
                },
                formula: None,
                value: CellValue::Empty,
                dont_perturb: true,
            });
        }

        let mut resolved: BTreeMap<Address, Vec<Reference>> = BTreeMap::new();
        for cell in snapshot.cells() {
            let Some(text) = cell.formula.as_deref() else {
                continue;
            };
            if !formula::is_formula(text) {
                continue;
            }
            match formula::extract_references(text, &cell.address.sheet) {
                Ok(references) if references.is_empty() => {
                    debug!(address = %cell.address, "Formula has no references, treating as input");
                }
                Ok(references) => {
                    resolved.insert(cell.address.clone(), references);
                }
                Err(error) => match self.policy {
                    ParsePolicy::Strict => {
                        return Err(Error::GraphConstruction {
                            address: cell.address.clone(),
                            formula: text.to_string(),
                            source: error,
                        });
                    }
                    ParsePolicy::Downgrade => {
                        warn!(address = %cell.address, formula = text, %error, "Treating unparseable formula as input");
                        graph.parse_issues.push(ParseIssue {
                            address: cell.address.clone(),
                            formula: text.to_string(),
                            error,
                        });
                    }
                },
            }
        }

        // Classify first so range construction sees final node kinds.
        for address in resolved.keys() {
            let id = graph.cell_nodes[address];
            graph.node_mut(id).kind = NodeKind::FormulaCell;
            graph.formula_nodes.insert(address.clone(), id);
        }

        for (address, references) in &resolved {
            let consumer = graph.formula_nodes[address];
            for reference in references {
                let source = match reference {
                    Reference::Cell(cell) => {
                        let id = cell_node(&mut graph, cell);
                        graph.input_ranges.entry(RangeRef::single(cell)).or_insert(id);
                        id
                    }
                    Reference::Range(range) => range_node(&mut graph, snapshot, range),
                };
                graph.link(source, consumer);
            }
        }

        debug!(
            cells = graph.cell_nodes.len(),
            formulas = graph.formula_nodes.len(),
            ranges = graph.range_nodes.len(),
            edges = graph.edge_count(),
            downgraded = graph.parse_issues.len(),
            "Built dependency graph"
        );
        Ok(graph)
    }
}

/// Node for a referenced cell, created as a blank input if the cell is unused.
fn cell_node(graph: &mut DependencyGraph, address: &Address) -> NodeId {
    if let Some(id) = graph.cell(address) {
        return id;
    }
    let id = graph.add_node(Node {
        kind: NodeKind::InputCell,
        location: Location::Cell(address.clone()),
        formula: None,
        value: CellValue::Empty,
        dont_perturb: false,
    });
    graph.cell_nodes.insert(address.clone(), id);
    id
}

/// Node for a multi-cell range, wired to every used cell inside it.
fn range_node(graph: &mut DependencyGraph, snapshot: &WorkbookSnapshot, range: &RangeRef) -> NodeId {
    if let Some(&id) = graph.range_nodes.get(range) {
        return id;
    }

    let members: Vec<NodeId> = (range.first_column..=range.last_column)
        .flat_map(|column| {
            snapshot.column_slice(&range.sheet, column, range.first_row, range.last_row)
        })
        .filter_map(|cell| graph.cell(&cell.address))
        .collect();
    let intermediate = members.iter().any(|&id| graph.node(id).is_formula());

    let id = graph.add_node(Node {
        kind: NodeKind::Range,
        location: Location::Range(range.clone()),
        formula: None,
        value: CellValue::Empty,
        dont_perturb: intermediate,
    });
    for member in members {
        graph.link(member, id);
    }
    graph.range_nodes.insert(range.clone(), id);
    graph.input_ranges.insert(range.clone(), id);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn a(text: &str) -> Address {
        Address::parse(text, "Sheet1").unwrap()
    }

    fn column(values: &[f64]) -> WorkbookSnapshot {
        let mut snapshot = WorkbookSnapshot::new();
        for (row, value) in (1..).zip(values) {
            snapshot.insert(Address::new("Sheet1", 1, row), None, CellValue::Number(*value));
        }
        snapshot
    }

    #[test]
    fn duplicate_references_create_one_edge() {
        let snapshot = WorkbookSnapshot::new()
            .with_value(a("A1"), 2.0)
            .with_formula(a("B1"), "=A1*A1+$A$1");
        let graph = GraphBuilder::default().build(&snapshot).unwrap();
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn range_reads_used_cells_only() {
        let snapshot = column(&[1.0, 2.0, 3.0]).with_formula(a("B1"), "=SUM(A1:A10)");
        let graph = GraphBuilder::default().build(&snapshot).unwrap();

        let range = graph
            .input_range(&RangeRef::parse("A1:A10", "Sheet1").unwrap())
            .unwrap();
        assert_eq!(graph.node(range).kind, NodeKind::Range);
        assert_eq!(graph.inputs(range).count(), 3);
        assert!(!graph.node(range).dont_perturb);
    }

    #[test]
    fn range_containing_formula_is_intermediate() {
        let snapshot = column(&[1.0, 2.0])
            .with_formula(a("A3"), "=A1+A2")
            .with_formula(a("B1"), "=SUM(A1:A3)");
        let graph = GraphBuilder::default().build(&snapshot).unwrap();

        let range = graph
            .input_range(&RangeRef::parse("A1:A3", "Sheet1").unwrap())
            .unwrap();
        assert!(graph.node(range).dont_perturb);
    }

    #[test]
    fn blank_referenced_cell_becomes_empty_input() {
        let snapshot = WorkbookSnapshot::new().with_formula(a("B1"), "=C7*2");
        let graph = GraphBuilder::default().build(&snapshot).unwrap();

        let c7 = graph.cell(&a("C7")).unwrap();
        assert_eq!(graph.node(c7).kind, NodeKind::InputCell);
        assert_eq!(graph.node(c7).value, CellValue::Empty);
    }

    #[test]
    fn cross_sheet_references_resolve_to_their_sheet() {
        let snapshot = WorkbookSnapshot::new()
            .with_value(Address::new("Data", 1, 1), 4.0)
            .with_formula(a("A1"), "=Data!A1*2");
        let graph = GraphBuilder::default().build(&snapshot).unwrap();

        let data = graph.cell(&Address::new("Data", 1, 1)).unwrap();
        let formula = graph.cell(&a("A1")).unwrap();
        assert!(graph.outputs(data).any(|id| id == formula));
    }

    #[rstest]
    #[case::constant_formula("=1+2")]
    #[case::text_only("=\"A1\"")]
    fn formula_without_references_is_input(#[case] text: &str) {
        let snapshot = WorkbookSnapshot::new().with_formula(a("A1"), text);
        let graph = GraphBuilder::default().build(&snapshot).unwrap();

        let id = graph.cell(&a("A1")).unwrap();
        assert_eq!(graph.node(id).kind, NodeKind::InputCell);
        assert!(graph.node(id).dont_perturb);
        assert_eq!(graph.formula_nodes().count(), 0);
    }

    #[rstest]
    #[case::stray_text("=A1 ~ total")]
    #[case::unclosed_call("=SUM(A1")]
    #[case::whole_column("=SUM(A:A)")]
    #[case::external_workbook("=[Book1]Sheet1!A1*2")]
    fn downgrade_records_parse_issue(#[case] text: &str) {
        let snapshot = WorkbookSnapshot::new()
            .with_value(a("A1"), 1.0)
            .with_formula(a("B1"), text);
        let graph = GraphBuilder::new(ParsePolicy::Downgrade)
            .build(&snapshot)
            .unwrap();

        assert_eq!(graph.parse_issues().len(), 1);
        assert_eq!(graph.parse_issues()[0].address, a("B1"));
        let b1 = graph.cell(&a("B1")).unwrap();
        assert_eq!(graph.node(b1).kind, NodeKind::InputCell);
        assert_eq!(graph.node(b1).formula.as_deref(), Some(text));
        assert!(graph.node(b1).dont_perturb);
        assert_eq!(graph.edge_count(), 0);
    }

    #[rstest]
    #[case::stray_text("=A1 ~ total")]
    #[case::unclosed_call("=SUM(A1")]
    #[case::whole_row("=SUM(1:1)")]
    fn strict_policy_rejects_unparseable_formula(#[case] text: &str) {
        let snapshot = WorkbookSnapshot::new().with_formula(a("B1"), text);
        let err = GraphBuilder::new(ParsePolicy::Strict)
            .build(&snapshot)
            .unwrap_err();
        assert!(matches!(err, Error::GraphConstruction { ref address, .. } if *address == a("B1")));
    }

    #[test]
    fn plain_text_cell_is_not_a_formula() {
        let snapshot = WorkbookSnapshot::new()
            .with_value(a("A1"), "total A1+A2")
            .with_formula(a("B1"), "=A1");
        let graph = GraphBuilder::new(ParsePolicy::Strict)
            .build(&snapshot)
            .unwrap();

        assert!(graph.parse_issues().is_empty());
        assert_eq!(graph.formula_nodes().count(), 1);
    }

    #[test]
    fn charts_stay_out_of_the_dag() {
        let mut snapshot = column(&[1.0]);
        snapshot.add_chart(crate::snapshot::ChartRecord {
            sheet: "Sheet1".into(),
            name: "Chart 1".into(),
        });
        let graph = GraphBuilder::default().build(&snapshot).unwrap();

        assert_eq!(graph.charts().len(), 1);
        assert_eq!(graph.node_count(), 1);
    }
}
