//! Dependency graph over cells, ranges and formulas.
//!
//! Edges point from a data source to its consumer: `A -> B` means `B` reads
//! `A`, so `A` is one of `inputs(B)` and `B` is one of `outputs(A)`. Both views
//! come from the same petgraph edge list, which keeps them symmetric.
//!
//! - [`builder`] constructs the graph from a [`WorkbookSnapshot`](crate::snapshot::WorkbookSnapshot)
//! - [`queries`] answers the terminal-node and reachability questions
//! - [`cycles`] detects circular references

pub mod builder;
pub mod cycles;
pub mod queries;

use std::collections::BTreeMap;
use std::fmt;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;

use crate::address::{Address, RangeRef};
use crate::formula::FormulaError;
use crate::value::CellValue;

pub use builder::{GraphBuilder, ParsePolicy};

/// Stable handle to a node in a [`DependencyGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) NodeIndex);

impl NodeId {
    /// Position of the node in the underlying petgraph graph.
    #[must_use]
    pub fn index(self) -> usize {
        self.0.index()
    }
}

/// What a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    /// A cell whose value is computed from other nodes.
    FormulaCell,
    /// A cell holding an entered value.
    InputCell,
    /// A multi-cell range read by at least one formula.
    Range,
    /// A chart object. Charts live outside the DAG.
    Chart,
}

/// Where a node lives in the workbook.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Location {
    /// A single cell.
    Cell(Address),
    /// A rectangular range.
    Range(RangeRef),
    /// A chart on a sheet.
    Chart {
        /// Sheet holding the chart.
        sheet: String,
        /// Chart name.
        name: String,
    },
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cell(address) => address.fmt(f),
            Self::Range(range) => range.fmt(f),
            Self::Chart { sheet, name } => write!(f, "{sheet}[chart {name}]"),
        }
    }
}

/// A vertex of the dependency graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Node classification.
    pub kind: NodeKind,
    /// Workbook location.
    pub location: Location,
    /// Formula text for cells that hold one, including downgraded cells.
    pub formula: Option<String>,
    /// Value cached from the snapshot.
    pub value: CellValue,
    /// Excluded from perturbation.
    pub dont_perturb: bool,
}

impl Node {
    /// Whether the node is computed from other nodes.
    #[must_use]
    pub fn is_formula(&self) -> bool {
        self.kind == NodeKind::FormulaCell
    }

    /// Whether the cell holds formula text, even if it was classified as an
    /// input. Such cells are never written to.
    #[must_use]
    pub fn holds_formula_text(&self) -> bool {
        self.formula.as_deref().is_some_and(crate::formula::is_formula)
    }

    /// Whether the node is a single cell (formula or input).
    #[must_use]
    pub fn is_cell(&self) -> bool {
        matches!(self.kind, NodeKind::FormulaCell | NodeKind::InputCell)
    }

    /// The cell address, for cell nodes.
    #[must_use]
    pub fn address(&self) -> Option<&Address> {
        match &self.location {
            Location::Cell(address) => Some(address),
            _ => None,
        }
    }

    /// Display label, e.g. `Sheet1!A3` or `Sheet1!A1:A9`.
    #[must_use]
    pub fn label(&self) -> String {
        self.location.to_string()
    }
}

/// A formula that could not be parsed and was downgraded to an input cell.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseIssue {
    /// The cell holding the formula.
    pub address: Address,
    /// The formula text.
    pub formula: String,
    /// What the parser rejected.
    pub error: FormulaError,
}

impl fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.address, self.formula, self.error)
    }
}

/// Summary counts for a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    /// Cell nodes (formula and input).
    pub cells: usize,
    /// Formula cells.
    pub formulas: usize,
    /// Input cells.
    pub inputs: usize,
    /// Multi-cell range nodes.
    pub ranges: usize,
    /// Dependency edges.
    pub edges: usize,
    /// Charts tracked outside the DAG.
    pub charts: usize,
    /// Formulas downgraded to inputs.
    pub parse_issues: usize,
}

/// The dependency graph of one workbook snapshot.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<Node, ()>,
    input_ranges: BTreeMap<RangeRef, NodeId>,
    formula_nodes: BTreeMap<Address, NodeId>,
    cell_nodes: BTreeMap<Address, NodeId>,
    range_nodes: BTreeMap<RangeRef, NodeId>,
    charts: Vec<Node>,
    parse_issues: Vec<ParseIssue>,
}

impl DependencyGraph {
    /// The node behind `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` belongs to a different graph.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.graph[id.0]
    }

    /// Nodes that `id` reads.
    pub fn inputs(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph
            .neighbors_directed(id.0, Direction::Incoming)
            .map(NodeId)
    }

    /// Nodes that read `id`.
    pub fn outputs(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph
            .neighbors_directed(id.0, Direction::Outgoing)
            .map(NodeId)
    }

    /// Whether `id` has no readers.
    #[must_use]
    pub fn has_no_outputs(&self, id: NodeId) -> bool {
        self.outputs(id).next().is_none()
    }

    /// Whether `id` reads nothing.
    #[must_use]
    pub fn has_no_inputs(&self, id: NodeId) -> bool {
        self.inputs(id).next().is_none()
    }

    /// Cell node at `address`, if the cell is used or referenced.
    #[must_use]
    pub fn cell(&self, address: &Address) -> Option<NodeId> {
        self.cell_nodes.get(address).copied()
    }

    /// Node standing for `range`, if some formula reads it.
    ///
    /// Single-cell ranges resolve to the referenced cell node.
    #[must_use]
    pub fn input_range(&self, range: &RangeRef) -> Option<NodeId> {
        self.input_ranges.get(range).copied()
    }

    /// Referenced ranges and the nodes standing for them, in range order.
    pub fn input_ranges(&self) -> impl Iterator<Item = (&RangeRef, NodeId)> {
        self.input_ranges.iter().map(|(range, &id)| (range, id))
    }

    /// Formula cells in address order.
    pub fn formula_nodes(&self) -> impl Iterator<Item = (&Address, NodeId)> {
        self.formula_nodes.iter().map(|(address, &id)| (address, id))
    }

    /// Every cell node in address order.
    pub fn cell_nodes(&self) -> impl Iterator<Item = (&Address, NodeId)> {
        self.cell_nodes.iter().map(|(address, &id)| (address, id))
    }

    /// All node handles in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        self.graph.node_indices().map(NodeId)
    }

    /// Charts found in the snapshot.
    #[must_use]
    pub fn charts(&self) -> &[Node] {
        &self.charts
    }

    /// Formulas that were downgraded to inputs.
    #[must_use]
    pub fn parse_issues(&self) -> &[ParseIssue] {
        &self.parse_issues
    }

    /// Number of nodes in the DAG (charts excluded).
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of dependency edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Read-only view of the underlying petgraph graph.
    #[must_use]
    pub fn as_petgraph(&self) -> &DiGraph<Node, ()> {
        &self.graph
    }

    /// Exclude the cell at `address` from perturbation.
    ///
    /// Returns `false` when the graph has no such cell.
    pub fn freeze(&mut self, address: &Address) -> bool {
        match self.cell(address) {
            Some(id) => {
                self.graph[id.0].dont_perturb = true;
                true
            }
            None => false,
        }
    }

    /// Summary counts.
    #[must_use]
    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            edges: self.graph.edge_count(),
            charts: self.charts.len(),
            parse_issues: self.parse_issues.len(),
            ..GraphStats::default()
        };
        for node in self.graph.node_weights() {
            match node.kind {
                NodeKind::FormulaCell => {
                    stats.cells += 1;
                    stats.formulas += 1;
                }
                NodeKind::InputCell => {
                    stats.cells += 1;
                    stats.inputs += 1;
                }
                NodeKind::Range => stats.ranges += 1,
                NodeKind::Chart => {}
            }
        }
        stats
    }

    /// Graphviz rendering of every formula and what it reads.
    ///
    /// Cells that neither read nor are read by anything are left out.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph checkcell {\n    rankdir=LR;\n");
        for id in self.node_ids() {
            if self.has_no_inputs(id) && self.has_no_outputs(id) {
                continue;
            }
            let node = self.node(id);
            let shape = match node.kind {
                NodeKind::FormulaCell => "box",
                NodeKind::Range => "folder",
                NodeKind::InputCell | NodeKind::Chart => "ellipse",
            };
            let style = if node.dont_perturb { ",style=dashed" } else { "" };
            out.push_str(&format!(
                "    n{} [label=\"{}\",shape={shape}{style}];\n",
                id.index(),
                node.label().replace('"', "\\\"")
            ));
        }
        for edge in self.graph.raw_edges() {
            out.push_str(&format!(
                "    n{} -> n{};\n",
                edge.source().index(),
                edge.target().index()
            ));
        }
        out.push_str("}\n");
        out
    }

    fn add_node(&mut self, node: Node) -> NodeId {
        NodeId(self.graph.add_node(node))
    }

    /// Add `source -> consumer`, leaving an existing edge in place.
    fn link(&mut self, source: NodeId, consumer: NodeId) {
        self.graph.update_edge(source.0, consumer.0, ());
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.graph[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::WorkbookSnapshot;

    fn a(text: &str) -> Address {
        Address::parse(text, "Sheet1").unwrap()
    }

    fn sum_graph() -> DependencyGraph {
        let snapshot = WorkbookSnapshot::new()
            .with_value(a("A1"), 5.0)
            .with_value(a("A2"), 10.0)
            .with_formula(a("A3"), "=A1+A2");
        GraphBuilder::default().build(&snapshot).unwrap()
    }

    #[test]
    fn edges_are_symmetric() {
        let graph = sum_graph();
        let a1 = graph.cell(&a("A1")).unwrap();
        let a3 = graph.cell(&a("A3")).unwrap();

        assert_eq!(graph.outputs(a1).collect::<Vec<_>>(), [a3]);
        assert!(graph.inputs(a3).any(|id| id == a1));
        for id in graph.node_ids() {
            for output in graph.outputs(id) {
                assert!(graph.inputs(output).any(|input| input == id));
            }
        }
    }

    #[test]
    fn stats_count_node_kinds() {
        let stats = sum_graph().stats();
        assert_eq!(stats.cells, 3);
        assert_eq!(stats.formulas, 1);
        assert_eq!(stats.inputs, 2);
        assert_eq!(stats.ranges, 0);
        assert_eq!(stats.edges, 2);
    }

    #[test]
    fn freeze_marks_cell() {
        let mut graph = sum_graph();
        assert!(graph.freeze(&a("A2")));
        assert!(!graph.freeze(&a("Z99")));
        let a2 = graph.cell(&a("A2")).unwrap();
        assert!(graph.node(a2).dont_perturb);
    }

    #[test]
    fn dot_output_lists_nodes_and_edges() {
        let dot = sum_graph().to_dot();
        assert!(dot.starts_with("digraph checkcell {"));
        assert!(dot.contains("label=\"Sheet1!A3\",shape=box"));
        assert_eq!(dot.matches("->").count(), 2);
        assert_eq!(dot.lines().filter(|line| line.ends_with("];")).count(), 3);
        assert!(dot.ends_with(";\n}\n"));
    }
}
