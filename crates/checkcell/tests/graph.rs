//! Integration tests for dependency graph construction, queries and cycle
//! detection through the public API.

use std::collections::BTreeSet;

use checkcell::{Address, DependencyGraph, GraphBuilder, NodeId, WorkbookSnapshot};
use proptest::prelude::*;
use rstest::rstest;

fn a(text: &str) -> Address {
    Address::parse(text, "Sheet1").unwrap()
}

fn build(cells: &[(&str, &str)]) -> DependencyGraph {
    let mut snapshot = WorkbookSnapshot::new();
    for (address, content) in cells {
        snapshot = match content.parse::<f64>() {
            Ok(n) => snapshot.with_value(a(address), n),
            Err(_) => snapshot.with_formula(a(address), *content),
        };
    }
    GraphBuilder::default().build(&snapshot).unwrap()
}

fn labels(graph: &DependencyGraph, ids: &[NodeId]) -> Vec<String> {
    ids.iter().map(|&id| graph.node(id).label()).collect()
}

/// ```text
///        A1
///       /  \
///      B1   B2
///       \  /
///        C1
/// ```
fn diamond() -> DependencyGraph {
    build(&[("A1", "4"), ("B1", "=A1*2"), ("B2", "=A1-1"), ("C1", "=B1+B2")])
}

#[test]
fn end_to_end_classification() {
    let graph = build(&[("A1", "5"), ("A2", "10"), ("A3", "=A1+A2")]);

    assert_eq!(
        labels(&graph, &graph.terminal_input_nodes()),
        ["Sheet1!A1", "Sheet1!A2"]
    );
    assert_eq!(
        labels(&graph, &graph.terminal_formula_nodes(false)),
        ["Sheet1!A3"]
    );
}

#[test]
fn diamond_is_not_a_cycle() {
    let graph = diamond();
    assert!(!graph.contains_loop());
    assert_eq!(labels(&graph, &graph.terminal_input_cells()), ["Sheet1!A1"]);
    assert_eq!(
        labels(&graph, &graph.all_computation_cells()),
        ["Sheet1!A1", "Sheet1!B1", "Sheet1!B2", "Sheet1!C1"]
    );
}

#[test]
fn mutual_reference_is_a_cycle() {
    let graph = build(&[("A1", "=B1"), ("B1", "=A1")]);
    assert!(graph.contains_loop());
    let cycle: BTreeSet<String> = graph.cycle_labels().unwrap().into_iter().collect();
    assert_eq!(
        cycle,
        BTreeSet::from(["Sheet1!A1".to_string(), "Sheet1!B1".to_string()])
    );
}

#[rstest]
#[case::multi_area("=SUM(A1:A2,C1:C2)", &["Sheet1!A1:A2", "Sheet1!C1:C2"])]
#[case::cross_sheet("=Data!B2*2", &["Data!B2"])]
#[case::quoted_sheet("=SUM('My Data'!A1:A2)", &["'My Data'!A1:A2"])]
#[case::anchored("=$A$1+A$1+$A1", &["Sheet1!A1"])]
fn references_become_input_ranges(#[case] formula: &str, #[case] expected: &[&str]) {
    let graph = build(&[("E1", formula)]);
    let ranges: BTreeSet<String> = graph.input_ranges().map(|(r, _)| r.to_string()).collect();
    let expected: BTreeSet<String> = expected.iter().map(ToString::to_string).collect();
    assert_eq!(ranges, expected);
}

#[test]
fn intermediate_range_is_not_a_terminal_input() {
    let graph = build(&[
        ("A1", "1"),
        ("A2", "2"),
        ("A3", "=A1*A2"),
        ("B1", "=SUM(A1:A3)"),
    ]);
    assert_eq!(
        labels(&graph, &graph.terminal_input_nodes()),
        ["Sheet1!A1", "Sheet1!A2"]
    );
}

#[test]
fn frozen_cell_is_not_a_terminal_input() {
    let mut graph = build(&[("A1", "5"), ("A2", "10"), ("A3", "=A1+A2")]);
    graph.freeze(&a("A2"));
    assert_eq!(labels(&graph, &graph.terminal_input_nodes()), ["Sheet1!A1"]);
}

/// A small workbook in column A: each row holds a number or a formula
/// reading a set of rows, sometimes through a range.
fn workbook() -> impl Strategy<Value = Vec<Option<(Vec<u32>, bool)>>> {
    prop::collection::vec(
        prop::option::of((prop::collection::vec(1u32..=8, 1..4), any::<bool>())),
        1..=8,
    )
}

fn to_graph(rows: &[Option<(Vec<u32>, bool)>]) -> DependencyGraph {
    let mut snapshot = WorkbookSnapshot::new();
    for (row, cell) in (1u32..).zip(rows) {
        let address = Address::new("Sheet1", 1, row);
        snapshot = match cell {
            None => snapshot.with_value(address, f64::from(row)),
            Some((refs, as_range)) if *as_range && refs.len() >= 2 => {
                let lo = refs.iter().min().copied().unwrap_or(1);
                let hi = refs.iter().max().copied().unwrap_or(1);
                snapshot.with_formula(address, format!("=SUM(A{lo}:A{hi})"))
            }
            Some((refs, _)) => {
                let terms: Vec<String> = refs.iter().map(|r| format!("A{r}")).collect();
                snapshot.with_formula(address, format!("={}", terms.join("+")))
            }
        };
    }
    GraphBuilder::default().build(&snapshot).unwrap()
}

proptest! {
    #[test]
    fn cycle_detection_agrees_with_petgraph(rows in workbook()) {
        let graph = to_graph(&rows);
        prop_assert_eq!(
            graph.contains_loop(),
            petgraph::algo::is_cyclic_directed(graph.as_petgraph())
        );
    }

    #[test]
    fn terminal_formulas_are_exactly_unread_formulas(rows in workbook()) {
        let graph = to_graph(&rows);
        let terminal: BTreeSet<NodeId> = graph.terminal_formula_nodes(false).into_iter().collect();
        for (_, id) in graph.formula_nodes() {
            prop_assert_eq!(terminal.contains(&id), graph.outputs(id).next().is_none());
        }
    }

    #[test]
    fn terminal_input_cells_are_non_formula_leaves_of_computation(rows in workbook()) {
        let graph = to_graph(&rows);
        let all: BTreeSet<NodeId> = graph.all_computation_cells().into_iter().collect();
        for id in graph.terminal_input_cells() {
            prop_assert!(all.contains(&id));
            prop_assert!(!graph.node(id).is_formula());
            prop_assert!(graph.inputs(id).next().is_none());
        }
    }

    #[test]
    fn edges_are_symmetric(rows in workbook()) {
        let graph = to_graph(&rows);
        for id in graph.node_ids() {
            for output in graph.outputs(id) {
                prop_assert!(graph.inputs(output).any(|input| input == id));
            }
            for input in graph.inputs(id) {
                prop_assert!(graph.outputs(input).any(|output| output == id));
            }
        }
    }
}
