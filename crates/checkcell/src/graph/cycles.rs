//! Circular-reference detection.
//!
//! A walk marks nodes on its current path separately from nodes it has
//! finished with. Only an edge back onto the current path is a cycle; a node
//! reached twice through two different formulas (a diamond) is not.

use std::collections::HashMap;

use super::{DependencyGraph, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    OnPath,
    Done,
}

impl DependencyGraph {
    /// Whether any formula depends on itself, directly or transitively.
    #[must_use]
    pub fn contains_loop(&self) -> bool {
        self.find_cycle().is_some()
    }

    /// One circular dependency path, if the graph has any.
    ///
    /// The path is listed in dependency order: each node reads the one after
    /// it, and the last node reads the first.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<NodeId>> {
        let mut marks: HashMap<NodeId, Mark> = HashMap::new();

        for &root in self.formula_nodes.values() {
            if marks.contains_key(&root) {
                continue;
            }

            // Each frame holds a node and the inputs still to visit.
            let mut path: Vec<NodeId> = vec![root];
            let mut pending: Vec<Vec<NodeId>> = vec![self.inputs(root).collect()];
            marks.insert(root, Mark::OnPath);

            while let Some(frame) = pending.last_mut() {
                let Some(next) = frame.pop() else {
                    pending.pop();
                    if let Some(finished) = path.pop() {
                        marks.insert(finished, Mark::Done);
                    }
                    continue;
                };

                match marks.get(&next) {
                    Some(Mark::Done) => {}
                    Some(Mark::OnPath) => {
                        let start = path.iter().position(|&id| id == next).unwrap_or(0);
                        return Some(path.split_off(start));
                    }
                    None => {
                        marks.insert(next, Mark::OnPath);
                        path.push(next);
                        pending.push(self.inputs(next).collect());
                    }
                }
            }
        }

        None
    }

    /// Labels of the nodes on [`find_cycle`](Self::find_cycle)'s path.
    #[must_use]
    pub fn cycle_labels(&self) -> Option<Vec<String>> {
        self.find_cycle()
            .map(|cycle| cycle.into_iter().map(|id| self.node(id).label()).collect())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::address::Address;
    use crate::graph::GraphBuilder;
    use crate::snapshot::WorkbookSnapshot;

    fn build(cells: &[(&str, &str)]) -> crate::graph::DependencyGraph {
        let mut snapshot = WorkbookSnapshot::new();
        for (address, content) in cells {
            let address = Address::parse(address, "Sheet1").unwrap();
            snapshot = match content.parse::<f64>() {
                Ok(n) => snapshot.with_value(address, n),
                Err(_) => snapshot.with_formula(address, *content),
            };
        }
        GraphBuilder::default().build(&snapshot).unwrap()
    }

    #[rstest]
    #[case::diamond(&[("A1", "1"), ("B1", "=A1*2"), ("B2", "=A1+3"), ("C1", "=B1+B2")])]
    #[case::shared_range(&[("A1", "1"), ("A2", "2"), ("B1", "=SUM(A1:A2)"), ("B2", "=MAX(A1:A2)"), ("C1", "=B1-B2")])]
    #[case::chain(&[("A1", "1"), ("A2", "=A1"), ("A3", "=A2"), ("A4", "=A3")])]
    fn acyclic_graphs_have_no_loop(#[case] cells: &[(&str, &str)]) {
        let graph = build(cells);
        assert!(!graph.contains_loop());
        assert!(graph.find_cycle().is_none());
    }

    #[rstest]
    #[case::mutual(&[("A1", "=B1"), ("B1", "=A1")])]
    #[case::self_reference(&[("A1", "=A1+1")])]
    #[case::through_range(&[("A1", "1"), ("A2", "=SUM(A1:A3)"), ("A3", "2")])]
    #[case::long(&[("A1", "=A4"), ("A2", "=A1"), ("A3", "=A2"), ("A4", "=A3")])]
    fn cycles_are_detected(#[case] cells: &[(&str, &str)]) {
        let graph = build(cells);
        assert!(graph.contains_loop());
    }

    #[test]
    fn cycle_path_names_the_offending_cells() {
        let graph = build(&[("A1", "=B1"), ("B1", "=A1"), ("C1", "=A1")]);
        let mut labels = graph.cycle_labels().unwrap();
        labels.sort();
        assert_eq!(labels, ["Sheet1!A1", "Sheet1!B1"]);
    }
}
