//! Terminal-node and reachability queries.
//!
//! Reachability walks run downward (towards inputs) from every formula node
//! with one work list and one visited set per call, so shared sub-graphs are
//! expanded once and each call is O(nodes + edges).

use std::collections::HashSet;

use super::{DependencyGraph, NodeId};

impl DependencyGraph {
    /// Formula nodes to score.
    ///
    /// With `all`, every formula node; otherwise only formulas nothing else
    /// reads. Returned in address order.
    #[must_use]
    pub fn terminal_formula_nodes(&self, all: bool) -> Vec<NodeId> {
        self.formula_nodes
            .values()
            .copied()
            .filter(|&id| all || self.has_no_outputs(id))
            .collect()
    }

    /// Referenced inputs eligible for perturbation, in range order.
    ///
    /// Frozen nodes, formula cells and intermediate ranges are excluded.
    #[must_use]
    pub fn terminal_input_nodes(&self) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        self.input_ranges
            .values()
            .copied()
            .filter(|&id| {
                let node = self.node(id);
                !node.dont_perturb && !node.is_formula() && seen.insert(id)
            })
            .collect()
    }

    /// Non-formula cells with no inputs reachable from any formula, in
    /// address order.
    #[must_use]
    pub fn terminal_input_cells(&self) -> Vec<NodeId> {
        self.reachable_cells(|graph, id| !graph.node(id).is_formula() && graph.has_no_inputs(id))
    }

    /// Every cell reachable from a formula, the formulas included, in address
    /// order. Range nodes are traversed but not returned.
    #[must_use]
    pub fn all_computation_cells(&self) -> Vec<NodeId> {
        self.reachable_cells(|_, _| true)
    }

    fn reachable_cells(&self, keep: impl Fn(&Self, NodeId) -> bool) -> Vec<NodeId> {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut work: Vec<NodeId> = self.formula_nodes.values().copied().collect();

        while let Some(id) = work.pop() {
            if !visited.insert(id) {
                continue;
            }
            work.extend(self.inputs(id).filter(|input| !visited.contains(input)));
        }

        let mut cells: Vec<NodeId> = visited
            .into_iter()
            .filter(|&id| self.node(id).is_cell() && keep(self, id))
            .collect();
        cells.sort_by(|&a, &b| self.node(a).address().cmp(&self.node(b).address()));
        cells
    }

    /// Formula nodes that read `id` directly or transitively.
    #[must_use]
    pub fn downstream_formulas(&self, id: NodeId) -> Vec<NodeId> {
        let mut visited: HashSet<NodeId> = HashSet::from([id]);
        let mut work = vec![id];
        let mut found = Vec::new();

        while let Some(current) = work.pop() {
            for output in self.outputs(current) {
                if visited.insert(output) {
                    if self.node(output).is_formula() {
                        found.push(output);
                    }
                    work.push(output);
                }
            }
        }

        found.sort_by(|&a, &b| self.node(a).address().cmp(&self.node(b).address()));
        found
    }
}
