//! Dependency graph between value nodes.
//!
//! Design:
//! - Forward edges: node -> inputs it still waits for
//! - Reverse edges: input -> nodes waiting for it
//! - Invariant: edges and reverse_edges must be kept in sync
//!
//! Only *unsettled* inputs are tracked. A node whose forward set becomes
//! empty is ready to run. Ids are monotonic, so `BTreeSet` iteration follows
//! registration order and propagation order is reproducible.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::ValueId;

#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Forward edges: node -> inputs it waits for
    edges: BTreeMap<ValueId, BTreeSet<ValueId>>,

    /// Reverse edges: input -> nodes waiting for it
    reverse_edges: BTreeMap<ValueId, BTreeSet<ValueId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// `node` waits for `input`.
    pub fn add_dependency(&mut self, node: ValueId, input: ValueId) {
        self.edges.entry(node).or_default().insert(input);
        self.reverse_edges.entry(input).or_default().insert(node);
    }

    /// `node` no longer waits for `input` (the input settled).
    pub fn remove_dependency(&mut self, node: ValueId, input: ValueId) {
        if let Entry::Occupied(mut e) = self.edges.entry(node) {
            e.get_mut().remove(&input);
            if e.get().is_empty() {
                e.remove_entry();
            }
        }
        if let Entry::Occupied(mut e) = self.reverse_edges.entry(input) {
            e.get_mut().remove(&node);
            if e.get().is_empty() {
                e.remove_entry();
            }
        }
    }

    /// Drop every edge out of `node`. Used when the node fails early and
    /// must not be woken by its remaining inputs.
    pub fn clear_dependencies(&mut self, node: ValueId) {
        for input in self.dependencies(node) {
            self.remove_dependency(node, input);
        }
    }

    /// Nodes waiting for `input`, in registration order.
    ///
    /// Includes nodes that still wait for other inputs too; the caller checks
    /// `has_dependencies` after removing the edge.
    pub fn dependents(&self, input: ValueId) -> Vec<ValueId> {
        self.reverse_edges
            .get(&input)
            .map(|waiting| waiting.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_dependencies(&self, node: ValueId) -> bool {
        self.edges
            .get(&node)
            .map(|deps| !deps.is_empty())
            .unwrap_or(false)
    }

    pub fn dependencies(&self, node: ValueId) -> Vec<ValueId> {
        self.edges
            .get(&node)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty() && self.reverse_edges.is_empty()
    }
}
