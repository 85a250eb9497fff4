// src/graph/mod.rs
//! The header dependency graph and the algorithms over it.

pub mod betweenness;
pub mod build;
pub mod feedback;
pub mod layers;
pub mod pagerank;
pub mod scc;

pub use build::{GraphBuild, build_from_cooccurrence, build_from_direct, scan_header_includes};

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Directed graph over canonical paths. Edge u -> v means "u includes v".
///
/// No self-loops; parallel edges collapse to one. BTree storage keeps every
/// iteration order sorted by canonical path, which is what makes the whole
/// pipeline deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeGraph {
    nodes: BTreeSet<PathBuf>,
    edges: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
}

impl IncludeGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: PathBuf) {
        self.nodes.insert(node);
    }

    /// Adds u -> v, ignoring self-loops. Both endpoints become nodes.
    pub fn add_edge(&mut self, from: PathBuf, to: PathBuf) {
        if from == to {
            return;
        }
        self.nodes.insert(from.clone());
        self.nodes.insert(to.clone());
        self.edges.entry(from).or_default().insert(to);
    }

    pub fn remove_edge(&mut self, from: &Path, to: &Path) -> bool {
        let Some(targets) = self.edges.get_mut(from) else {
            return false;
        };
        let removed = targets.remove(to);
        if targets.is_empty() {
            self.edges.remove(from);
        }
        removed
    }

    #[must_use]
    pub fn contains_node(&self, node: &Path) -> bool {
        self.nodes.contains(node)
    }

    #[must_use]
    pub fn has_edge(&self, from: &Path, to: &Path) -> bool {
        self.edges.get(from).is_some_and(|t| t.contains(to))
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PathBuf> {
        self.nodes.iter()
    }

    /// Direct includes of `from`, in sorted order.
    pub fn out_edges(&self, from: &Path) -> impl Iterator<Item = &PathBuf> {
        self.edges.get(from).into_iter().flatten()
    }

    #[must_use]
    pub fn out_degree(&self, from: &Path) -> usize {
        self.edges.get(from).map_or(0, BTreeSet::len)
    }

    /// All edges as (from, to) pairs, sorted.
    pub fn edge_pairs(&self) -> impl Iterator<Item = (&PathBuf, &PathBuf)> {
        self.edges
            .iter()
            .flat_map(|(from, targets)| targets.iter().map(move |to| (from, to)))
    }

    /// Includer -> included inverted: included -> set of direct includers.
    #[must_use]
    pub fn reverse_edges(&self) -> BTreeMap<PathBuf, BTreeSet<PathBuf>> {
        let mut reverse: BTreeMap<PathBuf, BTreeSet<PathBuf>> = BTreeMap::new();
        for (from, to) in self.edge_pairs() {
            reverse.entry(to.clone()).or_default().insert(from.clone());
        }
        reverse
    }

    /// Everything reachable from `start` (excluding `start` itself).
    #[must_use]
    pub fn descendants(&self, start: &Path) -> BTreeSet<PathBuf> {
        self.reach(start, |g, n| g.edges.get(n))
    }

    /// Everything that reaches `target` (excluding `target` itself), i.e.
    /// every header whose text transitively includes it.
    #[must_use]
    pub fn ancestors_via(
        &self,
        target: &Path,
        reverse: &BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    ) -> BTreeSet<PathBuf> {
        let mut seen: BTreeSet<PathBuf> = BTreeSet::new();
        let mut queue: VecDeque<&PathBuf> = reverse.get(target).into_iter().flatten().collect();
        while let Some(node) = queue.pop_front() {
            if seen.insert(node.clone()) {
                queue.extend(reverse.get(node).into_iter().flatten());
            }
        }
        seen.remove(target);
        seen
    }

    #[must_use]
    pub fn is_reachable(&self, from: &Path, to: &Path) -> bool {
        if from == to {
            return true;
        }
        let mut seen: BTreeSet<&PathBuf> = BTreeSet::new();
        let mut queue: VecDeque<&PathBuf> = self.edges.get(from).into_iter().flatten().collect();
        while let Some(node) = queue.pop_front() {
            if node.as_path() == to {
                return true;
            }
            if seen.insert(node) {
                queue.extend(self.edges.get(node.as_path()).into_iter().flatten());
            }
        }
        false
    }

    /// Subgraph induced by `keep`, preserving edges between kept nodes.
    #[must_use]
    pub fn induced(&self, keep: &BTreeSet<PathBuf>) -> Self {
        let mut sub = Self::new();
        for node in keep {
            if self.nodes.contains(node) {
                sub.add_node(node.clone());
            }
        }
        for (from, to) in self.edge_pairs() {
            if keep.contains(from) && keep.contains(to) {
                sub.add_edge(from.clone(), to.clone());
            }
        }
        sub
    }

    /// True when the graph has no directed cycle.
    #[must_use]
    pub fn is_acyclic(&self) -> bool {
        scc::strongly_connected(self)
            .components
            .iter()
            .all(|c| c.len() == 1)
    }

    fn reach<'a, F>(&'a self, start: &Path, next: F) -> BTreeSet<PathBuf>
    where
        F: Fn(&'a Self, &Path) -> Option<&'a BTreeSet<PathBuf>>,
    {
        let mut seen: BTreeSet<PathBuf> = BTreeSet::new();
        let mut queue: VecDeque<&PathBuf> = next(self, start).into_iter().flatten().collect();
        while let Some(node) = queue.pop_front() {
            if seen.insert(node.clone()) {
                queue.extend(next(self, node).into_iter().flatten());
            }
        }
        seen.remove(start);
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    fn chain() -> IncludeGraph {
        let mut g = IncludeGraph::new();
        g.add_edge(p("a.h"), p("b.h"));
        g.add_edge(p("b.h"), p("c.h"));
        g
    }

    #[test]
    fn self_loops_are_rejected() {
        let mut g = IncludeGraph::new();
        g.add_edge(p("a.h"), p("a.h"));
        assert_eq!(g.edge_count(), 0);
        assert_eq!(g.node_count(), 0);
    }

    #[test]
    fn parallel_edges_collapse() {
        let mut g = chain();
        g.add_edge(p("a.h"), p("b.h"));
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn descendants_and_reachability() {
        let g = chain();
        let desc = g.descendants(&p("a.h"));
        assert!(desc.contains(&p("b.h")) && desc.contains(&p("c.h")));
        assert!(g.is_reachable(&p("a.h"), &p("c.h")));
        assert!(!g.is_reachable(&p("c.h"), &p("a.h")));
    }

    #[test]
    fn ancestors_follow_reverse_edges() {
        let g = chain();
        let reverse = g.reverse_edges();
        let anc = g.ancestors_via(&p("c.h"), &reverse);
        assert_eq!(anc, [p("a.h"), p("b.h")].into_iter().collect());
    }

    #[test]
    fn induced_subgraph_keeps_inner_edges() {
        let g = chain();
        let keep: BTreeSet<PathBuf> = [p("a.h"), p("b.h")].into_iter().collect();
        let sub = g.induced(&keep);
        assert_eq!(sub.node_count(), 2);
        assert!(sub.has_edge(&p("a.h"), &p("b.h")));
        assert_eq!(sub.edge_count(), 1);
    }

    #[test]
    fn acyclic_detection() {
        let mut g = chain();
        assert!(g.is_acyclic());
        g.add_edge(p("c.h"), p("a.h"));
        assert!(!g.is_acyclic());
    }
}
