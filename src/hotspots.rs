// src/hotspots.rs
//! Dependency hotspots: the headers that make builds hurt.
//!
//! Combines transitive dependency counts, rebuild blast radius, include
//! chain depth, and usage frequency into a ranked problem list, plus a
//! cross-library view that maps headers onto libraries and counts
//! boundary-crossing includes.

use std::collections::BTreeMap;
use std::path::{Component, PathBuf};

use serde::{Deserialize, Serialize};

use crate::snapshot::Snapshot;

/// One problematic header with the numbers that condemn it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hotspot {
    pub path: PathBuf,
    /// Headers this one transitively pulls in.
    pub transitive_deps: usize,
    /// TUs whose inclusion set contains this header.
    pub usage_count: usize,
    /// Headers that transitively include this one (rebuild blast radius).
    pub reverse_impact: usize,
    /// Longest include chain from this header down to a base type.
    pub max_chain_length: usize,
}

/// Cross-library coupling summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossLibraryReport {
    pub total_deps: usize,
    pub intra_library_deps: usize,
    pub cross_library_deps: usize,
    /// (from-library, to-library) -> edge count.
    pub violations: BTreeMap<(String, String), usize>,
    /// Headers with the most boundary-crossing includes, descending.
    pub worst_offenders: Vec<(PathBuf, usize)>,
}

/// Headers with no dependencies of their own: the foundation the chains
/// bottom out on.
#[must_use]
pub fn base_types(snapshot: &Snapshot) -> Vec<PathBuf> {
    snapshot
        .graph
        .nodes()
        .filter(|n| snapshot.graph.out_degree(n) == 0)
        .cloned()
        .collect()
}

/// Ranks headers whose transitive dependency count meets `threshold`,
/// worst first (ties broken by path).
#[must_use]
pub fn find_hotspots(snapshot: &Snapshot, threshold: usize) -> Vec<Hotspot> {
    let reverse = snapshot.graph.reverse_edges();
    let inverse = snapshot.header_to_tus();

    let mut chain_memo: BTreeMap<PathBuf, usize> = BTreeMap::new();
    let mut hotspots: Vec<Hotspot> = snapshot
        .graph
        .nodes()
        .filter_map(|node| {
            let transitive = snapshot.graph.descendants(node).len();
            if transitive < threshold {
                return None;
            }
            Some(Hotspot {
                path: node.clone(),
                transitive_deps: transitive,
                usage_count: inverse.get(node).map_or(0, std::collections::BTreeSet::len),
                reverse_impact: snapshot.graph.ancestors_via(node, &reverse).len(),
                max_chain_length: chain_length(snapshot, node, &mut chain_memo),
            })
        })
        .collect();

    hotspots.sort_by(|a, b| {
        b.transitive_deps
            .cmp(&a.transitive_deps)
            .then_with(|| b.reverse_impact.cmp(&a.reverse_impact))
            .then_with(|| a.path.cmp(&b.path))
    });
    hotspots
}

/// Longest path to a sink, memoized. Cycle members collapse to the depth
/// of whatever lies beyond the cycle, which is the useful answer here.
fn chain_length(
    snapshot: &Snapshot,
    node: &PathBuf,
    memo: &mut BTreeMap<PathBuf, usize>,
) -> usize {
    if let Some(&depth) = memo.get(node) {
        return depth;
    }
    // Layers already encode longest-path-to-sink over the condensation.
    let depth = snapshot
        .analysis
        .metrics
        .get(node)
        .map_or(0, |m| m.layer);
    memo.insert(node.clone(), depth);
    depth
}

/// Maps a header to its owning library: the first path component under a
/// recognized source-tree layout, else the first component.
#[must_use]
pub fn library_of(path: &PathBuf) -> String {
    let components: Vec<&str> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();
    match components.as_slice() {
        // layouts like Framework/<Lib>/include/... keep the second level
        [first, second, rest @ ..]
            if !rest.is_empty() && ["src", "lib", "libs", "source"].contains(&first.to_lowercase().as_str()) =>
        {
            (*second).to_string()
        }
        [first, ..] => (*first).to_string(),
        [] => String::from("unknown"),
    }
}

/// Counts includes that cross library boundaries.
#[must_use]
pub fn cross_library(snapshot: &Snapshot) -> CrossLibraryReport {
    let mut report = CrossLibraryReport::default();
    let mut offender_counts: BTreeMap<PathBuf, usize> = BTreeMap::new();

    for (from, to) in snapshot.graph.edge_pairs() {
        let from_lib = library_of(from);
        let to_lib = library_of(to);
        report.total_deps += 1;
        if from_lib == to_lib {
            report.intra_library_deps += 1;
        } else {
            report.cross_library_deps += 1;
            *report.violations.entry((from_lib, to_lib)).or_insert(0) += 1;
            *offender_counts.entry(from.clone()).or_insert(0) += 1;
        }
    }

    let mut offenders: Vec<(PathBuf, usize)> = offender_counts.into_iter().collect();
    offenders.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    offenders.truncate(10);
    report.worst_offenders = offenders;
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::IncludeGraph;
    use crate::ingest::Diagnostics;
    use crate::metrics;
    use crate::paths::FilterSpec;
    use std::collections::BTreeSet;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    fn snapshot_of(edges: &[(&str, &str)], tus: &[(&str, &[&str])]) -> Snapshot {
        let mut graph = IncludeGraph::new();
        for (from, to) in edges {
            graph.add_edge(p(from), p(to));
        }
        let mut source_to_deps = BTreeMap::new();
        for (tu, deps) in tus {
            let set: BTreeSet<PathBuf> = deps.iter().map(|d| p(d)).collect();
            for dep in &set {
                graph.add_node(dep.clone());
            }
            source_to_deps.insert(p(tu), set);
        }
        let analysis = metrics::analyze_graph(&graph).unwrap();
        Snapshot::assemble(
            p("/b"),
            0,
            p("/"),
            FilterSpec::default(),
            true,
            graph,
            source_to_deps,
            analysis,
            Diagnostics::default(),
        )
    }

    #[test]
    fn base_types_have_no_dependencies() {
        let snapshot = snapshot_of(&[("a.h", "base.h"), ("b.h", "base.h")], &[]);
        assert_eq!(base_types(&snapshot), vec![p("base.h")]);
    }

    #[test]
    fn hotspots_ranked_by_transitive_count() {
        let snapshot = snapshot_of(
            &[
                ("fat.h", "m1.h"),
                ("fat.h", "m2.h"),
                ("m1.h", "base.h"),
                ("m2.h", "base.h"),
                ("slim.h", "base.h"),
            ],
            &[("a.cpp", &["fat.h", "m1.h", "m2.h", "base.h"])],
        );
        let hotspots = find_hotspots(&snapshot, 1);
        assert_eq!(hotspots[0].path, p("fat.h"));
        assert_eq!(hotspots[0].transitive_deps, 3);
        assert_eq!(hotspots[0].usage_count, 1);
        assert_eq!(hotspots[0].reverse_impact, 0);
        assert_eq!(hotspots[0].max_chain_length, 2);

        let base = hotspots.iter().find(|h| h.path == p("base.h"));
        assert!(base.is_none(), "base.h has no transitive deps");
    }

    #[test]
    fn threshold_filters_small_fry() {
        let snapshot = snapshot_of(&[("a.h", "b.h")], &[]);
        assert!(find_hotspots(&snapshot, 5).is_empty());
        assert_eq!(find_hotspots(&snapshot, 1).len(), 1);
    }

    #[test]
    fn library_mapping_uses_path_layout() {
        assert_eq!(library_of(&p("src/Core/types.h")), "Core");
        assert_eq!(library_of(&p("Net/socket.h")), "Net");
        assert_eq!(library_of(&p("single.h")), "single.h");
    }

    #[test]
    fn cross_library_edges_counted() {
        let snapshot = snapshot_of(
            &[
                ("src/Core/a.h", "src/Core/b.h"),
                ("src/Net/s.h", "src/Core/a.h"),
                ("src/Net/s.h", "src/Core/b.h"),
            ],
            &[],
        );
        let report = cross_library(&snapshot);
        assert_eq!(report.total_deps, 3);
        assert_eq!(report.intra_library_deps, 1);
        assert_eq!(report.cross_library_deps, 2);
        assert_eq!(
            report.violations[&("Net".to_string(), "Core".to_string())],
            2
        );
        assert_eq!(report.worst_offenders[0], (p("src/Net/s.h"), 2));
    }
}
