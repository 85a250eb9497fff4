// src/graph/feedback.rs
//! Minimum feedback arc sets per strongly connected component.
//!
//! Exact for components of up to 8 nodes: the minimum FAS equals the fewest
//! order-violating edges over all linear orderings, found by subset DP.
//! Larger components use a greedy heuristic: repeatedly drop the cycle edge
//! with the highest product of endpoint betweenness, then one redundancy
//! pass re-adds edges whose removal turned out unnecessary.

use std::collections::BTreeSet;
use std::path::PathBuf;

use super::{betweenness, IncludeGraph};

const EXACT_LIMIT: usize = 8;

/// Computes the recorded feedback arc set over all cycle components.
/// Removing these edges from the graph makes it acyclic.
#[must_use]
pub fn minimum_feedback_arc_set(
    graph: &IncludeGraph,
    cycles: &[Vec<PathBuf>],
) -> Vec<(PathBuf, PathBuf)> {
    let mut result = Vec::new();
    for component in cycles {
        let members: BTreeSet<PathBuf> = component.iter().cloned().collect();
        let sub = graph.induced(&members);
        let mut edges = if component.len() <= EXACT_LIMIT {
            exact_fas(&sub)
        } else {
            greedy_fas(&sub)
        };
        edges.sort();
        result.extend(edges);
    }
    result
}

/// Subset DP: dp[placed] = fewest backward edges over orderings of `placed`.
/// Appending v after `placed` makes every edge v -> u (u already placed)
/// backward.
fn exact_fas(sub: &IncludeGraph) -> Vec<(PathBuf, PathBuf)> {
    let nodes: Vec<&PathBuf> = sub.nodes().collect();
    let n = nodes.len();
    let out_mask: Vec<u32> = nodes
        .iter()
        .map(|node| {
            let mut mask = 0u32;
            for target in sub.out_edges(node) {
                if let Ok(i) = nodes.binary_search(&target) {
                    mask |= 1 << i;
                }
            }
            mask
        })
        .collect();

    let full = (1u32 << n) - 1;
    let mut dp = vec![u32::MAX; (full + 1) as usize];
    let mut choice = vec![usize::MAX; (full + 1) as usize];
    dp[0] = 0;
    for mask in 0..full {
        let cost = dp[mask as usize];
        if cost == u32::MAX {
            continue;
        }
        for v in 0..n {
            if mask & (1 << v) != 0 {
                continue;
            }
            let backward = (out_mask[v] & mask).count_ones();
            let next = mask | (1 << v);
            if cost + backward < dp[next as usize] {
                dp[next as usize] = cost + backward;
                choice[next as usize] = v;
            }
        }
    }

    // Reconstruct the ordering, then collect the violating edges.
    let mut position = vec![0usize; n];
    let mut mask = full;
    let mut slot = n;
    while mask != 0 {
        let v = choice[mask as usize];
        slot -= 1;
        position[v] = slot;
        mask &= !(1 << v);
    }

    let mut fas = Vec::new();
    for (from, to) in sub.edge_pairs() {
        let from_idx = nodes.binary_search(&from).expect("edge endpoint in node list");
        let to_idx = nodes.binary_search(&to).expect("edge endpoint in node list");
        if position[from_idx] > position[to_idx] {
            fas.push((from.clone(), to.clone()));
        }
    }
    fas
}

fn greedy_fas(sub: &IncludeGraph) -> Vec<(PathBuf, PathBuf)> {
    let centrality = betweenness::compute(sub).scores;
    let mut working = sub.clone();
    let mut removed: Vec<(PathBuf, PathBuf)> = Vec::new();

    while let Some(cycle_edges) = find_cycle(&working) {
        let victim = cycle_edges
            .into_iter()
            .max_by(|a, b| {
                let score_a = centrality[&a.0] * centrality[&a.1];
                let score_b = centrality[&b.0] * centrality[&b.1];
                score_a
                    .partial_cmp(&score_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    // Prefer the lexicographically smaller edge on ties.
                    .then_with(|| b.cmp(a))
            })
            .expect("cycle has at least one edge");
        working.remove_edge(&victim.0, &victim.1);
        removed.push(victim);
    }

    // One redundancy pass: re-add edges that no longer close a cycle.
    let mut fas = Vec::new();
    for (from, to) in removed {
        working.add_edge(from.clone(), to.clone());
        if working.is_acyclic() {
            continue;
        }
        working.remove_edge(&from, &to);
        fas.push((from, to));
    }
    fas
}

/// Finds one directed cycle, returned as its edge list, or `None` on a DAG.
fn find_cycle(graph: &IncludeGraph) -> Option<Vec<(PathBuf, PathBuf)>> {
    let mut visited: BTreeSet<&PathBuf> = BTreeSet::new();
    for root in graph.nodes() {
        if visited.contains(root) {
            continue;
        }
        let mut path: Vec<&PathBuf> = Vec::new();
        let mut on_path: BTreeSet<&PathBuf> = BTreeSet::new();
        let mut frames: Vec<(&PathBuf, Vec<&PathBuf>, usize)> = Vec::new();

        visited.insert(root);
        on_path.insert(root);
        path.push(root);
        frames.push((root, graph.out_edges(root).collect(), 0));

        while let Some(frame) = frames.last_mut() {
            if frame.2 < frame.1.len() {
                let next = frame.1[frame.2];
                frame.2 += 1;
                if on_path.contains(next) {
                    let start = path.iter().position(|&n| n == next).expect("on path");
                    let mut edges: Vec<(PathBuf, PathBuf)> = path[start..]
                        .windows(2)
                        .map(|w| (w[0].clone(), w[1].clone()))
                        .collect();
                    edges.push((path[path.len() - 1].clone(), next.clone()));
                    return Some(edges);
                }
                if visited.insert(next) {
                    on_path.insert(next);
                    path.push(next);
                    frames.push((next, graph.out_edges(next).collect(), 0));
                }
            } else {
                let (node, _, _) = frames.pop().expect("frame present");
                on_path.remove(node);
                path.pop();
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::super::scc::{cycles, strongly_connected};
    use super::*;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    fn fas_for(graph: &IncludeGraph) -> Vec<(PathBuf, PathBuf)> {
        let scc = strongly_connected(graph);
        minimum_feedback_arc_set(graph, &cycles(graph, &scc))
    }

    fn without(graph: &IncludeGraph, fas: &[(PathBuf, PathBuf)]) -> IncludeGraph {
        let mut g = graph.clone();
        for (from, to) in fas {
            g.remove_edge(from, to);
        }
        g
    }

    #[test]
    fn dag_has_empty_fas() {
        let mut g = IncludeGraph::new();
        g.add_edge(p("a.h"), p("b.h"));
        g.add_edge(p("b.h"), p("c.h"));
        assert!(fas_for(&g).is_empty());
    }

    #[test]
    fn triangle_needs_exactly_one_edge() {
        let mut g = IncludeGraph::new();
        g.add_edge(p("a.h"), p("b.h"));
        g.add_edge(p("b.h"), p("c.h"));
        g.add_edge(p("c.h"), p("a.h"));
        let fas = fas_for(&g);
        assert_eq!(fas.len(), 1);
        assert!(without(&g, &fas).is_acyclic());
    }

    #[test]
    fn two_disjoint_two_cycles_need_two_edges() {
        let mut g = IncludeGraph::new();
        g.add_edge(p("a.h"), p("b.h"));
        g.add_edge(p("b.h"), p("a.h"));
        g.add_edge(p("x.h"), p("y.h"));
        g.add_edge(p("y.h"), p("x.h"));
        let fas = fas_for(&g);
        assert_eq!(fas.len(), 2);
        assert!(without(&g, &fas).is_acyclic());
    }

    #[test]
    fn overlapping_cycles_resolved_minimally() {
        // a <-> b and a <-> c share vertex a; two edges are both needed
        // and sufficient.
        let mut g = IncludeGraph::new();
        g.add_edge(p("a.h"), p("b.h"));
        g.add_edge(p("b.h"), p("a.h"));
        g.add_edge(p("a.h"), p("c.h"));
        g.add_edge(p("c.h"), p("a.h"));
        let fas = fas_for(&g);
        assert_eq!(fas.len(), 2);
        assert!(without(&g, &fas).is_acyclic());
    }

    #[test]
    fn large_component_uses_greedy_and_still_breaks_cycles() {
        // A 12-node ring plus chords forces the greedy path.
        let mut g = IncludeGraph::new();
        let names: Vec<PathBuf> = (0..12).map(|i| p(&format!("n{i:02}.h"))).collect();
        for i in 0..12 {
            g.add_edge(names[i].clone(), names[(i + 1) % 12].clone());
        }
        g.add_edge(names[0].clone(), names[6].clone());
        g.add_edge(names[3].clone(), names[9].clone());
        let fas = fas_for(&g);
        assert!(!fas.is_empty());
        assert!(without(&g, &fas).is_acyclic());
    }
}
