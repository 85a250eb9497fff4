// src/graph/pagerank.rs
//! `PageRank` over the include graph.
//!
//! Identifies headers that important headers depend on. Damping 0.85,
//! convergence at 1e-6 on the L1 norm, at most 100 iterations; if the walk
//! has not converged by then the last iterate is returned with
//! `converged=false` and the analysis continues.

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::IncludeGraph;

const DAMPING: f64 = 0.85;
const TOLERANCE: f64 = 1e-6;
const MAX_ITERATIONS: usize = 100;

pub struct PageRank {
    pub scores: BTreeMap<PathBuf, f64>,
    pub converged: bool,
}

/// Computes `PageRank` with a uniform 1/|V| initial vector.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute(graph: &IncludeGraph) -> PageRank {
    let nodes: Vec<&PathBuf> = graph.nodes().collect();
    let n = nodes.len();
    if n == 0 {
        return PageRank {
            scores: BTreeMap::new(),
            converged: true,
        };
    }

    let index: BTreeMap<&PathBuf, usize> = nodes.iter().enumerate().map(|(i, p)| (*p, i)).collect();
    let out_targets: Vec<Vec<usize>> = nodes
        .iter()
        .map(|node| graph.out_edges(node).map(|t| index[t]).collect())
        .collect();

    let uniform = 1.0 / n as f64;
    let mut ranks = vec![uniform; n];
    let mut converged = false;

    for _ in 0..MAX_ITERATIONS {
        let mut next = vec![(1.0 - DAMPING) * uniform; n];

        // Dangling mass is spread uniformly, as a random surfer would jump.
        let dangling: f64 = (0..n)
            .filter(|&i| out_targets[i].is_empty())
            .map(|i| ranks[i])
            .sum();
        let dangling_share = DAMPING * dangling * uniform;
        for value in &mut next {
            *value += dangling_share;
        }

        for (i, targets) in out_targets.iter().enumerate() {
            if targets.is_empty() {
                continue;
            }
            let share = DAMPING * ranks[i] / targets.len() as f64;
            for &t in targets {
                next[t] += share;
            }
        }

        let delta: f64 = ranks
            .iter()
            .zip(&next)
            .map(|(old, new)| (old - new).abs())
            .sum();
        ranks = next;
        if delta < TOLERANCE {
            converged = true;
            break;
        }
    }

    let scores = nodes
        .into_iter()
        .zip(ranks)
        .map(|(node, rank)| (node.clone(), rank))
        .collect();
    PageRank { scores, converged }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn empty_graph() {
        let rank = compute(&IncludeGraph::new());
        assert!(rank.scores.is_empty());
        assert!(rank.converged);
    }

    #[test]
    fn single_node_gets_all_mass() {
        let mut g = IncludeGraph::new();
        g.add_node(p("a.h"));
        let rank = compute(&g);
        assert!(approx(rank.scores[&p("a.h")], 1.0));
    }

    #[test]
    fn scores_sum_to_one() {
        let mut g = IncludeGraph::new();
        g.add_edge(p("a.h"), p("c.h"));
        g.add_edge(p("b.h"), p("c.h"));
        g.add_edge(p("c.h"), p("d.h"));
        let rank = compute(&g);
        let total: f64 = rank.scores.values().sum();
        assert!(approx(total, 1.0), "total {total}");
        assert!(rank.converged);
    }

    #[test]
    fn sink_outranks_sources() {
        let mut g = IncludeGraph::new();
        g.add_edge(p("a.h"), p("base.h"));
        g.add_edge(p("b.h"), p("base.h"));
        let rank = compute(&g);
        assert!(rank.scores[&p("base.h")] > rank.scores[&p("a.h")]);
    }

    #[test]
    fn cycle_distributes_evenly() {
        let mut g = IncludeGraph::new();
        g.add_edge(p("a.h"), p("b.h"));
        g.add_edge(p("b.h"), p("c.h"));
        g.add_edge(p("c.h"), p("a.h"));
        let rank = compute(&g);
        let third = 1.0 / 3.0;
        for score in rank.scores.values() {
            assert!(approx(*score, third));
        }
    }
}
