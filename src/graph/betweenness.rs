// src/graph/betweenness.rs
//! Betweenness centrality via Brandes' algorithm, unnormalized.
//!
//! The per-source accumulation phases are independent, so sources are
//! partitioned across the rayon pool; partial vectors are reduced in source
//! order afterwards, which keeps the floating-point sums byte-identical
//! regardless of thread count. Above the node threshold a fixed-seed sample
//! of sources is used and the result is scaled, with `sampled=true`
//! recorded on the snapshot.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;

use rayon::prelude::*;

use super::IncludeGraph;
use crate::config::{BETWEENNESS_SAMPLE_SIZE, BETWEENNESS_SAMPLE_THRESHOLD};

const SAMPLE_SEED: u64 = 0x5EED_BA5E_D5ED_2024;

pub struct Betweenness {
    pub scores: BTreeMap<PathBuf, f64>,
    pub sampled: bool,
}

/// Computes betweenness for every node of `graph`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute(graph: &IncludeGraph) -> Betweenness {
    let nodes: Vec<&PathBuf> = graph.nodes().collect();
    let n = nodes.len();
    if n == 0 {
        return Betweenness {
            scores: BTreeMap::new(),
            sampled: false,
        };
    }

    let index: BTreeMap<&PathBuf, usize> = nodes.iter().enumerate().map(|(i, p)| (*p, i)).collect();
    let adjacency: Vec<Vec<usize>> = nodes
        .iter()
        .map(|node| graph.out_edges(node).map(|t| index[t]).collect())
        .collect();

    let sampled = n > BETWEENNESS_SAMPLE_THRESHOLD;
    let sources: Vec<usize> = if sampled {
        sample_indices(n, BETWEENNESS_SAMPLE_SIZE)
    } else {
        (0..n).collect()
    };

    let partials: Vec<Vec<f64>> = sources
        .par_iter()
        .map(|&s| accumulate_from(s, &adjacency))
        .collect();

    let mut totals = vec![0.0f64; n];
    for partial in &partials {
        for (slot, value) in totals.iter_mut().zip(partial) {
            *slot += value;
        }
    }
    if sampled {
        let scale = n as f64 / sources.len() as f64;
        for value in &mut totals {
            *value *= scale;
        }
    }

    let scores = nodes
        .into_iter()
        .zip(totals)
        .map(|(node, score)| (node.clone(), score))
        .collect();
    Betweenness { scores, sampled }
}

/// One Brandes source phase: BFS orders, path counts, then dependency
/// back-propagation.
#[allow(clippy::cast_precision_loss)]
fn accumulate_from(source: usize, adjacency: &[Vec<usize>]) -> Vec<f64> {
    let n = adjacency.len();
    let mut sigma = vec![0.0f64; n];
    let mut dist = vec![usize::MAX; n];
    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut order: Vec<usize> = Vec::new();

    sigma[source] = 1.0;
    dist[source] = 0;
    let mut queue = VecDeque::from([source]);
    while let Some(v) = queue.pop_front() {
        order.push(v);
        for &w in &adjacency[v] {
            if dist[w] == usize::MAX {
                dist[w] = dist[v] + 1;
                queue.push_back(w);
            }
            if dist[w] == dist[v] + 1 {
                sigma[w] += sigma[v];
                predecessors[w].push(v);
            }
        }
    }

    let mut delta = vec![0.0f64; n];
    let mut scores = vec![0.0f64; n];
    for &w in order.iter().rev() {
        for &v in &predecessors[w] {
            delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
        }
        if w != source {
            scores[w] += delta[w];
        }
    }
    scores
}

/// Deterministic distinct sample of `k` indices out of `n` (splitmix64
/// partial Fisher-Yates from a fixed seed).
#[allow(clippy::cast_possible_truncation)]
fn sample_indices(n: usize, k: usize) -> Vec<usize> {
    let k = k.min(n);
    let mut pool: Vec<usize> = (0..n).collect();
    let mut state = SAMPLE_SEED;
    for i in 0..k {
        state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        let j = i + (z as usize) % (n - i);
        pool.swap(i, j);
    }
    let mut picked: Vec<usize> = pool[..k].to_vec();
    picked.sort_unstable();
    picked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    #[test]
    fn empty_graph() {
        let result = compute(&IncludeGraph::new());
        assert!(result.scores.is_empty());
        assert!(!result.sampled);
    }

    #[test]
    fn middle_of_a_chain_is_the_bottleneck() {
        let mut g = IncludeGraph::new();
        g.add_edge(p("a.h"), p("mid.h"));
        g.add_edge(p("mid.h"), p("z.h"));
        let result = compute(&g);
        // mid.h lies on the single shortest path a -> z.
        assert!((result.scores[&p("mid.h")] - 1.0).abs() < 1e-9);
        assert!(result.scores[&p("a.h")].abs() < 1e-9);
        assert!(result.scores[&p("z.h")].abs() < 1e-9);
    }

    #[test]
    fn endpoints_score_zero_in_star() {
        let mut g = IncludeGraph::new();
        g.add_edge(p("a.h"), p("hub.h"));
        g.add_edge(p("b.h"), p("hub.h"));
        g.add_edge(p("hub.h"), p("x.h"));
        g.add_edge(p("hub.h"), p("y.h"));
        let result = compute(&g);
        // hub sits on a->x, a->y, b->x, b->y.
        assert!((result.scores[&p("hub.h")] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn sampling_is_deterministic() {
        let first = sample_indices(10_000, 500);
        let second = sample_indices(10_000, 500);
        assert_eq!(first, second);
        assert_eq!(first.len(), 500);
        let mut dedup = first.clone();
        dedup.dedup();
        assert_eq!(dedup.len(), 500, "samples must be distinct");
    }
}
