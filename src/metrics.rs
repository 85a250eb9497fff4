// src/metrics.rs
//! The DSM metric engine: per-node metrics and matrix-wide statistics.
//!
//! Everything downstream (impact, diff, advice, exports) reads from the
//! records computed here. Results are reproducible: iteration follows
//! sorted canonical paths and every algorithmic constant is fixed.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::graph::{betweenness, feedback, layers, pagerank, scc, IncludeGraph};

/// Sparsity above this (percent) reads as a healthy matrix.
const SPARSITY_HEALTHY_PCT: f64 = 95.0;
/// Sparsity above this (percent) reads as moderate coupling.
const SPARSITY_MODERATE_PCT: f64 = 90.0;

/// Per-node record of the dependency structure matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub fan_in: usize,
    pub fan_out: usize,
    pub coupling: usize,
    /// fan_out / coupling; 0 when coupling is 0. Low = stable interface.
    pub stability: f64,
    pub layer: usize,
    pub scc_id: usize,
    pub pagerank: f64,
    pub betweenness: f64,
}

impl NodeMetrics {
    /// Stable interface: depended upon widely, depends on little.
    #[must_use]
    pub fn is_stable_interface(&self) -> bool {
        self.stability <= 0.5 && self.fan_in >= 10
    }
}

/// Matrix-wide statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixStats {
    pub node_count: usize,
    pub edge_count: usize,
    /// Fraction of empty cells, in [0, 1]. 0 when fewer than two nodes.
    pub sparsity: f64,
    pub avg_deps: f64,
    pub cycle_count: usize,
    pub cycle_member_count: usize,
    /// Acyclic Dependencies Principle compliance, 0-100.
    pub adp_score: f64,
    /// Share of stable high-fan-in interfaces, in [0, 1].
    pub interface_ratio: f64,
    /// Composite architecture quality, 0-100.
    pub quality_score: f64,
    pub health: String,
}

/// Full analysis of one include graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DsmAnalysis {
    pub metrics: BTreeMap<PathBuf, NodeMetrics>,
    pub stats: MatrixStats,
    /// Multi-member SCCs, each sorted; ordered by smallest member.
    pub cycles: Vec<Vec<PathBuf>>,
    /// Removing these edges breaks every cycle.
    pub feedback_edges: Vec<(PathBuf, PathBuf)>,
    /// `layers[i]` = sorted members of layer i.
    pub layers: Vec<Vec<PathBuf>>,
    pub centrality_converged: bool,
    pub betweenness_sampled: bool,
}

impl DsmAnalysis {
    #[must_use]
    pub fn cycle_members(&self) -> impl Iterator<Item = &PathBuf> {
        self.cycles.iter().flatten()
    }

    #[must_use]
    pub fn in_cycle(&self, node: &PathBuf) -> bool {
        self.cycles.iter().any(|c| c.binary_search(node).is_ok())
    }
}

/// Runs the full metric engine over `graph`.
///
/// # Errors
///
/// Returns `analysis_error` only on internal invariant violations
/// (a condensation that still contains a cycle).
#[allow(clippy::cast_precision_loss)]
pub fn analyze_graph(graph: &IncludeGraph) -> Result<DsmAnalysis> {
    let n = graph.node_count();
    let edge_count = graph.edge_count();

    let scc_result = scc::strongly_connected(graph);
    let cycles = scc::cycles(graph, &scc_result);
    let feedback_edges = feedback::minimum_feedback_arc_set(graph, &cycles);
    let assignment = layers::assign_layers(graph, &scc_result)?;
    let rank = pagerank::compute(graph);
    let central = betweenness::compute(graph);

    let reverse = graph.reverse_edges();
    let mut metrics: BTreeMap<PathBuf, NodeMetrics> = BTreeMap::new();
    for node in graph.nodes() {
        let fan_out = graph.out_degree(node);
        let fan_in = reverse.get(node).map_or(0, std::collections::BTreeSet::len);
        let coupling = fan_in + fan_out;
        let stability = if coupling == 0 {
            0.0
        } else {
            fan_out as f64 / coupling as f64
        };
        metrics.insert(
            node.clone(),
            NodeMetrics {
                fan_in,
                fan_out,
                coupling,
                stability,
                layer: assignment.layer_of[node],
                scc_id: scc_result.id_of[node],
                pagerank: rank.scores[node],
                betweenness: central.scores[node],
            },
        );
    }

    let stats = matrix_stats(&metrics, n, edge_count, &cycles);
    debug!(
        nodes = n,
        edges = edge_count,
        cycles = cycles.len(),
        quality = stats.quality_score,
        "metric engine complete"
    );

    Ok(DsmAnalysis {
        metrics,
        stats,
        cycles,
        feedback_edges,
        layers: assignment.layers,
        centrality_converged: rank.converged,
        betweenness_sampled: central.sampled,
    })
}

#[allow(clippy::cast_precision_loss)]
fn matrix_stats(
    metrics: &BTreeMap<PathBuf, NodeMetrics>,
    n: usize,
    edge_count: usize,
    cycles: &[Vec<PathBuf>],
) -> MatrixStats {
    let sparsity = if n < 2 {
        0.0
    } else {
        1.0 - edge_count as f64 / (n as f64 * (n as f64 - 1.0))
    };
    let avg_deps = if n == 0 { 0.0 } else { edge_count as f64 / n as f64 };
    let cycle_member_count: usize = cycles.iter().map(Vec::len).sum();

    let adp_score = if cycles.is_empty() {
        100.0
    } else {
        100.0 * (1.0 - cycle_member_count as f64 / n as f64)
    };

    let interface_ratio = if n == 0 {
        0.0
    } else {
        metrics.values().filter(|m| m.is_stable_interface()).count() as f64 / n as f64
    };

    let couplings: Vec<f64> = metrics.values().map(|m| m.coupling as f64).collect();
    let mu = mean(&couplings);
    let sigma = stddev(&couplings);
    let outlier_free = if n == 0 {
        1.0
    } else {
        couplings.iter().filter(|&&c| c <= mu + 2.0 * sigma).count() as f64 / n as f64
    };

    let quality_score = 0.40 * sparsity * 100.0
        + 0.30 * adp_score
        + 0.20 * outlier_free * 100.0
        + 0.10 * interface_ratio * 100.0;

    let sparsity_pct = sparsity * 100.0;
    let health = if sparsity_pct > SPARSITY_HEALTHY_PCT || n < 2 {
        "Healthy - low coupling"
    } else if sparsity_pct > SPARSITY_MODERATE_PCT {
        "Moderate coupling"
    } else {
        "Highly coupled"
    };

    MatrixStats {
        node_count: n,
        edge_count,
        sparsity,
        avg_deps,
        cycle_count: cycles.len(),
        cycle_member_count,
        adp_score,
        interface_ratio,
        quality_score,
        health: health.to_string(),
    }
}

// Statistics helpers shared with the diff and advisor stages.

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Sample standard deviation; 0 for fewer than two values.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mu = mean(values);
    let variance =
        values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0);
    variance.sqrt()
}

#[must_use]
pub fn median(values: &[f64]) -> f64 {
    percentile(values, 50.0)
}

/// Nearest-rank percentile over a copy of `values`.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
