// src/diff.rs
//! Differential analysis between two snapshots.
//!
//! Produces a typed delta: structural set differences, threshold events,
//! per-node ripple estimates against the current snapshot, and a
//! statistical commentary over the coupling distributions. Both snapshots
//! must be filtered identically; when they are not, the caller's active
//! filter is re-applied to both before comparing.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::Result;
use crate::graph::feedback;
use crate::impact;
use crate::metrics::{mean, median, percentile, stddev};
use crate::snapshot::Snapshot;

/// How urgently a recommendation should be acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplingChange {
    pub path: PathBuf,
    pub before: usize,
    pub after: usize,
    pub delta: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityCrossing {
    pub path: PathBuf,
    pub before: f64,
    pub after: f64,
    /// True when the node crossed into unstable territory (> 0.5).
    pub became_unstable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerMovement {
    pub path: PathBuf,
    pub before: usize,
    pub after: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RippleEstimate {
    pub path: PathBuf,
    pub direct_tus: usize,
    pub closure_tus: usize,
}

/// One side of the coupling distribution commentary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplingStats {
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    /// Nodes above mean + 2 sigma.
    pub outliers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplingCommentary {
    pub baseline: CouplingStats,
    pub current: CouplingStats,
    pub mean_change_pct: f64,
}

/// The typed difference between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DsmDelta {
    pub nodes_added: Vec<PathBuf>,
    pub nodes_removed: Vec<PathBuf>,
    pub edges_added: Vec<(PathBuf, PathBuf)>,
    pub edges_removed: Vec<(PathBuf, PathBuf)>,
    pub coupling_changed: Vec<CouplingChange>,
    pub stability_crossings: Vec<StabilityCrossing>,
    pub cycles_added: Vec<Vec<PathBuf>>,
    pub cycles_resolved: Vec<Vec<PathBuf>>,
    pub layer_movements: Vec<LayerMovement>,
    pub ripple_impact: Vec<RippleEstimate>,
    pub quality_delta: f64,
    pub commentary: CouplingCommentary,
    pub recommendations: Vec<Recommendation>,
}

impl DsmDelta {
    /// True when nothing structural changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes_added.is_empty()
            && self.nodes_removed.is_empty()
            && self.edges_added.is_empty()
            && self.edges_removed.is_empty()
            && self.coupling_changed.is_empty()
            && self.cycles_added.is_empty()
            && self.cycles_resolved.is_empty()
            && self.layer_movements.is_empty()
    }
}

/// Diffs `baseline` against `current`.
///
/// # Errors
///
/// Propagates `analysis_error` when re-filtering has to recompute metrics.
pub fn diff(baseline: &Snapshot, current: &Snapshot, config: &Config) -> Result<DsmDelta> {
    if baseline.filter == current.filter {
        return Ok(diff_filtered(baseline, current, config));
    }
    debug!("filter specs differ; re-applying the active filter to both sides");
    let refiltered_baseline = baseline.refilter(&config.filter)?;
    let refiltered_current = current.refilter(&config.filter)?;
    Ok(diff_filtered(&refiltered_baseline, &refiltered_current, config))
}

#[allow(clippy::too_many_lines, clippy::cast_possible_wrap)]
fn diff_filtered(baseline: &Snapshot, current: &Snapshot, config: &Config) -> DsmDelta {
    let nodes_b: BTreeSet<&PathBuf> = baseline.graph.nodes().collect();
    let nodes_c: BTreeSet<&PathBuf> = current.graph.nodes().collect();

    let nodes_added: Vec<PathBuf> = nodes_c.difference(&nodes_b).map(|p| (*p).clone()).collect();
    let nodes_removed: Vec<PathBuf> = nodes_b.difference(&nodes_c).map(|p| (*p).clone()).collect();

    let edges_b: BTreeSet<(PathBuf, PathBuf)> = baseline
        .graph
        .edge_pairs()
        .map(|(u, v)| (u.clone(), v.clone()))
        .collect();
    let edges_c: BTreeSet<(PathBuf, PathBuf)> = current
        .graph
        .edge_pairs()
        .map(|(u, v)| (u.clone(), v.clone()))
        .collect();
    let edges_added: Vec<(PathBuf, PathBuf)> = edges_c.difference(&edges_b).cloned().collect();
    let edges_removed: Vec<(PathBuf, PathBuf)> = edges_b.difference(&edges_c).cloned().collect();

    let mut coupling_changed = Vec::new();
    let mut stability_crossings = Vec::new();
    let mut layer_movements = Vec::new();
    for node in nodes_b.intersection(&nodes_c) {
        let before = &baseline.analysis.metrics[*node];
        let after = &current.analysis.metrics[*node];

        let delta = after.coupling as i64 - before.coupling as i64;
        if delta.unsigned_abs() >= u64::from(config.coupling_change_threshold) {
            coupling_changed.push(CouplingChange {
                path: (*node).clone(),
                before: before.coupling,
                after: after.coupling,
                delta,
            });
        }
        if (before.stability > 0.5) != (after.stability > 0.5) {
            stability_crossings.push(StabilityCrossing {
                path: (*node).clone(),
                before: before.stability,
                after: after.stability,
                became_unstable: after.stability > 0.5,
            });
        }
        if before.layer != after.layer {
            layer_movements.push(LayerMovement {
                path: (*node).clone(),
                before: before.layer,
                after: after.layer,
            });
        }
    }

    // Cycles compare by canonical member set, not by count.
    let cycles_b: BTreeSet<Vec<PathBuf>> = baseline.analysis.cycles.iter().cloned().collect();
    let cycles_c: BTreeSet<Vec<PathBuf>> = current.analysis.cycles.iter().cloned().collect();
    let cycles_added: Vec<Vec<PathBuf>> = cycles_c.difference(&cycles_b).cloned().collect();
    let cycles_resolved: Vec<Vec<PathBuf>> = cycles_b.difference(&cycles_c).cloned().collect();

    // Ripple estimates against the current snapshot for every touched node.
    let mut touched: BTreeSet<PathBuf> = nodes_added.iter().cloned().collect();
    touched.extend(coupling_changed.iter().map(|c| c.path.clone()));
    let ripple_impact: Vec<RippleEstimate> = touched
        .into_iter()
        .filter(|node| current.graph.contains_node(node))
        .map(|node| {
            let estimate = impact::compute(current, std::slice::from_ref(&node));
            RippleEstimate {
                path: node,
                direct_tus: estimate.direct_tus.len(),
                closure_tus: estimate.closure_tus.len(),
            }
        })
        .collect();

    let commentary = commentary_for(baseline, current);
    let quality_delta = current.analysis.stats.quality_score - baseline.analysis.stats.quality_score;

    let recommendations = recommend(
        current,
        &cycles_added,
        &cycles_resolved,
        &coupling_changed,
        &stability_crossings,
        quality_delta,
    );

    DsmDelta {
        nodes_added,
        nodes_removed,
        edges_added,
        edges_removed,
        coupling_changed,
        stability_crossings,
        cycles_added,
        cycles_resolved,
        layer_movements,
        ripple_impact,
        quality_delta,
        commentary,
        recommendations,
    }
}

#[allow(clippy::cast_precision_loss)]
fn commentary_for(baseline: &Snapshot, current: &Snapshot) -> CouplingCommentary {
    let side = |snapshot: &Snapshot| -> CouplingStats {
        let couplings: Vec<f64> = snapshot
            .analysis
            .metrics
            .values()
            .map(|m| m.coupling as f64)
            .collect();
        let mu = mean(&couplings);
        let sigma = stddev(&couplings);
        CouplingStats {
            mean: mu,
            median: median(&couplings),
            p95: percentile(&couplings, 95.0),
            outliers: couplings.iter().filter(|&&c| c > mu + 2.0 * sigma).count(),
        }
    };
    let b = side(baseline);
    let c = side(current);
    let mean_change_pct = if b.mean.abs() < f64::EPSILON {
        0.0
    } else {
        100.0 * (c.mean - b.mean) / b.mean
    };
    CouplingCommentary {
        baseline: b,
        current: c,
        mean_change_pct,
    }
}

fn recommend(
    current: &Snapshot,
    cycles_added: &[Vec<PathBuf>],
    cycles_resolved: &[Vec<PathBuf>],
    coupling_changed: &[CouplingChange],
    stability_crossings: &[StabilityCrossing],
    quality_delta: f64,
) -> Vec<Recommendation> {
    let mut out = Vec::new();

    for cycle in cycles_added {
        let members = join_paths(cycle);
        let fas = feedback::minimum_feedback_arc_set(
            &current.graph,
            std::slice::from_ref(cycle),
        );
        let break_hint = fas.first().map_or_else(String::new, |(from, to)| {
            format!(
                "; break it by removing {} -> {}",
                from.display(),
                to.display()
            )
        });
        out.push(Recommendation {
            severity: Severity::Critical,
            message: format!("New circular dependency between {members}{break_hint}"),
        });
    }

    for cycle in cycles_resolved {
        out.push(Recommendation {
            severity: Severity::Info,
            message: format!("Resolved circular dependency between {}", join_paths(cycle)),
        });
    }

    if quality_delta < -5.0 {
        out.push(Recommendation {
            severity: Severity::Warning,
            message: format!("Architecture quality dropped by {:.1} points", -quality_delta),
        });
    }

    let mut regressions: Vec<&CouplingChange> =
        coupling_changed.iter().filter(|c| c.delta > 0).collect();
    regressions.sort_by(|a, b| b.delta.cmp(&a.delta).then_with(|| a.path.cmp(&b.path)));
    for change in regressions.iter().take(3) {
        out.push(Recommendation {
            severity: Severity::Warning,
            message: format!(
                "Coupling of {} grew from {} to {}",
                change.path.display(),
                change.before,
                change.after
            ),
        });
    }

    for crossing in stability_crossings.iter().filter(|c| c.became_unstable) {
        out.push(Recommendation {
            severity: Severity::Warning,
            message: format!(
                "{} became unstable (stability {:.2} -> {:.2}) while widely depended upon",
                crossing.path.display(),
                crossing.before,
                crossing.after
            ),
        });
    }

    out
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::IncludeGraph;
    use crate::ingest::Diagnostics;
    use crate::metrics;
    use crate::paths::FilterSpec;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    fn snapshot_with(edges: &[(&str, &str)], tus: &[(&str, &[&str])]) -> Snapshot {
        let mut graph = IncludeGraph::new();
        for (from, to) in edges {
            graph.add_edge(p(from), p(to));
        }
        let mut source_to_deps = BTreeMap::new();
        for (tu, deps) in tus {
            let set: BTreeSet<PathBuf> = deps.iter().map(|d| p(d)).collect();
            for d in &set {
                graph.add_node(d.clone());
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
    fn self_diff_is_empty() {
        let snapshot = snapshot_with(
            &[("a.h", "b.h"), ("b.h", "c.h")],
            &[("a.cpp", &["a.h", "b.h", "c.h"])],
        );
        let delta = diff(&snapshot, &snapshot, &Config::new()).unwrap();
        assert!(delta.is_empty());
        assert!((delta.quality_delta).abs() < f64::EPSILON);
        assert!(delta.recommendations.is_empty());
    }

    #[test]
    fn diff_inversion_swaps_roles() {
        let a = snapshot_with(&[("a.h", "b.h")], &[]);
        let b = snapshot_with(&[("a.h", "b.h"), ("a.h", "c.h")], &[]);
        let config = Config::new();
        let forward = diff(&a, &b, &config).unwrap();
        let backward = diff(&b, &a, &config).unwrap();
        assert_eq!(forward.nodes_added, backward.nodes_removed);
        assert_eq!(forward.edges_added, backward.edges_removed);
        assert_eq!(forward.cycles_added, backward.cycles_resolved);
        assert!((forward.quality_delta + backward.quality_delta).abs() < 1e-9);
    }

    #[test]
    fn new_cycle_produces_critical_recommendation() {
        let baseline = snapshot_with(&[("a.h", "b.h")], &[("a.cpp", &["a.h", "b.h"])]);
        let current = snapshot_with(
            &[("a.h", "b.h"), ("b.h", "a.h")],
            &[("a.cpp", &["a.h", "b.h"])],
        );
        let delta = diff(&baseline, &current, &Config::new()).unwrap();
        assert_eq!(delta.cycles_added, vec![vec![p("a.h"), p("b.h")]]);
        assert!(delta.quality_delta < 0.0);
        let critical: Vec<&Recommendation> = delta
            .recommendations
            .iter()
            .filter(|r| r.severity == Severity::Critical)
            .collect();
        assert_eq!(critical.len(), 1);
        assert!(critical[0].message.contains("a.h"));
        assert!(critical[0].message.contains("b.h"));
        assert!(critical[0].message.contains("break it by removing"));
    }

    #[test]
    fn coupling_change_respects_threshold() {
        let baseline = snapshot_with(&[("hub.h", "a.h")], &[]);
        let current = snapshot_with(
            &[
                ("hub.h", "a.h"),
                ("hub.h", "b.h"),
                ("hub.h", "c.h"),
                ("hub.h", "d.h"),
                ("hub.h", "e.h"),
                ("hub.h", "f.h"),
            ],
            &[],
        );
        let delta = diff(&baseline, &current, &Config::new()).unwrap();
        let change = delta
            .coupling_changed
            .iter()
            .find(|c| c.path == p("hub.h"))
            .expect("hub.h grew by 5");
        assert_eq!(change.delta, 5);
        // The targets each grew by only 0 or 1, below the threshold.
        assert_eq!(delta.coupling_changed.len(), 1);
    }

    #[test]
    fn ripple_estimates_cover_touched_nodes() {
        let baseline = snapshot_with(&[], &[("a.cpp", &["a.h"])]);
        let current = snapshot_with(
            &[("new.h", "a.h")],
            &[("a.cpp", &["a.h", "new.h"])],
        );
        let delta = diff(&baseline, &current, &Config::new()).unwrap();
        let ripple = delta
            .ripple_impact
            .iter()
            .find(|r| r.path == p("new.h"))
            .expect("new node gets a ripple estimate");
        assert_eq!(ripple.direct_tus, 1);
    }

    #[test]
    fn mismatched_filters_are_reapplied() {
        let mut baseline = snapshot_with(&[("a.h", "b.h"), ("gen.h", "b.h")], &[]);
        baseline.filter = FilterSpec::new(Vec::new(), vec!["gen.h".to_string()]);
        let current = snapshot_with(&[("a.h", "b.h"), ("gen.h", "b.h")], &[]);

        let mut config = Config::new();
        config.filter = FilterSpec::new(Vec::new(), vec!["gen.h".to_string()]);
        let delta = diff(&baseline, &current, &config).unwrap();
        // After re-filtering both sides identically, nothing differs.
        assert!(delta.is_empty());
    }
}
