// src/advisor.rs
//! The improvement advisor: anti-pattern detection, ROI scoring, ranking.
//!
//! Detectors form a fixed closed set, each a pure function over a node's
//! metrics and neighborhood. Scoring is independent per candidate and runs
//! on the rayon pool over a read-only snapshot view; the final ranking is
//! fully ordered so output never depends on thread count.

use std::collections::BTreeSet;
use std::path::PathBuf;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::metrics::{mean, stddev, NodeMetrics};
use crate::snapshot::Snapshot;

const GOD_OBJECT_FAN_OUT: usize = 50;
const OUTLIER_SIGMA: f64 = 2.5;
const UNSTABLE_FAN_IN: usize = 10;
const HUB_TOP_FRACTION: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AntiPattern {
    GodObject,
    CycleParticipant,
    CouplingOutlier,
    UnstableInterface,
    HubNode,
}

impl AntiPattern {
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::GodObject => "god_object",
            Self::CycleParticipant => "cycle_participant",
            Self::CouplingOutlier => "coupling_outlier",
            Self::UnstableInterface => "unstable_interface",
            Self::HubNode => "hub_node",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effort {
    Low,
    Medium,
    High,
}

impl Effort {
    fn from_fan_out(fan_out: usize) -> Self {
        if fan_out >= 50 {
            Self::High
        } else if fan_out >= 20 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    fn inverse_score(self) -> f64 {
        match self {
            Self::Low => 100.0,
            Self::Medium => 50.0,
            Self::High => 5.0,
        }
    }

    fn cost_commits(self) -> f64 {
        match self {
            Self::Low => 5.0,
            Self::Medium => 20.0,
            Self::High => 40.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSeverity {
    Critical,
    QuickWin,
    Moderate,
}

impl CandidateSeverity {
    fn priority(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::QuickWin => 1,
            Self::Moderate => 2,
        }
    }

    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::QuickWin => "quick_win",
            Self::Moderate => "moderate",
        }
    }
}

/// A ranked refactoring target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementCandidate {
    pub path: PathBuf,
    pub tags: Vec<AntiPattern>,
    pub fan_in: usize,
    pub fan_out: usize,
    pub coupling: usize,
    pub stability: f64,
    /// Out-edges the simulated refactoring removes.
    pub estimated_coupling_reduction: usize,
    /// Percentage of TUs freed from rebuild cascades by the simulation.
    pub rebuild_reduction_pct: f64,
    pub effort: Effort,
    /// Composite score in [0, 100].
    pub roi: f64,
    pub break_even_commits: u32,
    pub severity: CandidateSeverity,
    pub steps: Vec<String>,
}

/// Detects anti-patterns, scores ROI, and returns candidates ranked by
/// (severity, ROI descending, path).
#[must_use]
pub fn identify(snapshot: &Snapshot, config: &Config) -> Vec<ImprovementCandidate> {
    let metrics = &snapshot.analysis.metrics;
    if metrics.is_empty() {
        return Vec::new();
    }

    let couplings: Vec<f64> = metrics.values().map(|m| m.coupling as f64).collect();
    let mu = mean(&couplings);
    let sigma = stddev(&couplings);
    let outlier_threshold = mu + OUTLIER_SIGMA * sigma;
    let hub_threshold = hub_betweenness_threshold(metrics.values());

    let tagged: Vec<(PathBuf, Vec<AntiPattern>, NodeMetrics)> = metrics
        .iter()
        .filter_map(|(path, m)| {
            let tags = detect(snapshot, path, m, outlier_threshold, hub_threshold);
            (!tags.is_empty()).then(|| (path.clone(), tags, m.clone()))
        })
        .collect();

    let mut candidates: Vec<ImprovementCandidate> = tagged
        .par_iter()
        .map(|(path, tags, m)| score(snapshot, config, path, tags, m, mu))
        .collect();

    candidates.sort_by(|a, b| {
        a.severity
            .priority()
            .cmp(&b.severity.priority())
            .then_with(|| b.roi.partial_cmp(&a.roi).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.path.cmp(&b.path))
    });
    debug!(candidates = candidates.len(), "advisor ranking complete");
    candidates
}

/// Betweenness value marking the top 1% of nodes (0 disables the detector
/// when no node has positive centrality).
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn hub_betweenness_threshold<'a, I: Iterator<Item = &'a NodeMetrics>>(metrics: I) -> f64 {
    let mut values: Vec<f64> = metrics.map(|m| m.betweenness).collect();
    values.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let top = ((values.len() as f64 * HUB_TOP_FRACTION).ceil() as usize).max(1);
    values.get(top - 1).copied().unwrap_or(0.0)
}

fn detect(
    snapshot: &Snapshot,
    path: &PathBuf,
    m: &NodeMetrics,
    outlier_threshold: f64,
    hub_threshold: f64,
) -> Vec<AntiPattern> {
    let mut tags = Vec::new();
    if m.fan_out >= GOD_OBJECT_FAN_OUT {
        tags.push(AntiPattern::GodObject);
    }
    if snapshot.analysis.in_cycle(path) {
        tags.push(AntiPattern::CycleParticipant);
    }
    if (m.coupling as f64) > outlier_threshold {
        tags.push(AntiPattern::CouplingOutlier);
    }
    if m.stability > 0.5 && m.fan_in >= UNSTABLE_FAN_IN {
        tags.push(AntiPattern::UnstableInterface);
    }
    if m.betweenness > 0.0 && m.betweenness >= hub_threshold {
        tags.push(AntiPattern::HubNode);
    }
    tags
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn score(
    snapshot: &Snapshot,
    config: &Config,
    path: &PathBuf,
    tags: &[AntiPattern],
    m: &NodeMetrics,
    mu: f64,
) -> ImprovementCandidate {
    let in_cycle = tags.contains(&AntiPattern::CycleParticipant);
    let effort = Effort::from_fan_out(m.fan_out);

    let (removed_edges, rebuild_reduction_pct) = simulate_fan_out_halving(snapshot, path);

    let cycle_component = if in_cycle { 100.0 } else { 0.0 };
    let coupling_component = if mu > 0.0 {
        (100.0 * (m.coupling as f64 - mu) / mu).clamp(0.0, 100.0)
    } else {
        0.0
    };
    let roi = 0.40 * cycle_component
        + 0.30 * rebuild_reduction_pct
        + 0.20 * coupling_component
        + 0.10 * effort.inverse_score();

    let per_commit_savings = rebuild_reduction_pct / 100.0 * config.avg_commits_affected;
    let break_even_commits = if per_commit_savings > 0.0 {
        (effort.cost_commits() / per_commit_savings).ceil().clamp(1.0, 999.0) as u32
    } else {
        999
    };

    let severity = if roi >= 60.0 && break_even_commits <= 5 {
        CandidateSeverity::QuickWin
    } else if in_cycle || roi >= 40.0 {
        CandidateSeverity::Critical
    } else {
        CandidateSeverity::Moderate
    };

    ImprovementCandidate {
        path: path.clone(),
        tags: tags.to_vec(),
        fan_in: m.fan_in,
        fan_out: m.fan_out,
        coupling: m.coupling,
        stability: m.stability,
        estimated_coupling_reduction: removed_edges,
        rebuild_reduction_pct,
        effort,
        roi,
        break_even_commits,
        severity,
        steps: steps_for(tags, m, mu),
    }
}

/// Simulates halving the node's fan-out on a hypothetical graph: the
/// most-used half of its out-edges (by target fan-in) is removed, and the
/// headers that then stop reaching those targets are collected. TUs
/// including any such header would no longer rebuild along those chains;
/// their share of the universe, scaled by the removed fan-out fraction,
/// is the rebuild-reduction estimate.
#[allow(clippy::cast_precision_loss)]
fn simulate_fan_out_halving(snapshot: &Snapshot, path: &PathBuf) -> (usize, f64) {
    let fan_out = snapshot.graph.out_degree(path);
    if fan_out == 0 || snapshot.tu_count() == 0 {
        return (0, 0.0);
    }

    let mut targets: Vec<PathBuf> = snapshot.graph.out_edges(path).cloned().collect();
    targets.sort_by(|a, b| {
        let fan_in_a = snapshot.analysis.metrics.get(a).map_or(0, |m| m.fan_in);
        let fan_in_b = snapshot.analysis.metrics.get(b).map_or(0, |m| m.fan_in);
        fan_in_b.cmp(&fan_in_a).then_with(|| a.cmp(b))
    });
    let removed: Vec<PathBuf> = targets.into_iter().take(fan_out.div_ceil(2)).collect();

    let mut hypothetical = snapshot.graph.clone();
    for target in &removed {
        hypothetical.remove_edge(path, target);
    }

    let reverse_before = snapshot.graph.reverse_edges();
    let reverse_after = hypothetical.reverse_edges();
    let mut freed_headers: BTreeSet<PathBuf> = BTreeSet::new();
    for target in &removed {
        let before = snapshot.graph.ancestors_via(target, &reverse_before);
        let after = hypothetical.ancestors_via(target, &reverse_after);
        freed_headers.extend(before.difference(&after).cloned());
    }

    let inverse = snapshot.header_to_tus();
    let mut freed_tus: BTreeSet<&PathBuf> = BTreeSet::new();
    for header in &freed_headers {
        freed_tus.extend(inverse.get(header).into_iter().flatten());
    }

    let removed_share = removed.len() as f64 / fan_out as f64;
    let pct = 100.0 * freed_tus.len() as f64 / snapshot.tu_count() as f64 * removed_share;
    (removed.len(), pct)
}

/// Fixed step templates, one block per detected tag.
fn steps_for(tags: &[AntiPattern], m: &NodeMetrics, mu: f64) -> Vec<String> {
    let mut steps = Vec::new();
    for tag in tags {
        match tag {
            AntiPattern::GodObject => {
                steps.push("Split into focused modules (target: <20 includes each)".to_string());
                steps.push("Extract common utilities to separate headers".to_string());
            }
            AntiPattern::CycleParticipant => {
                steps.push("Break the circular dependency by introducing an interface layer".to_string());
                steps.push("Use forward declarations to reduce includes".to_string());
            }
            AntiPattern::CouplingOutlier => {
                let excess = (m.coupling as f64 - mu).max(0.0).round();
                steps.push(format!("Reduce coupling by {excess:.0} to reach the project mean"));
            }
            AntiPattern::UnstableInterface => {
                steps.push("Extract a stable interface (reduce fan-out to <5)".to_string());
                steps.push("Move implementation details into the source file or an impl header".to_string());
            }
            AntiPattern::HubNode => {
                steps.push("Reduce centrality by extracting interfaces".to_string());
                steps.push("Split into multiple focused headers".to_string());
            }
        }
    }
    steps
}
