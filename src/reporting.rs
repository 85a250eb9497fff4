// src/reporting.rs
//! Rendered text output: the action plan for candidates, plus matrix and
//! delta summaries for the CLI. All renderers build plain strings; color
//! is applied only at the CLI boundary.

use crate::advisor::ImprovementCandidate;
use crate::diff::DsmDelta;
use crate::error::Result;
use crate::snapshot::Snapshot;

/// Renders one candidate as its multi-line action plan.
#[must_use]
pub fn render_candidate(rank: usize, candidate: &ImprovementCandidate) -> String {
    let tags = candidate
        .tags
        .iter()
        .map(|t| t.tag())
        .collect::<Vec<_>>()
        .join(", ");
    let mut out = format!(
        "#{rank}. {}\n\
         Anti-Pattern: {tags}\n\
         Metrics: fan-in={}, fan-out={}, coupling={}, stability={:.2}\n\
         ROI: {:.0}/100   Effort: {}   Break-Even: {} commits\n\
         Rebuild reduction: {:.1}%\n\
         Steps:\n",
        candidate.path.display(),
        candidate.fan_in,
        candidate.fan_out,
        candidate.coupling,
        candidate.stability,
        candidate.roi,
        candidate.effort.tag(),
        candidate.break_even_commits,
        candidate.rebuild_reduction_pct,
    );
    for step in &candidate.steps {
        out.push_str(&format!("  - {step}\n"));
    }
    out
}

/// Renders the ranked action plan, one block per candidate.
#[must_use]
pub fn render_action_plan(candidates: &[ImprovementCandidate]) -> String {
    candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| render_candidate(index + 1, candidate))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One-screen summary of a snapshot's matrix statistics.
#[must_use]
pub fn render_summary(snapshot: &Snapshot) -> String {
    let stats = &snapshot.analysis.stats;
    format!(
        "Headers: {}   Dependencies: {}   Sparsity: {:.1}%\n\
         Cycles: {} ({} headers involved)   ADP: {:.1}/100\n\
         Quality: {:.1}/100   Interface ratio: {:.1}%   {}\n\
         Mode: {}   TUs: {}\n",
        stats.node_count,
        stats.edge_count,
        stats.sparsity * 100.0,
        stats.cycle_count,
        stats.cycle_member_count,
        stats.adp_score,
        stats.quality_score,
        stats.interface_ratio * 100.0,
        stats.health,
        if snapshot.precise { "precise" } else { "heuristic" },
        snapshot.tu_count(),
    )
}

/// Summary of a delta for terminal display.
#[must_use]
pub fn render_delta(delta: &DsmDelta) -> String {
    let mut out = format!(
        "Nodes: +{} -{}   Edges: +{} -{}\n\
         Cycles: +{} resolved {}   Quality delta: {:+.1}\n\
         Coupling mean: {:.2} -> {:.2} ({:+.1}%)\n",
        delta.nodes_added.len(),
        delta.nodes_removed.len(),
        delta.edges_added.len(),
        delta.edges_removed.len(),
        delta.cycles_added.len(),
        delta.cycles_resolved.len(),
        delta.quality_delta,
        delta.commentary.baseline.mean,
        delta.commentary.current.mean,
        delta.commentary.mean_change_pct,
    );
    for recommendation in &delta.recommendations {
        out.push_str(&format!(
            "[{}] {}\n",
            match recommendation.severity {
                crate::diff::Severity::Critical => "CRITICAL",
                crate::diff::Severity::Warning => "WARNING",
                crate::diff::Severity::Info => "INFO",
            },
            recommendation.message
        ));
    }
    out
}

/// Prints any serializable value as pretty JSON on stdout.
///
/// # Errors
///
/// Returns `invalid_input` when serialization fails.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| crate::error::Error::InvalidInput(format!("JSON output failed: {e}")))?;
    println!("{json}");
    Ok(())
}
