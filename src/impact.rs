// src/impact.rs
//! Rebuild impact: which translation units recompile for a set of changes.
//!
//! The direct set comes straight from the inverse index (a changed header
//! forces every TU whose inclusion set contains it). The closure set
//! additionally walks the include graph backwards from each changed header
//! and re-expands, so it is always a superset; the diff and advisor stages
//! read that one.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::graph::IncludeGraph;
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RebuildImpact {
    /// Changed files that are TUs themselves.
    pub changed_sources: Vec<PathBuf>,
    /// Changed files treated as headers.
    pub changed_headers: Vec<PathBuf>,
    /// TUs that must recompile, from direct inclusion-set lookups.
    pub direct_tus: Vec<PathBuf>,
    /// TUs reached through the header-graph closure; superset of direct.
    pub closure_tus: Vec<PathBuf>,
    pub tu_universe: usize,
    /// |direct| / universe, in percent.
    pub direct_percentage: f64,
    pub closure_percentage: f64,
}

/// Computes the rebuild impact of `changed` against `snapshot`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute(snapshot: &Snapshot, changed: &[PathBuf]) -> RebuildImpact {
    let inverse = snapshot.header_to_tus();
    let universe = snapshot.tu_count();

    let mut changed_sources: BTreeSet<PathBuf> = BTreeSet::new();
    let mut changed_headers: BTreeSet<PathBuf> = BTreeSet::new();
    for path in changed {
        if snapshot.source_to_deps.contains_key(path) {
            changed_sources.insert(path.clone());
        } else {
            changed_headers.insert(path.clone());
        }
    }

    let mut direct: BTreeSet<PathBuf> = changed_sources.clone();
    for header in &changed_headers {
        if let Some(tus) = inverse.get(header) {
            direct.extend(tus.iter().cloned());
        }
    }

    let reverse = snapshot.graph.reverse_edges();
    let mut closure: BTreeSet<PathBuf> = direct.clone();
    for header in &changed_headers {
        closure.extend(expand_header(&snapshot.graph, &reverse, header, inverse));
    }

    let direct_percentage = percentage(direct.len(), universe);
    let closure_percentage = percentage(closure.len(), universe);
    RebuildImpact {
        changed_sources: changed_sources.into_iter().collect(),
        changed_headers: changed_headers.into_iter().collect(),
        direct_tus: direct.into_iter().collect(),
        closure_tus: closure.into_iter().collect(),
        tu_universe: universe,
        direct_percentage,
        closure_percentage,
    }
}

/// TUs affected by one header through the include graph: the header plus
/// every header that reaches it, re-expanded through the inverse index.
pub(crate) fn expand_header(
    graph: &IncludeGraph,
    reverse: &BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    header: &PathBuf,
    inverse: &BTreeMap<PathBuf, BTreeSet<PathBuf>>,
) -> BTreeSet<PathBuf> {
    let mut affected_headers = graph.ancestors_via(header, reverse);
    affected_headers.insert(header.clone());

    let mut tus = BTreeSet::new();
    for h in &affected_headers {
        if let Some(set) = inverse.get(h) {
            tus.extend(set.iter().cloned());
        }
    }
    tus
}

#[allow(clippy::cast_precision_loss)]
fn percentage(count: usize, universe: usize) -> f64 {
    if universe == 0 {
        0.0
    } else {
        100.0 * count as f64 / universe as f64
    }
}
