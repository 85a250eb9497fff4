// src/graph/layers.rs
//! Topological layering of a graph that is allowed to contain cycles.
//!
//! Each SCC is contracted to a single vertex, the contracted DAG is layered
//! with Kahn's algorithm, and the layer is projected back onto every member.
//! Layer 0 is the foundation: nodes (or cycle groups) with no dependencies.
//! A node's layer is 1 + the maximum layer among its contracted dependencies.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::PathBuf;

use super::scc::SccResult;
use super::IncludeGraph;
use crate::error::{Error, Result};

/// Per-node layer assignment plus the layer -> members view.
pub struct LayerAssignment {
    pub layer_of: BTreeMap<PathBuf, usize>,
    /// `layers[i]` = members of layer i, sorted alphabetically.
    pub layers: Vec<Vec<PathBuf>>,
}

/// Layers `graph` via its SCC condensation.
///
/// # Errors
///
/// Returns `analysis_error` if the condensation still contains a cycle,
/// which would mean the SCC computation is broken.
pub fn assign_layers(graph: &IncludeGraph, scc: &SccResult) -> Result<LayerAssignment> {
    let component_count = scc.components.len();

    // Condensed dependency edges: component -> components it depends on.
    let mut deps: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); component_count];
    let mut dependents: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); component_count];
    for (from, to) in graph.edge_pairs() {
        let from_id = scc.id_of[from];
        let to_id = scc.id_of[to];
        if from_id != to_id {
            deps[from_id].insert(to_id);
            dependents[to_id].insert(from_id);
        }
    }

    // Kahn over the condensation, dependencies first.
    let mut remaining: Vec<usize> = deps.iter().map(BTreeSet::len).collect();
    let mut layer: Vec<Option<usize>> = vec![None; component_count];
    let mut queue: VecDeque<usize> = (0..component_count).filter(|&c| remaining[c] == 0).collect();

    let mut assigned = 0usize;
    while let Some(component) = queue.pop_front() {
        let depth = deps[component]
            .iter()
            .map(|&d| layer[d].map_or(0, |l| l + 1))
            .max()
            .unwrap_or(0);
        layer[component] = Some(depth);
        assigned += 1;
        for &dependent in &dependents[component] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if assigned != component_count {
        return Err(Error::AnalysisError(format!(
            "condensation still cyclic: {assigned}/{component_count} components layered"
        )));
    }

    let mut layer_of: BTreeMap<PathBuf, usize> = BTreeMap::new();
    let mut max_layer = 0usize;
    for (id, component) in scc.components.iter().enumerate() {
        let depth = layer[id].unwrap_or(0);
        max_layer = max_layer.max(depth);
        for member in component {
            layer_of.insert(member.clone(), depth);
        }
    }

    let mut layers: Vec<Vec<PathBuf>> = vec![Vec::new(); if layer_of.is_empty() { 0 } else { max_layer + 1 }];
    for (node, &depth) in &layer_of {
        layers[depth].push(node.clone());
    }
    // BTreeMap iteration already yields sorted members per layer.

    Ok(LayerAssignment { layer_of, layers })
}
