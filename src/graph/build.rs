// src/graph/build.rs
//! Builds the header -> header include graph and the TU inverse index.
//!
//! Two construction modes. When direct-include pairs are available (from a
//! header-text scan) the graph is precise. Otherwise the TU-level transitive
//! inclusion sets are folded through a co-occurrence proxy: headers of a TU
//! are chained in canonical order, skipping pairs already connected
//! transitively. The proxy is deliberately conservative and the snapshot
//! records `precise=false` so no consumer mistakes it for direct-include
//! semantics.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, warn};

use super::IncludeGraph;
use crate::config::NODE_WARN_THRESHOLD;
use crate::ingest::ScanIngest;
use crate::paths::PathClass;

/// The built graph plus the indexes the impact engine needs.
#[derive(Debug, Clone, Default)]
pub struct GraphBuild {
    pub graph: IncludeGraph,
    /// header -> TUs whose inclusion set contains it.
    pub header_to_tus: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    pub precise: bool,
}

/// Builds a precise graph from direct-include pairs.
#[must_use]
pub fn build_from_direct(
    ingest: &ScanIngest,
    direct_edges: &[(PathBuf, PathBuf)],
    include_system: bool,
) -> GraphBuild {
    let keep = |path: &PathBuf| -> bool {
        include_system || ingest.classes.get(path) != Some(&PathClass::System)
    };

    let mut graph = IncludeGraph::new();
    for header in ingest.project_headers() {
        graph.add_node(header);
    }
    for (from, to) in direct_edges {
        if keep(from) && keep(to) {
            graph.add_edge(from.clone(), to.clone());
        }
    }
    warn_if_large(&graph);
    GraphBuild {
        graph,
        header_to_tus: invert(ingest),
        precise: true,
    }
}

/// Builds the co-occurrence proxy graph from TU inclusion sets.
#[must_use]
pub fn build_from_cooccurrence(ingest: &ScanIngest, include_system: bool) -> GraphBuild {
    let keep = |path: &PathBuf| -> bool {
        crate::paths::is_header(path)
            && (include_system || ingest.classes.get(path) != Some(&PathClass::System))
    };

    let mut graph = IncludeGraph::new();
    for header in ingest.project_headers() {
        graph.add_node(header);
    }

    // TUs in sorted order, pairs in sorted order: the proxy is deterministic
    // by construction. An edge is added only when the pair is not already
    // connected transitively, which keeps the proxy sparse and acyclic.
    for deps in ingest.source_to_deps.values() {
        let headers: Vec<&PathBuf> = deps.iter().filter(|d| keep(*d)).collect();
        for window in headers.windows(2) {
            let (u, v) = (window[0], window[1]);
            if !graph.is_reachable(u, v) {
                graph.add_edge(u.clone(), v.clone());
            }
        }
    }
    warn_if_large(&graph);
    GraphBuild {
        graph,
        header_to_tus: invert(ingest),
        precise: false,
    }
}

/// Inverse index: header -> TUs including it. System headers are kept out
/// of the graph but stay visible here, so rebuild impact through them is
/// preserved on the source-TU side.
fn invert(ingest: &ScanIngest) -> BTreeMap<PathBuf, BTreeSet<PathBuf>> {
    let mut map: BTreeMap<PathBuf, BTreeSet<PathBuf>> = BTreeMap::new();
    for (tu, deps) in &ingest.source_to_deps {
        for dep in deps {
            if crate::paths::is_header(dep) {
                map.entry(dep.clone()).or_default().insert(tu.clone());
            }
        }
    }
    map
}

fn warn_if_large(graph: &IncludeGraph) {
    if graph.node_count() > NODE_WARN_THRESHOLD {
        warn!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "graph exceeds {NODE_WARN_THRESHOLD} nodes; matrix rendering may be refused"
        );
    }
}

/// Scans header files on disk for `#include` directives and resolves them
/// against the known header set. Resolution tries the includer's directory
/// first, then a basename lookup preferring a matching path suffix.
/// Unreadable headers are skipped.
#[must_use]
pub fn scan_header_includes(
    headers: &BTreeSet<PathBuf>,
    project_root: &Path,
) -> Vec<(PathBuf, PathBuf)> {
    let include_re = Regex::new(r#"^\s*#\s*include\s+["<]([^">]+)[">]"#).expect("static regex");

    let mut by_basename: BTreeMap<&std::ffi::OsStr, Vec<&PathBuf>> = BTreeMap::new();
    for header in headers {
        if let Some(name) = header.file_name() {
            by_basename.entry(name).or_default().push(header);
        }
    }

    let mut edges = Vec::new();
    for header in headers {
        let on_disk = if header.is_absolute() {
            header.clone()
        } else {
            project_root.join(header)
        };
        let Ok(text) = fs::read_to_string(&on_disk) else {
            continue;
        };
        let header_dir = header.parent().unwrap_or_else(|| Path::new(""));
        for line in text.lines() {
            let Some(captures) = include_re.captures(line) else {
                continue;
            };
            let spec = &captures[1];
            if let Some(resolved) = resolve_include(spec, header_dir, headers, &by_basename) {
                if resolved != *header {
                    edges.push((header.clone(), resolved));
                }
            }
        }
    }
    debug!(edges = edges.len(), "scanned direct header includes");
    edges.sort();
    edges.dedup();
    edges
}

fn resolve_include(
    spec: &str,
    header_dir: &Path,
    headers: &BTreeSet<PathBuf>,
    by_basename: &BTreeMap<&std::ffi::OsStr, Vec<&PathBuf>>,
) -> Option<PathBuf> {
    let relative = crate::paths::normalize_components(&header_dir.join(spec));
    if headers.contains(&relative) {
        return Some(relative);
    }
    let spec_path = Path::new(spec);
    let candidates = by_basename.get(spec_path.file_name()?)?;
    if let [only] = candidates.as_slice() {
        return Some((*only).clone());
    }
    candidates
        .iter()
        .find(|c| c.ends_with(spec_path))
        .or_else(|| candidates.first())
        .map(|c| (*c).clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    fn ingest_with(tus: &[(&str, &[&str])]) -> ScanIngest {
        let mut ingest = ScanIngest::default();
        for (tu, deps) in tus {
            let set: BTreeSet<PathBuf> = deps.iter().map(|d| p(d)).collect();
            for d in &set {
                ingest.classes.insert(d.clone(), PathClass::Project);
            }
            ingest.classes.insert(p(tu), PathClass::Project);
            ingest.source_to_deps.insert(p(tu), set);
        }
        ingest
    }

    #[test]
    fn direct_mode_is_precise() {
        let ingest = ingest_with(&[("a.cpp", &["a.h", "b.h"])]);
        let edges = vec![(p("a.h"), p("b.h"))];
        let build = build_from_direct(&ingest, &edges, false);
        assert!(build.precise);
        assert!(build.graph.has_edge(&p("a.h"), &p("b.h")));
    }

    #[test]
    fn cooccurrence_chains_headers_without_cycles() {
        let ingest = ingest_with(&[
            ("a.cpp", &["a.h", "b.h", "c.h"]),
            ("b.cpp", &["b.h", "c.h"]),
        ]);
        let build = build_from_cooccurrence(&ingest, false);
        assert!(!build.precise);
        assert!(build.graph.is_acyclic());
        assert!(build.graph.is_reachable(&p("a.h"), &p("c.h")));
    }

    #[test]
    fn cooccurrence_skips_transitive_duplicates() {
        let ingest = ingest_with(&[("a.cpp", &["a.h", "b.h", "c.h"])]);
        let build = build_from_cooccurrence(&ingest, false);
        // a->b and b->c connect a to c; no a->c edge is added.
        assert!(!build.graph.has_edge(&p("a.h"), &p("c.h")));
        assert_eq!(build.graph.edge_count(), 2);
    }

    #[test]
    fn inverse_index_maps_headers_to_tus() {
        let ingest = ingest_with(&[
            ("a.cpp", &["shared.h"]),
            ("b.cpp", &["shared.h", "b.h"]),
        ]);
        let build = build_from_cooccurrence(&ingest, false);
        let tus = &build.header_to_tus[&p("shared.h")];
        assert_eq!(tus.len(), 2);
        assert!(tus.contains(&p("a.cpp")) && tus.contains(&p("b.cpp")));
    }

    #[test]
    fn system_headers_stay_out_of_graph_but_keep_tu_mapping() {
        let mut ingest = ingest_with(&[("a.cpp", &["a.h"])]);
        let sys = p("/usr/include/vector.h");
        ingest.classes.insert(sys.clone(), PathClass::System);
        ingest
            .source_to_deps
            .get_mut(&p("a.cpp"))
            .unwrap()
            .insert(sys.clone());
        let build = build_from_cooccurrence(&ingest, false);
        assert!(!build.graph.contains_node(&sys));
        assert!(build.header_to_tus[&sys].contains(&p("a.cpp")));
    }

    #[test]
    fn header_text_scan_resolves_relative_and_basename() {
        let dir = tempfile::tempdir().unwrap();
        let inc = dir.path().join("inc");
        fs::create_dir_all(&inc).unwrap();
        fs::write(inc.join("a.h"), "#include \"b.h\"\n#include <deep/c.h>\n").unwrap();
        fs::write(inc.join("b.h"), "// nothing\n").unwrap();
        fs::create_dir_all(inc.join("deep")).unwrap();
        fs::write(inc.join("deep/c.h"), "#pragma once\n").unwrap();

        let headers: BTreeSet<PathBuf> = [p("inc/a.h"), p("inc/b.h"), p("inc/deep/c.h")]
            .into_iter()
            .collect();
        let edges = scan_header_includes(&headers, dir.path());
        assert!(edges.contains(&(p("inc/a.h"), p("inc/b.h"))));
        assert!(edges.contains(&(p("inc/a.h"), p("inc/deep/c.h"))));
    }
}
