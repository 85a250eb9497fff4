// src/export.rs
//! Exporters: CSV, GraphML, GEXF, DOT, JSON.
//!
//! Every emitter walks the snapshot in sorted canonical-path order and
//! formats floats with a fixed precision, so identical inputs produce
//! byte-identical files.

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::snapshot::Snapshot;

/// CSV: path, fan-out, fan-in, coupling, stability, then the n x n binary
/// matrix with column order equal to row order.
#[must_use]
pub fn to_csv(snapshot: &Snapshot) -> String {
    let nodes: Vec<&PathBuf> = snapshot.graph.nodes().collect();

    let mut out = String::from("path,fan_out,fan_in,coupling,stability");
    for node in &nodes {
        out.push(',');
        out.push_str(&csv_field(&node.display().to_string()));
    }
    out.push('\n');

    for node in &nodes {
        let m = &snapshot.analysis.metrics[*node];
        out.push_str(&format!(
            "{},{},{},{},{:.4}",
            csv_field(&node.display().to_string()),
            m.fan_out,
            m.fan_in,
            m.coupling,
            m.stability
        ));
        for other in &nodes {
            out.push(',');
            out.push(if snapshot.graph.has_edge(node, other) { '1' } else { '0' });
        }
        out.push('\n');
    }
    out
}

/// GraphML with per-node metric attributes and weight-1 edges.
#[must_use]
pub fn to_graphml(snapshot: &Snapshot) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <graphml xmlns=\"http://graphml.graphdrawing.org/xmlns\">\n",
    );
    for (id, ty) in [
        ("fan_in", "int"),
        ("fan_out", "int"),
        ("coupling", "int"),
        ("stability", "double"),
        ("layer", "int"),
        ("pagerank", "double"),
        ("betweenness", "double"),
    ] {
        out.push_str(&format!(
            "  <key id=\"{id}\" for=\"node\" attr.name=\"{id}\" attr.type=\"{ty}\"/>\n"
        ));
    }
    out.push_str("  <key id=\"weight\" for=\"edge\" attr.name=\"weight\" attr.type=\"int\"/>\n");
    out.push_str("  <graph id=\"dsm\" edgedefault=\"directed\">\n");

    for node in snapshot.graph.nodes() {
        let m = &snapshot.analysis.metrics[node];
        let id = xml_escape(&node.display().to_string());
        out.push_str(&format!("    <node id=\"{id}\">\n"));
        out.push_str(&format!("      <data key=\"fan_in\">{}</data>\n", m.fan_in));
        out.push_str(&format!("      <data key=\"fan_out\">{}</data>\n", m.fan_out));
        out.push_str(&format!("      <data key=\"coupling\">{}</data>\n", m.coupling));
        out.push_str(&format!("      <data key=\"stability\">{:.6}</data>\n", m.stability));
        out.push_str(&format!("      <data key=\"layer\">{}</data>\n", m.layer));
        out.push_str(&format!("      <data key=\"pagerank\">{:.6}</data>\n", m.pagerank));
        out.push_str(&format!("      <data key=\"betweenness\">{:.6}</data>\n", m.betweenness));
        out.push_str("    </node>\n");
    }
    for (from, to) in snapshot.graph.edge_pairs() {
        out.push_str(&format!(
            "    <edge source=\"{}\" target=\"{}\"><data key=\"weight\">1</data></edge>\n",
            xml_escape(&from.display().to_string()),
            xml_escape(&to.display().to_string())
        ));
    }
    out.push_str("  </graph>\n</graphml>\n");
    out
}

/// GEXF 1.2 static directed graph.
#[must_use]
pub fn to_gexf(snapshot: &Snapshot) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <gexf xmlns=\"http://www.gexf.net/1.2draft\" version=\"1.2\">\n\
         <graph mode=\"static\" defaultedgetype=\"directed\">\n\
         <attributes class=\"node\">\n",
    );
    for (id, title, ty) in [
        (0, "fan_in", "integer"),
        (1, "fan_out", "integer"),
        (2, "coupling", "integer"),
        (3, "stability", "double"),
        (4, "layer", "integer"),
    ] {
        out.push_str(&format!(
            "  <attribute id=\"{id}\" title=\"{title}\" type=\"{ty}\"/>\n"
        ));
    }
    out.push_str("</attributes>\n<nodes>\n");
    for node in snapshot.graph.nodes() {
        let m = &snapshot.analysis.metrics[node];
        let id = xml_escape(&node.display().to_string());
        out.push_str(&format!("  <node id=\"{id}\" label=\"{id}\">\n    <attvalues>\n"));
        out.push_str(&format!("      <attvalue for=\"0\" value=\"{}\"/>\n", m.fan_in));
        out.push_str(&format!("      <attvalue for=\"1\" value=\"{}\"/>\n", m.fan_out));
        out.push_str(&format!("      <attvalue for=\"2\" value=\"{}\"/>\n", m.coupling));
        out.push_str(&format!("      <attvalue for=\"3\" value=\"{:.6}\"/>\n", m.stability));
        out.push_str(&format!("      <attvalue for=\"4\" value=\"{}\"/>\n", m.layer));
        out.push_str("    </attvalues>\n  </node>\n");
    }
    out.push_str("</nodes>\n<edges>\n");
    for (index, (from, to)) in snapshot.graph.edge_pairs().enumerate() {
        out.push_str(&format!(
            "  <edge id=\"{index}\" source=\"{}\" target=\"{}\" weight=\"1\"/>\n",
            xml_escape(&from.display().to_string()),
            xml_escape(&to.display().to_string())
        ));
    }
    out.push_str("</edges>\n</graph>\n</gexf>\n");
    out
}

/// DOT for Graphviz; cycle SCCs become clusters when `cluster_cycles`.
#[must_use]
pub fn to_dot(snapshot: &Snapshot, cluster_cycles: bool) -> String {
    let mut out = String::from("digraph dsm {\n  rankdir=LR;\n  node [shape=box];\n");
    if cluster_cycles {
        for (index, cycle) in snapshot.analysis.cycles.iter().enumerate() {
            out.push_str(&format!(
                "  subgraph cluster_cycle_{index} {{\n    label=\"cycle {index}\";\n    color=red;\n"
            ));
            for member in cycle {
                out.push_str(&format!("    {};\n", dot_quote(&member.display().to_string())));
            }
            out.push_str("  }\n");
        }
    }
    for (from, to) in snapshot.graph.edge_pairs() {
        out.push_str(&format!(
            "  {} -> {};\n",
            dot_quote(&from.display().to_string()),
            dot_quote(&to.display().to_string())
        ));
    }
    out.push_str("}\n");
    out
}

/// Full snapshot as pretty JSON (BTree ordering keeps it deterministic).
///
/// # Errors
///
/// Returns `invalid_input` when serialization fails.
pub fn to_json(snapshot: &Snapshot) -> Result<String> {
    serde_json::to_string_pretty(snapshot)
        .map_err(|e| Error::InvalidInput(format!("JSON export failed: {e}")))
}

fn csv_field(raw: &str) -> String {
    if raw.contains(',') || raw.contains('"') || raw.contains('\n') {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn dot_quote(raw: &str) -> String {
    format!("\"{}\"", raw.replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::IncludeGraph;
    use crate::ingest::Diagnostics;
    use crate::metrics;
    use crate::paths::FilterSpec;
    use std::collections::{BTreeMap, BTreeSet};

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    fn sample() -> Snapshot {
        let mut graph = IncludeGraph::new();
        graph.add_edge(p("a.h"), p("b.h"));
        graph.add_edge(p("b.h"), p("c.h"));
        graph.add_edge(p("c.h"), p("a.h"));
        let analysis = metrics::analyze_graph(&graph).unwrap();
        let mut source_to_deps = BTreeMap::new();
        source_to_deps.insert(
            p("a.cpp"),
            [p("a.h"), p("b.h"), p("c.h")]
                .into_iter()
                .collect::<BTreeSet<_>>(),
        );
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
    fn csv_matrix_is_square_and_ordered() {
        let csv = to_csv(&sample());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 4, "header + 3 rows");
        assert!(lines[0].starts_with("path,fan_out,fan_in,coupling,stability,a.h,b.h,c.h"));
        // Row a.h: depends only on b.h.
        assert!(lines[1].ends_with("0,1,0"));
        // Every row carries exactly n matrix cells.
        for row in &lines[1..] {
            assert_eq!(row.split(',').count(), 5 + 3);
        }
    }

    #[test]
    fn csv_is_byte_deterministic() {
        let snapshot = sample();
        assert_eq!(to_csv(&snapshot), to_csv(&snapshot));
    }

    #[test]
    fn graphml_has_keys_nodes_edges() {
        let xml = to_graphml(&sample());
        assert!(xml.contains("<key id=\"betweenness\""));
        assert_eq!(xml.matches("<node id=").count(), 3);
        assert_eq!(xml.matches("<edge source=").count(), 3);
        assert!(xml.contains("<data key=\"weight\">1</data>"));
    }

    #[test]
    fn gexf_lists_attributes_and_weighted_edges() {
        let xml = to_gexf(&sample());
        assert!(xml.contains("defaultedgetype=\"directed\""));
        assert_eq!(xml.matches("<edge id=").count(), 3);
        assert!(xml.contains("weight=\"1\""));
    }

    #[test]
    fn dot_clusters_cycles_on_request() {
        let plain = to_dot(&sample(), false);
        assert!(!plain.contains("subgraph"));
        let clustered = to_dot(&sample(), true);
        assert!(clustered.contains("subgraph cluster_cycle_0"));
        assert!(clustered.contains("\"a.h\" -> \"b.h\";"));
    }

    #[test]
    fn json_round_trips_through_serde() {
        let snapshot = sample();
        let json = to_json(&snapshot).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.graph, snapshot.graph);
        assert_eq!(back.analysis.stats, snapshot.analysis.stats);
    }

    #[test]
    fn csv_escapes_awkward_paths() {
        assert_eq!(csv_field("plain.h"), "plain.h");
        assert_eq!(csv_field("with,comma.h"), "\"with,comma.h\"");
        assert_eq!(xml_escape("a<b>.h"), "a&lt;b&gt;.h");
    }
}
