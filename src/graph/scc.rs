// src/graph/scc.rs
//! Strongly connected components via iterative Tarjan.
//!
//! Components are the cycle unit of the whole analysis: a singleton SCC
//! without a self-loop is not a cycle. The recursion is unrolled onto an
//! explicit frame stack so pathological include chains cannot blow the
//! thread stack.

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::IncludeGraph;

pub struct SccResult {
    /// Each component sorted internally; components ordered by their
    /// smallest member. Component index = SCC id.
    pub components: Vec<Vec<PathBuf>>,
    pub id_of: BTreeMap<PathBuf, usize>,
}

impl SccResult {
    #[must_use]
    pub fn id(&self, node: &PathBuf) -> Option<usize> {
        self.id_of.get(node).copied()
    }
}

#[derive(Clone, Copy)]
struct NodeState {
    index: usize,
    lowlink: usize,
    on_stack: bool,
}

struct Frame<'a> {
    node: &'a PathBuf,
    neighbors: Vec<&'a PathBuf>,
    cursor: usize,
}

enum Step<'a> {
    Visit { from: &'a PathBuf, next: &'a PathBuf },
    Finish { node: &'a PathBuf },
}

/// Computes all SCCs of `graph` with deterministic ids.
#[must_use]
pub fn strongly_connected(graph: &IncludeGraph) -> SccResult {
    let mut states: BTreeMap<&PathBuf, NodeState> = BTreeMap::new();
    let mut stack: Vec<&PathBuf> = Vec::new();
    let mut next_index = 0usize;
    let mut raw_components: Vec<Vec<PathBuf>> = Vec::new();

    for root in graph.nodes() {
        if states.contains_key(root) {
            continue;
        }
        let mut frames: Vec<Frame> = Vec::new();
        open_frame(graph, root, &mut frames, &mut states, &mut stack, &mut next_index);

        loop {
            let step = {
                let Some(frame) = frames.last_mut() else { break };
                if frame.cursor < frame.neighbors.len() {
                    let next = frame.neighbors[frame.cursor];
                    frame.cursor += 1;
                    Step::Visit { from: frame.node, next }
                } else {
                    Step::Finish { node: frame.node }
                }
            };

            match step {
                Step::Visit { from, next } => {
                    if let Some(state) = states.get(next) {
                        if state.on_stack {
                            let next_index = state.index;
                            let entry = states.get_mut(from).expect("open frame has state");
                            entry.lowlink = entry.lowlink.min(next_index);
                        }
                    } else {
                        open_frame(graph, next, &mut frames, &mut states, &mut stack, &mut next_index);
                    }
                }
                Step::Finish { node } => {
                    frames.pop();
                    let state = states[node];
                    if state.lowlink == state.index {
                        let mut component = Vec::new();
                        loop {
                            let member = stack.pop().expect("tarjan stack underflow");
                            states.get_mut(member).expect("member has state").on_stack = false;
                            component.push(member.clone());
                            if member == node {
                                break;
                            }
                        }
                        component.sort();
                        raw_components.push(component);
                    }
                    if let Some(parent) = frames.last() {
                        let entry = states.get_mut(parent.node).expect("parent has state");
                        entry.lowlink = entry.lowlink.min(state.lowlink);
                    }
                }
            }
        }
    }

    raw_components.sort_by(|a, b| a[0].cmp(&b[0]));
    let mut id_of = BTreeMap::new();
    for (id, component) in raw_components.iter().enumerate() {
        for member in component {
            id_of.insert(member.clone(), id);
        }
    }
    SccResult {
        components: raw_components,
        id_of,
    }
}

fn open_frame<'a>(
    graph: &'a IncludeGraph,
    node: &'a PathBuf,
    frames: &mut Vec<Frame<'a>>,
    states: &mut BTreeMap<&'a PathBuf, NodeState>,
    stack: &mut Vec<&'a PathBuf>,
    next_index: &mut usize,
) {
    states.insert(
        node,
        NodeState {
            index: *next_index,
            lowlink: *next_index,
            on_stack: true,
        },
    );
    *next_index += 1;
    stack.push(node);
    frames.push(Frame {
        node,
        neighbors: graph.out_edges(node).collect(),
        cursor: 0,
    });
}

/// Multi-member SCCs (plus self-loop singletons), as sorted path lists.
#[must_use]
pub fn cycles(graph: &IncludeGraph, scc: &SccResult) -> Vec<Vec<PathBuf>> {
    scc.components
        .iter()
        .filter(|component| {
            component.len() > 1
                || (component.len() == 1 && graph.has_edge(&component[0], &component[0]))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    #[test]
    fn triangle_is_one_component() {
        let mut g = IncludeGraph::new();
        g.add_edge(p("a.h"), p("b.h"));
        g.add_edge(p("b.h"), p("c.h"));
        g.add_edge(p("c.h"), p("a.h"));
        let scc = strongly_connected(&g);
        assert_eq!(scc.components.len(), 1);
        assert_eq!(scc.components[0], vec![p("a.h"), p("b.h"), p("c.h")]);
        assert_eq!(cycles(&g, &scc).len(), 1);
    }

    #[test]
    fn dag_yields_singletons_and_no_cycles() {
        let mut g = IncludeGraph::new();
        g.add_edge(p("a.h"), p("b.h"));
        g.add_edge(p("b.h"), p("c.h"));
        let scc = strongly_connected(&g);
        assert_eq!(scc.components.len(), 3);
        assert!(cycles(&g, &scc).is_empty());
    }

    #[test]
    fn two_separate_cycles() {
        let mut g = IncludeGraph::new();
        g.add_edge(p("a.h"), p("b.h"));
        g.add_edge(p("b.h"), p("a.h"));
        g.add_edge(p("x.h"), p("y.h"));
        g.add_edge(p("y.h"), p("x.h"));
        g.add_edge(p("b.h"), p("x.h"));
        let scc = strongly_connected(&g);
        let cyc = cycles(&g, &scc);
        assert_eq!(cyc.len(), 2);
        assert_eq!(cyc[0], vec![p("a.h"), p("b.h")]);
        assert_eq!(cyc[1], vec![p("x.h"), p("y.h")]);
    }

    #[test]
    fn members_of_same_scc_reach_each_other() {
        let mut g = IncludeGraph::new();
        g.add_edge(p("a.h"), p("b.h"));
        g.add_edge(p("b.h"), p("c.h"));
        g.add_edge(p("c.h"), p("a.h"));
        g.add_edge(p("c.h"), p("d.h"));
        let scc = strongly_connected(&g);
        for component in &scc.components {
            for u in component {
                for v in component {
                    assert!(g.is_reachable(u, v), "{u:?} must reach {v:?}");
                }
            }
        }
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let mut g = IncludeGraph::new();
        for i in 0..20_000 {
            g.add_edge(p(&format!("h{i:06}.h")), p(&format!("h{:06}.h", i + 1)));
        }
        let scc = strongly_connected(&g);
        assert_eq!(scc.components.len(), 20_001);
    }
}
