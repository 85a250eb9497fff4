// src/libgraph.rs
//! Library-level dependency analysis from `build.ninja` link rules.
//!
//! A parallel path to the header analysis: link lines are parsed textually,
//! order-only dependencies (after `||`) become edges, and the resulting
//! library graph gets fan-in/fan-out/depth/transitive-dependent metrics
//! plus SCC-based cycle detection. No ninja invocation happens here.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::Result;
use crate::graph::{layers, scc, IncludeGraph};

const LIBRARY_SUFFIXES: &[&str] = &[".a", ".so", ".dylib", ".lib"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryGraph {
    /// library -> libraries it depends on.
    pub lib_deps: BTreeMap<String, BTreeSet<String>>,
    /// executable -> libraries it links.
    pub exe_deps: BTreeMap<String, BTreeSet<String>>,
    pub libraries: BTreeSet<String>,
    pub executables: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryMetrics {
    pub fan_in: usize,
    pub fan_out: usize,
    /// Longest dependency path from this library to a leaf.
    pub depth: usize,
    /// Libraries and executables that transitively depend on this one.
    pub transitive_dependents: usize,
}

/// Parses `build.ninja` text into the library graph.
///
/// Recognizes `build <targets>: <RULE> <inputs> [| implicit] [|| order-only]`
/// lines whose rule is in the configured library/executable sets; `$` line
/// continuations are joined first.
#[must_use]
pub fn parse_build_ninja(text: &str, config: &Config) -> LibraryGraph {
    let build_re = Regex::new(r"^build\s+([^:]+):\s*(\S+)\s*(.*)$").expect("static regex");

    let mut graph = LibraryGraph::default();
    for line in joined_lines(text) {
        let Some(captures) = build_re.captures(&line) else {
            continue;
        };
        let targets = captures[1].trim().to_string();
        let rule = captures[2].to_string();
        let rest = captures[3].to_string();

        let is_lib = config.library_rules.iter().any(|r| r == &rule);
        let is_exe = config.executable_rules.iter().any(|r| r == &rule);
        if !is_lib && !is_exe {
            continue;
        }

        let Some(target) = targets.split_whitespace().next() else {
            continue;
        };
        let name = infer_library_name(target);

        let deps: BTreeSet<String> = rest
            .split("||")
            .nth(1)
            .map(|section| {
                section
                    .split_whitespace()
                    .filter(|token| {
                        LIBRARY_SUFFIXES.iter().any(|suffix| token.ends_with(suffix))
                    })
                    .map(infer_library_name)
                    .collect()
            })
            .unwrap_or_default();

        if is_lib {
            graph.libraries.insert(name.clone());
            for dep in &deps {
                if dep != &name {
                    graph.libraries.insert(dep.clone());
                    graph.lib_deps.entry(name.clone()).or_default().insert(dep.clone());
                }
            }
        } else {
            graph.executables.insert(name.clone());
            for dep in &deps {
                graph.libraries.insert(dep.clone());
                graph.exe_deps.entry(name.clone()).or_default().insert(dep.clone());
            }
        }
    }
    debug!(
        libraries = graph.libraries.len(),
        executables = graph.executables.len(),
        "parsed build.ninja link rules"
    );
    graph
}

/// Logical name from a link target: basename, minus `lib` prefix and the
/// platform library suffix.
#[must_use]
pub fn infer_library_name(target: &str) -> String {
    let base = Path::new(target)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(target);
    let mut name = base;
    for suffix in LIBRARY_SUFFIXES {
        if let Some(stripped) = name.strip_suffix(suffix) {
            name = stripped;
            break;
        }
    }
    name.strip_prefix("lib").unwrap_or(name).to_string()
}

impl LibraryGraph {
    /// Per-library metrics; depth comes from the layered condensation, so
    /// cyclic library groups share a depth instead of diverging.
    ///
    /// # Errors
    ///
    /// Propagates `analysis_error` from the layer assignment.
    pub fn metrics(&self) -> Result<BTreeMap<String, LibraryMetrics>> {
        let include_graph = self.as_include_graph(false);
        let scc_result = scc::strongly_connected(&include_graph);
        let assignment = layers::assign_layers(&include_graph, &scc_result)?;
        let dependents = self.transitive_dependents();

        let mut metrics = BTreeMap::new();
        for lib in &self.libraries {
            let fan_out = self.lib_deps.get(lib).map_or(0, BTreeSet::len);
            let fan_in = self
                .lib_deps
                .values()
                .chain(self.exe_deps.values())
                .filter(|deps| deps.contains(lib))
                .count();
            let key = PathBuf::from(lib);
            metrics.insert(
                lib.clone(),
                LibraryMetrics {
                    fan_in,
                    fan_out,
                    depth: assignment.layer_of.get(&key).copied().unwrap_or(0),
                    transitive_dependents: dependents.get(lib).map_or(0, BTreeSet::len),
                },
            );
        }
        Ok(metrics)
    }

    /// Circular library groups, each sorted.
    #[must_use]
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let include_graph = self.as_include_graph(false);
        let scc_result = scc::strongly_connected(&include_graph);
        scc::cycles(&include_graph, &scc_result)
            .into_iter()
            .map(|component| {
                component
                    .into_iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect()
            })
            .collect()
    }

    /// Libraries no executable or library depends on.
    #[must_use]
    pub fn unused_libraries(&self) -> BTreeSet<String> {
        let mut used: BTreeSet<&String> = BTreeSet::new();
        for deps in self.lib_deps.values().chain(self.exe_deps.values()) {
            used.extend(deps);
        }
        self.libraries
            .iter()
            .filter(|lib| !used.contains(lib))
            .cloned()
            .collect()
    }

    /// BFS over reversed edges, executables included as dependents.
    #[must_use]
    pub fn transitive_dependents(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut reverse: BTreeMap<&String, BTreeSet<&String>> = BTreeMap::new();
        for (owner, deps) in self.lib_deps.iter().chain(self.exe_deps.iter()) {
            for dep in deps {
                reverse.entry(dep).or_default().insert(owner);
            }
        }

        let mut result = BTreeMap::new();
        for lib in &self.libraries {
            let mut seen: BTreeSet<String> = BTreeSet::new();
            let mut queue: VecDeque<&String> =
                reverse.get(lib).into_iter().flatten().copied().collect();
            while let Some(node) = queue.pop_front() {
                if seen.insert(node.clone()) {
                    queue.extend(reverse.get(node).into_iter().flatten().copied());
                }
            }
            result.insert(lib.clone(), seen);
        }
        result
    }

    /// Library edges as an `IncludeGraph` so the SCC and layer machinery
    /// applies unchanged. Executable edges are optional.
    fn as_include_graph(&self, with_executables: bool) -> IncludeGraph {
        let mut graph = IncludeGraph::new();
        for lib in &self.libraries {
            graph.add_node(PathBuf::from(lib));
        }
        for (owner, deps) in &self.lib_deps {
            for dep in deps {
                graph.add_edge(PathBuf::from(owner), PathBuf::from(dep));
            }
        }
        if with_executables {
            for (owner, deps) in &self.exe_deps {
                for dep in deps {
                    graph.add_edge(PathBuf::from(owner), PathBuf::from(dep));
                }
            }
        }
        graph
    }
}

/// Joins ninja `$` line continuations.
fn joined_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for raw in text.lines() {
        let trimmed = raw.trim_end();
        if let Some(head) = trimmed.strip_suffix('$') {
            current.push_str(head);
            current.push(' ');
            continue;
        }
        current.push_str(trimmed);
        lines.push(std::mem::take(&mut current));
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    const NINJA: &str = "\
rule CXX_STATIC_LIBRARY_LINKER\n  command = ar rcs $out $in\n\
build lib/libCore.a: CXX_STATIC_LIBRARY_LINKER core.o\n\
build lib/libUtil.a: CXX_STATIC_LIBRARY_LINKER util.o || lib/libCore.a\n\
build lib/libNet.a: CXX_STATIC_LIBRARY_LINKER net.o || lib/libCore.a lib/libUtil.a\n\
build bin/app: CXX_EXECUTABLE_LINKER main.o || lib/libNet.a\n\
build lib/libLoose.a: CXX_STATIC_LIBRARY_LINKER loose.o\n";

    #[test]
    fn name_inference_strips_prefix_and_suffix() {
        assert_eq!(infer_library_name("lib/libCore.a"), "Core");
        assert_eq!(infer_library_name("libFoo.so"), "Foo");
        assert_eq!(infer_library_name("Bar.lib"), "Bar");
        assert_eq!(infer_library_name("bin/app"), "app");
    }

    #[test]
    fn parses_link_rules_and_order_only_deps() {
        let graph = parse_build_ninja(NINJA, &Config::new());
        assert_eq!(graph.libraries.len(), 4);
        assert_eq!(graph.executables.len(), 1);
        assert!(graph.lib_deps["Util"].contains("Core"));
        assert!(graph.exe_deps["app"].contains("Net"));
    }

    #[test]
    fn metrics_cover_depth_and_dependents() {
        let graph = parse_build_ninja(NINJA, &Config::new());
        let metrics = graph.metrics().unwrap();
        assert_eq!(metrics["Core"].depth, 0);
        assert_eq!(metrics["Util"].depth, 1);
        assert_eq!(metrics["Net"].depth, 2);
        assert_eq!(metrics["Core"].fan_in, 2);
        // Core's dependents: Util, Net, app.
        assert_eq!(metrics["Core"].transitive_dependents, 3);
    }

    #[test]
    fn unused_libraries_found() {
        let graph = parse_build_ninja(NINJA, &Config::new());
        let unused = graph.unused_libraries();
        assert_eq!(unused.len(), 1);
        assert!(unused.contains("Loose"));
        assert!(!unused.contains("Net"), "app links Net");
        assert!(!unused.contains("Core"));
    }

    #[test]
    fn library_cycles_detected() {
        let ninja = "\
build libA.a: CXX_STATIC_LIBRARY_LINKER a.o || libB.a\n\
build libB.a: CXX_STATIC_LIBRARY_LINKER b.o || libA.a\n";
        let graph = parse_build_ninja(ninja, &Config::new());
        let cycles = graph.cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn continuation_lines_are_joined() {
        let ninja = "build libX.a: CXX_STATIC_LIBRARY_LINKER x.o $\n    || libY.a\n";
        let graph = parse_build_ninja(ninja, &Config::new());
        assert!(graph.lib_deps["X"].contains("Y"));
    }
}
