// src/ingest.rs
//! Parses Makefile-style scanner output into per-TU inclusion sets.
//!
//! One logical rule per translation unit: `target: dep1 dep2 \` with
//! backslash continuations and `#` comments. Rules parse independently, so
//! the work is embarrassingly parallel; results are folded into sorted maps
//! afterwards so downstream phases see a deterministic view. A rule that
//! fails to parse is skipped and counted, never fatal.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::paths::{Normalizer, PathClass};

/// Per-snapshot tallies of locally-recovered failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Scanner rules that failed to parse and were skipped.
    pub parse_errors: usize,
    /// Paths dropped because they could not be canonicalized.
    pub path_errors: usize,
    /// TUs from the compile DB with no scanner rule (empty inclusion set).
    pub missing_rules: usize,
}

/// The ingested mapping plus everything the graph builder needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanIngest {
    /// TU source path -> every file its compilation touches (headers of any
    /// class; system headers are filtered later, at graph build).
    pub source_to_deps: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    /// Canonical path -> classification, for every path seen.
    pub classes: BTreeMap<PathBuf, PathClass>,
    pub diagnostics: Diagnostics,
}

impl ScanIngest {
    /// All non-system header paths seen across inclusion sets.
    #[must_use]
    pub fn project_headers(&self) -> BTreeSet<PathBuf> {
        self.classes
            .iter()
            .filter(|(path, class)| {
                **class != PathClass::System && crate::paths::is_header(path)
            })
            .map(|(path, _)| path.clone())
            .collect()
    }

    #[must_use]
    pub fn tu_count(&self) -> usize {
        self.source_to_deps.len()
    }
}

/// One raw parsed rule before path normalization.
struct RawRule {
    target: String,
    deps: Vec<String>,
}

/// Ingests scanner output.
///
/// `expected_sources`, when given, lists the compile DB sources so TUs the
/// scanner skipped still appear (with empty inclusion sets) and are counted.
#[must_use]
pub fn ingest(
    output: &str,
    normalizer: &Normalizer,
    expected_sources: &[PathBuf],
) -> ScanIngest {
    let blocks = split_rules(output);
    let total = blocks.len();

    let parsed: Vec<Option<RawRule>> = blocks.par_iter().map(|b| parse_rule(b)).collect();

    let mut result = ScanIngest::default();
    result.diagnostics.parse_errors = parsed.iter().filter(|p| p.is_none()).count();
    if result.diagnostics.parse_errors > 0 {
        warn!(
            skipped = result.diagnostics.parse_errors,
            total, "scanner rules failed to parse"
        );
    }

    for rule in parsed.into_iter().flatten() {
        let source_raw = strip_object_suffix(&rule.target);
        let Ok((source, source_class)) = normalizer.classify(source_raw) else {
            result.diagnostics.path_errors += 1;
            continue;
        };
        result.classes.insert(source.clone(), source_class);

        let mut deps: BTreeSet<PathBuf> = BTreeSet::new();
        for raw in &rule.deps {
            match normalizer.classify(raw) {
                Ok((dep, class)) => {
                    if dep != source {
                        result.classes.insert(dep.clone(), class);
                        deps.insert(dep);
                    }
                }
                Err(_) => result.diagnostics.path_errors += 1,
            }
        }
        result.source_to_deps.insert(source, deps);
    }

    for expected in expected_sources {
        if let Ok((source, class)) = normalizer.classify(&expected.to_string_lossy()) {
            if !result.source_to_deps.contains_key(&source) {
                result.diagnostics.missing_rules += 1;
                result.classes.insert(source.clone(), class);
                result.source_to_deps.insert(source, BTreeSet::new());
            }
        }
    }

    debug!(
        tus = result.source_to_deps.len(),
        paths = result.classes.len(),
        "ingest complete"
    );
    result
}

/// Splits raw output into logical rule blocks: continuations joined,
/// comments stripped. Pure text, no path interpretation.
fn split_rules(output: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    let mut continuing = false;

    for line in output.lines() {
        let line = match line.find('#') {
            Some(pos) => &line[..pos],
            None => line,
        };
        if line.trim().is_empty() && !continuing {
            continue;
        }

        let trimmed_end = line.trim_end();
        let continues = trimmed_end.ends_with('\\');
        let content = trimmed_end.trim_end_matches('\\');

        if continuing {
            current.push(' ');
            current.push_str(content);
        } else {
            // A line with a target terminates the previous block.
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            current.push_str(content);
        }
        continuing = continues;
    }
    if !current.trim().is_empty() {
        blocks.push(current);
    }
    blocks
}

/// Parses one joined rule. `None` = parse error (counted by the caller).
fn parse_rule(block: &str) -> Option<RawRule> {
    // Split on the first ':' that is not part of a Windows drive prefix.
    let colon = block
        .char_indices()
        .find(|&(i, c)| c == ':' && i != 1)
        .map(|(i, _)| i)?;
    let target = block[..colon].trim();
    if target.is_empty() || target.contains(char::is_whitespace) {
        return None;
    }
    let deps = block[colon + 1..]
        .split_whitespace()
        .map(ToString::to_string)
        .collect();
    Some(RawRule {
        target: target.to_string(),
        deps,
    })
}

fn strip_object_suffix(target: &str) -> &str {
    target
        .strip_suffix(".o")
        .or_else(|| target.strip_suffix(".obj"))
        .unwrap_or(target)
}
