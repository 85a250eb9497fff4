// src/config.rs
//! Explicit configuration for the analysis core.
//!
//! There is no ambient state: every tunable lives here and is threaded
//! through the pipeline by value. Filters are pure data (glob patterns),
//! never callbacks.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::paths::FilterSpec;

/// Coupling delta below which a change is not reported by the diff.
pub const DEFAULT_COUPLING_CHANGE_THRESHOLD: u32 = 5;

/// Divisor for break-even estimation: how many commits touch an average
/// header between refactorings.
pub const DEFAULT_AVG_COMMITS_AFFECTED: f64 = 10.0;

/// Node count above which betweenness switches to sampled sources.
pub const BETWEENNESS_SAMPLE_THRESHOLD: usize = 5_000;

/// Number of source vertices sampled for large-graph betweenness.
pub const BETWEENNESS_SAMPLE_SIZE: usize = 500;

/// Default timeout for the external include scanner, in seconds.
pub const DEFAULT_SCANNER_TIMEOUT_SECS: u64 = 300;

/// Node count above which the builder emits a size warning.
pub const NODE_WARN_THRESHOLD: usize = 50_000;

/// System include prefixes recognized out of the box.
pub const SYSTEM_PREFIXES: &[&str] = &[
    "/usr/",
    "/lib/",
    "/opt/",
    "/Library/",
    "/Applications/Xcode.app/",
];

/// Ninja rule names treated as library link steps.
pub const LIBRARY_RULES: &[&str] = &[
    "CXX_STATIC_LIBRARY_LINKER",
    "CXX_SHARED_LIBRARY_LINKER",
    "C_STATIC_LIBRARY_LINKER",
    "C_SHARED_LIBRARY_LINKER",
];

/// Ninja rule names treated as executable link steps.
pub const EXECUTABLE_RULES: &[&str] = &["CXX_EXECUTABLE_LINKER", "C_EXECUTABLE_LINKER"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Include/exclude glob filters applied to header paths.
    pub filter: FilterSpec,
    /// Prefixes classifying a path as a system header.
    pub system_prefixes: Vec<String>,
    /// Globs classifying a path as third-party (default `*/ThirdParty/*`).
    pub third_party_globs: Vec<String>,
    /// Keep system headers in the graph (off by default).
    pub include_system_headers: bool,
    /// Minimum |coupling delta| reported by the differential analyzer.
    pub coupling_change_threshold: u32,
    /// Average commits touching a header, for break-even estimation.
    pub avg_commits_affected: f64,
    /// External scanner timeout in seconds.
    pub scanner_timeout_secs: u64,
    /// Hard ceiling on graph nodes; `None` means unlimited.
    pub max_nodes: Option<usize>,
    /// Ninja rule names recognized as library links.
    pub library_rules: Vec<String>,
    /// Ninja rule names recognized as executable links.
    pub executable_rules: Vec<String>,
    pub verbose: bool,
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self {
            filter: FilterSpec::default(),
            system_prefixes: SYSTEM_PREFIXES.iter().map(|s| (*s).to_string()).collect(),
            third_party_globs: vec!["*/ThirdParty/*".to_string()],
            include_system_headers: false,
            coupling_change_threshold: DEFAULT_COUPLING_CHANGE_THRESHOLD,
            avg_commits_affected: DEFAULT_AVG_COMMITS_AFFECTED,
            scanner_timeout_secs: DEFAULT_SCANNER_TIMEOUT_SECS,
            max_nodes: None,
            library_rules: LIBRARY_RULES.iter().map(|s| (*s).to_string()).collect(),
            executable_rules: EXECUTABLE_RULES.iter().map(|s| (*s).to_string()).collect(),
            verbose: false,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `invalid_input` if a glob pattern is malformed or a numeric
    /// tunable is out of range.
    pub fn validate(&self) -> Result<()> {
        self.filter.validate()?;
        for g in &self.third_party_globs {
            glob::Pattern::new(g)
                .map_err(|e| Error::InvalidInput(format!("bad third-party glob '{g}': {e}")))?;
        }
        if self.avg_commits_affected <= 0.0 {
            return Err(Error::InvalidInput(
                "avg_commits_affected must be positive".to_string(),
            ));
        }
        if self.scanner_timeout_secs == 0 {
            return Err(Error::InvalidInput(
                "scanner timeout must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
