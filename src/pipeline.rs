// src/pipeline.rs
//! The analysis pipeline: ingest -> graph build -> metrics -> snapshot.
//!
//! Orchestrates the components with the cache wrapping the first two
//! phases. Progress is emitted at phase boundaries; the cancellation flag
//! is checked at each phase entry. The returned snapshot is immutable and
//! safe to share across threads.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::cache::{Cache, CacheKey, CachedGraph};
use crate::compiledb::CompileDbEntry;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::graph::{self, GraphBuild};
use crate::ingest::{self, ScanIngest};
use crate::metrics;
use crate::paths::Normalizer;
use crate::progress::{CancelFlag, Phase, ProgressObserver};
use crate::snapshot::{hash_build_ninja, Snapshot};

/// Everything the pipeline consumes; all external collaborators hand
/// their outputs over through this.
pub struct AnalyzeInputs<'a> {
    pub build_dir: &'a Path,
    pub compile_db: &'a [CompileDbEntry],
    /// Makefile-style scanner stdout.
    pub scanner_output: &'a str,
    /// `build.ninja` contents for the build-dir identity hash.
    pub build_ninja: &'a str,
    /// Pre-resolved direct includes; when absent the pipeline scans header
    /// text on disk and falls back to the co-occurrence proxy.
    pub direct_includes: Option<&'a [(PathBuf, PathBuf)]>,
    /// Explicit project root; autodetected from the build dir when absent.
    pub project_root: Option<&'a Path>,
}

pub struct Analyzer {
    config: Config,
}

impl Analyzer {
    /// # Errors
    ///
    /// Returns `invalid_input` when the configuration fails validation.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the full pipeline and returns the snapshot.
    ///
    /// # Errors
    ///
    /// - `invalid_input` for a missing build directory or cancellation.
    /// - `resource_limit` when the graph exceeds the configured ceiling.
    /// - `analysis_error` on internal invariant violations.
    pub fn analyze(
        &self,
        inputs: &AnalyzeInputs,
        cache: Option<&Cache>,
        progress: Option<ProgressObserver>,
        cancel: Option<&CancelFlag>,
    ) -> Result<Snapshot> {
        let normalizer = Normalizer::new(inputs.build_dir, &self.config, inputs.project_root)?;

        check_cancelled(cancel)?;
        emit(progress, Phase::Ingest, 0);
        let built = self.ingest_and_build(inputs, cache, &normalizer, progress, cancel)?;
        emit(progress, Phase::GraphBuild, 100);

        // Filters narrow the graph only after closures exist, so paths
        // through filtered headers stay visible on the TU side.
        let graph = if self.config.filter.is_empty() {
            built.graph
        } else {
            let keep: BTreeSet<PathBuf> = built
                .graph
                .nodes()
                .filter(|n| self.config.filter.matches(n))
                .cloned()
                .collect();
            built.graph.induced(&keep)
        };

        if let Some(ceiling) = self.config.max_nodes {
            if graph.node_count() > ceiling {
                return Err(Error::ResourceLimit(format!(
                    "{} graph nodes exceed the configured ceiling of {ceiling}; narrow the filters",
                    graph.node_count()
                )));
            }
        }

        check_cancelled(cancel)?;
        emit(progress, Phase::Metrics, 0);
        let analysis = metrics::analyze_graph(&graph)?;
        emit(progress, Phase::Metrics, 100);

        check_cancelled(cancel)?;
        emit(progress, Phase::Snapshot, 0);
        let snapshot = Snapshot::assemble(
            inputs.build_dir.to_path_buf(),
            hash_build_ninja(inputs.build_ninja),
            normalizer.project_root().to_path_buf(),
            self.config.filter.clone(),
            built.precise,
            graph,
            built.ingest.source_to_deps,
            analysis,
            built.ingest.diagnostics,
        );
        emit(progress, Phase::Snapshot, 100);
        info!(
            nodes = snapshot.graph.node_count(),
            edges = snapshot.graph.edge_count(),
            tus = snapshot.tu_count(),
            precise = snapshot.precise,
            "analysis complete"
        );
        Ok(snapshot)
    }

    /// The cache-wrapped portion: scanner output -> inclusion sets -> graph.
    fn ingest_and_build(
        &self,
        inputs: &AnalyzeInputs,
        cache: Option<&Cache>,
        normalizer: &Normalizer,
        progress: Option<ProgressObserver>,
        cancel: Option<&CancelFlag>,
    ) -> Result<BuiltGraph> {
        let compute = || -> Result<CachedGraph> {
            let expected: Vec<PathBuf> =
                inputs.compile_db.iter().map(|e| e.file.clone()).collect();
            let ingested = ingest::ingest(inputs.scanner_output, normalizer, &expected);
            emit(progress, Phase::Ingest, 100);

            check_cancelled(cancel)?;
            emit(progress, Phase::GraphBuild, 0);
            let build = self.build_graph(&ingested, inputs, normalizer);
            Ok(CachedGraph {
                ingest: ingested,
                graph: build.graph,
                precise: build.precise,
            })
        };

        let cached = match cache {
            Some(cache) => {
                let key = CacheKey::digest(inputs.compile_db, inputs.build_ninja, &self.config.filter);
                cache.get_or_compute(key, compute)?
            }
            None => compute()?,
        };

        Ok(BuiltGraph {
            precise: cached.precise,
            graph: cached.graph,
            ingest: cached.ingest,
        })
    }

    fn build_graph(
        &self,
        ingested: &ScanIngest,
        inputs: &AnalyzeInputs,
        normalizer: &Normalizer,
    ) -> GraphBuild {
        if let Some(direct) = inputs.direct_includes {
            return graph::build_from_direct(ingested, direct, self.config.include_system_headers);
        }
        let headers = ingested.project_headers();
        let scanned = graph::scan_header_includes(&headers, normalizer.project_root());
        if scanned.is_empty() {
            debug!("no direct includes resolved; using the co-occurrence proxy");
            graph::build_from_cooccurrence(ingested, self.config.include_system_headers)
        } else {
            graph::build_from_direct(ingested, &scanned, self.config.include_system_headers)
        }
    }
}

struct BuiltGraph {
    ingest: ScanIngest,
    graph: crate::graph::IncludeGraph,
    precise: bool,
}

fn emit(progress: Option<ProgressObserver>, phase: Phase, pct: u8) {
    if let Some(observer) = progress {
        observer(phase, pct);
    }
}

fn check_cancelled(cancel: Option<&CancelFlag>) -> Result<()> {
    if cancel.is_some_and(CancelFlag::is_cancelled) {
        return Err(Error::InvalidInput(
            "analysis cancelled at phase boundary".to_string(),
        ));
    }
    Ok(())
}
