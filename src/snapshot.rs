// src/snapshot.rs
//! The immutable analysis snapshot and its on-disk container.
//!
//! Container layout: 4 magic bytes `DSM1`, a little-endian u32 format
//! version in the clear, then a gzip-compressed JSON body. The version
//! lives outside the compressed payload so an incompatible baseline is
//! rejected before any decoding work. Paths inside the body are stored
//! relative to the project root recorded at save time and re-anchored at
//! load time against the caller's current root.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tracing::info;
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{Error, Result};
use crate::graph::IncludeGraph;
use crate::ingest::Diagnostics;
use crate::metrics::{self, DsmAnalysis};
use crate::paths::FilterSpec;

pub const MAGIC: [u8; 4] = *b"DSM1";
pub const FORMAT_VERSION: u32 = 1;
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A complete, immutable analysis result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tool_version: String,
    /// RFC3339 creation timestamp.
    pub created_at: String,
    pub build_dir: PathBuf,
    /// xxh3 of the `build.ninja` contents at analysis time.
    pub build_ninja_hash: u64,
    pub project_root: PathBuf,
    pub filter: FilterSpec,
    /// True when the graph came from direct-include scanning rather than
    /// the co-occurrence proxy.
    pub precise: bool,
    pub graph: IncludeGraph,
    /// TU -> full inclusion set (system headers included).
    pub source_to_deps: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    pub analysis: DsmAnalysis,
    pub diagnostics: Diagnostics,
    /// header -> TUs including it. Rebuilt after load, never serialized.
    #[serde(skip)]
    header_to_tus: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
}

impl Snapshot {
    /// Assembles a snapshot, deriving the inverse TU index.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        build_dir: PathBuf,
        build_ninja_hash: u64,
        project_root: PathBuf,
        filter: FilterSpec,
        precise: bool,
        graph: IncludeGraph,
        source_to_deps: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
        analysis: DsmAnalysis,
        diagnostics: Diagnostics,
    ) -> Self {
        let mut snapshot = Self {
            tool_version: TOOL_VERSION.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            build_dir,
            build_ninja_hash,
            project_root,
            filter,
            precise,
            graph,
            source_to_deps,
            analysis,
            diagnostics,
            header_to_tus: BTreeMap::new(),
        };
        snapshot.rebuild_inverse_index();
        snapshot
    }

    /// header -> set of TUs whose inclusion set contains it.
    #[must_use]
    pub fn header_to_tus(&self) -> &BTreeMap<PathBuf, BTreeSet<PathBuf>> {
        &self.header_to_tus
    }

    /// Number of translation units in this snapshot.
    #[must_use]
    pub fn tu_count(&self) -> usize {
        self.source_to_deps.len()
    }

    fn rebuild_inverse_index(&mut self) {
        let mut map: BTreeMap<PathBuf, BTreeSet<PathBuf>> = BTreeMap::new();
        for (tu, deps) in &self.source_to_deps {
            for dep in deps {
                if crate::paths::is_header(dep) {
                    map.entry(dep.clone()).or_default().insert(tu.clone());
                }
            }
        }
        self.header_to_tus = map;
    }

    /// Re-applies `filter` to the graph and recomputes the analysis.
    /// Used before diffing when two snapshots carry different filters.
    ///
    /// # Errors
    ///
    /// Propagates `analysis_error` from the metric engine.
    pub fn refilter(&self, filter: &FilterSpec) -> Result<Self> {
        let keep: BTreeSet<PathBuf> = self
            .graph
            .nodes()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect();
        let graph = self.graph.induced(&keep);
        let analysis = metrics::analyze_graph(&graph)?;
        let mut snapshot = self.clone();
        snapshot.filter = filter.clone();
        snapshot.graph = graph;
        snapshot.analysis = analysis;
        snapshot.rebuild_inverse_index();
        Ok(snapshot)
    }

    /// Writes the versioned compressed container.
    ///
    /// # Errors
    ///
    /// Returns `invalid_input` on I/O or serialization failure.
    pub fn save(&self, path: &Path) -> Result<()> {
        let body = serde_json::to_vec(self)
            .map_err(|e| Error::InvalidInput(format!("snapshot serialization failed: {e}")))?;
        let mut payload = Vec::with_capacity(body.len() / 4 + 8);
        payload.extend_from_slice(&MAGIC);
        payload.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        let mut encoder = GzEncoder::new(payload, Compression::default());
        encoder
            .write_all(&body)
            .and_then(|()| encoder.finish())
            .map_err(|e| Error::InvalidInput(format!("snapshot compression failed: {e}")))
            .and_then(|bytes| {
                fs::write(path, bytes).map_err(|e| {
                    Error::InvalidInput(format!("cannot write {}: {e}", path.display()))
                })
            })?;
        info!(path = %path.display(), "snapshot saved");
        Ok(())
    }

    /// Loads and validates a container, re-anchoring paths at
    /// `current_root`.
    ///
    /// # Errors
    ///
    /// - `invalid_input` when the file is unreadable or corrupt.
    /// - `baseline_incompatible` on a format version mismatch.
    pub fn load(path: &Path, current_root: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .map_err(|e| Error::InvalidInput(format!("cannot read {}: {e}", path.display())))?;
        if bytes.len() < 8 || bytes[..4] != MAGIC {
            return Err(Error::InvalidInput(format!(
                "{} is not a snapshot file",
                path.display()
            )));
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != FORMAT_VERSION {
            return Err(Error::BaselineIncompatible {
                found: version,
                expected: FORMAT_VERSION,
            });
        }
        let mut body = Vec::new();
        GzDecoder::new(&bytes[8..])
            .read_to_end(&mut body)
            .map_err(|e| Error::InvalidInput(format!("corrupt snapshot: {e}")))?;
        let mut snapshot: Self = serde_json::from_slice(&body)
            .map_err(|e| Error::InvalidInput(format!("corrupt snapshot body: {e}")))?;
        snapshot.project_root = current_root.to_path_buf();
        snapshot.rebuild_inverse_index();
        Ok(snapshot)
    }
}

/// Hashes `build.ninja` contents for the build-dir identity, with line
/// endings normalized so checkouts on different platforms agree.
#[must_use]
pub fn hash_build_ninja(contents: &str) -> u64 {
    let canonical = contents.replace("\r\n", "\n");
    xxh3_64(canonical.as_bytes())
}
