// src/cache.rs
//! Content-addressed cache for the expensive ingest -> graph step.
//!
//! The key digests everything that could change the result: the sorted
//! compile DB, the `build.ninja` contents, the filter spec, and the tool
//! version. A key either matches exactly or misses; there is no partial
//! invalidation. Writes go through a temp file and an atomic rename, and
//! an in-process guard makes concurrent threads compute a missing key
//! once. Every cache failure downgrades to a miss.

use std::collections::BTreeSet;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use xxhash_rust::xxh3::Xxh3;

use crate::compiledb::CompileDbEntry;
use crate::error::{Error, Result};
use crate::graph::IncludeGraph;
use crate::ingest::ScanIngest;
use crate::paths::FilterSpec;
use crate::snapshot::TOOL_VERSION;

const CACHE_DIR_NAME: &str = ".buildscope";

/// The cached product of ingest + graph build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedGraph {
    pub ingest: ScanIngest,
    pub graph: IncludeGraph,
    pub precise: bool,
}

/// 128-bit content key, hex-printed as the cache filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheKey(u128);

impl CacheKey {
    /// Digests the scanner inputs that determine the graph.
    #[must_use]
    pub fn digest(
        compile_db: &[CompileDbEntry],
        build_ninja: &str,
        filter: &FilterSpec,
    ) -> Self {
        let mut hasher = Xxh3::new();
        let mut entries: Vec<&CompileDbEntry> = compile_db.iter().collect();
        entries.sort_by(|a, b| a.file.cmp(&b.file));
        for entry in entries {
            hasher.update(entry.file.to_string_lossy().as_bytes());
            hasher.update(b"\0");
            hasher.update(entry.directory.to_string_lossy().as_bytes());
            hasher.update(b"\0");
            for token in &entry.arguments {
                hasher.update(token.as_bytes());
                hasher.update(b"\x1f");
            }
            hasher.update(b"\n");
        }
        hasher.update(build_ninja.as_bytes());
        hasher.update(b"\0");
        for pattern in filter.include.iter().chain(&filter.exclude) {
            hasher.update(pattern.as_bytes());
            hasher.update(b"\x1f");
        }
        hasher.update(TOOL_VERSION.as_bytes());
        Self(hasher.digest128())
    }

    fn filename(self) -> String {
        format!("{:032x}.gz", self.0)
    }
}

/// Per-build-directory cache handle. Caches never share state across
/// build directories.
pub struct Cache {
    dir: PathBuf,
    inflight: Mutex<BTreeSet<u128>>,
    done: Condvar,
}

impl Cache {
    /// Opens (creating if needed) the cache directory under `build_dir`.
    ///
    /// # Errors
    ///
    /// Returns `cache_error` when the directory cannot be created; callers
    /// normally bypass the cache on that.
    pub fn open(build_dir: &Path) -> Result<Self> {
        let dir = build_dir.join(CACHE_DIR_NAME).join("cache");
        fs::create_dir_all(&dir)
            .map_err(|e| Error::CacheError(format!("cannot create {}: {e}", dir.display())))?;
        Ok(Self {
            dir,
            inflight: Mutex::new(BTreeSet::new()),
            done: Condvar::new(),
        })
    }

    /// Returns the cached value for `key`, or computes and stores it.
    /// While one thread computes, later arrivals wait instead of
    /// duplicating the work.
    ///
    /// # Errors
    ///
    /// Propagates only errors from `compute`; cache I/O failures are
    /// swallowed into misses.
    pub fn get_or_compute<F>(&self, key: CacheKey, compute: F) -> Result<CachedGraph>
    where
        F: FnOnce() -> Result<CachedGraph>,
    {
        self.claim(key);
        let outcome = match self.read(key) {
            Some(cached) => {
                debug!(key = %key.filename(), "cache hit");
                Ok(cached)
            }
            None => {
                debug!(key = %key.filename(), "cache miss, computing");
                let computed = compute();
                if let Ok(value) = &computed {
                    if let Err(e) = self.write(key, value) {
                        warn!(error = %e, "cache write failed; continuing without");
                    }
                }
                computed
            }
        };
        self.release(key);
        outcome
    }

    fn claim(&self, key: CacheKey) {
        let mut inflight = self.inflight.lock().expect("cache guard poisoned");
        while inflight.contains(&key.0) {
            inflight = self.done.wait(inflight).expect("cache guard poisoned");
        }
        inflight.insert(key.0);
    }

    fn release(&self, key: CacheKey) {
        let mut inflight = self.inflight.lock().expect("cache guard poisoned");
        inflight.remove(&key.0);
        drop(inflight);
        self.done.notify_all();
    }

    /// A corrupt or missing entry is just a miss.
    fn read(&self, key: CacheKey) -> Option<CachedGraph> {
        let path = self.dir.join(key.filename());
        let bytes = fs::read(path).ok()?;
        let mut body = Vec::new();
        GzDecoder::new(bytes.as_slice()).read_to_end(&mut body).ok()?;
        serde_json::from_slice(&body).ok()
    }

    fn write(&self, key: CacheKey, value: &CachedGraph) -> Result<()> {
        let body = serde_json::to_vec(value)
            .map_err(|e| Error::CacheError(format!("serialize failed: {e}")))?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&body)
            .map_err(|e| Error::CacheError(format!("compress failed: {e}")))?;
        let compressed = encoder
            .finish()
            .map_err(|e| Error::CacheError(format!("compress failed: {e}")))?;

        let target = self.dir.join(key.filename());
        let temp = self.dir.join(format!("{}.tmp-{}", key.filename(), std::process::id()));
        fs::write(&temp, compressed)
            .map_err(|e| Error::CacheError(format!("cannot write {}: {e}", temp.display())))?;
        fs::rename(&temp, &target)
            .map_err(|e| Error::CacheError(format!("cannot rename into place: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn entry(file: &str) -> CompileDbEntry {
        CompileDbEntry {
            file: PathBuf::from(file),
            directory: PathBuf::from("/b"),
            arguments: vec!["g++".to_string(), "-c".to_string(), file.to_string()],
        }
    }

    fn sample_value() -> CachedGraph {
        let mut graph = IncludeGraph::new();
        graph.add_edge(PathBuf::from("a.h"), PathBuf::from("b.h"));
        CachedGraph {
            ingest: ScanIngest::default(),
            graph,
            precise: true,
        }
    }

    #[test]
    fn key_ignores_compile_db_order() {
        let filter = FilterSpec::default();
        let forward = CacheKey::digest(&[entry("a.cpp"), entry("b.cpp")], "ninja", &filter);
        let backward = CacheKey::digest(&[entry("b.cpp"), entry("a.cpp")], "ninja", &filter);
        assert_eq!(forward, backward);
    }

    #[test]
    fn key_changes_with_any_input() {
        let filter = FilterSpec::default();
        let base = CacheKey::digest(&[entry("a.cpp")], "ninja", &filter);
        assert_ne!(base, CacheKey::digest(&[entry("a.cpp")], "ninja2", &filter));
        assert_ne!(base, CacheKey::digest(&[entry("z.cpp")], "ninja", &filter));
        let filtered = FilterSpec::new(vec!["src/**".to_string()], Vec::new());
        assert_ne!(base, CacheKey::digest(&[entry("a.cpp")], "ninja", &filtered));
    }

    #[test]
    fn miss_computes_then_hit_reuses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(dir.path()).unwrap();
        let key = CacheKey::digest(&[entry("a.cpp")], "ninja", &FilterSpec::default());

        let mut computed = 0;
        let value = cache
            .get_or_compute(key, || {
                computed += 1;
                Ok(sample_value())
            })
            .unwrap();
        assert_eq!(computed, 1);
        assert_eq!(value, sample_value());

        let again = cache
            .get_or_compute(key, || {
                computed += 1;
                Ok(sample_value())
            })
            .unwrap();
        assert_eq!(computed, 1, "second call must hit the cache");
        assert_eq!(again, sample_value());
    }

    #[test]
    fn corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(dir.path()).unwrap();
        let key = CacheKey::digest(&[entry("a.cpp")], "ninja", &FilterSpec::default());
        fs::write(cache.dir.join(key.filename()), b"garbage").unwrap();

        let mut computed = 0;
        cache
            .get_or_compute(key, || {
                computed += 1;
                Ok(sample_value())
            })
            .unwrap();
        assert_eq!(computed, 1, "corruption downgrades to recompute");
        // The overwrite repaired the entry.
        assert!(cache.read(key).is_some());
    }

    #[test]
    fn caches_are_per_build_dir() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let cache_a = Cache::open(dir_a.path()).unwrap();
        let cache_b = Cache::open(dir_b.path()).unwrap();
        let key = CacheKey::digest(&[entry("a.cpp")], "ninja", &FilterSpec::default());

        cache_a.get_or_compute(key, || Ok(sample_value())).unwrap();
        assert!(cache_a.read(key).is_some());
        assert!(cache_b.read(key).is_none(), "no shared state");
    }
}
