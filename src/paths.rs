// src/paths.rs
//! Path canonicalization, classification, and glob filtering.
//!
//! Paths are analyzed textually: a path that does not exist on disk is still
//! classified and filtered. Classification is deterministic from the prefix
//! sets and extension tables, so two runs over the same inputs agree.

use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};

pub const HEADER_EXTENSIONS: &[&str] = &["h", "hpp", "hxx", "hh", "inl", "ipp"];
pub const SOURCE_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx", "m", "mm"];

const ROOT_MARKERS: &[&str] = &[".git", "README.md", "README.rst", "README"];

/// Classification tag for a canonical path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathClass {
    Project,
    ThirdParty,
    System,
    Generated,
}

#[must_use]
pub fn is_header(path: &Path) -> bool {
    has_extension(path, HEADER_EXTENSIONS)
}

#[must_use]
pub fn is_source(path: &Path) -> bool {
    has_extension(path, SOURCE_EXTENSIONS)
}

fn has_extension(path: &Path, table: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| table.iter().any(|t| t.eq_ignore_ascii_case(ext)))
}

/// Declarative include/exclude filter. Include patterns are a whitelist
/// (empty = everything passes); excludes are applied after.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl FilterSpec {
    #[must_use]
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    /// # Errors
    ///
    /// Returns `invalid_input` when any pattern fails to compile.
    pub fn validate(&self) -> Result<()> {
        for raw in self.include.iter().chain(&self.exclude) {
            Pattern::new(raw)
                .map_err(|e| Error::InvalidInput(format!("bad filter pattern '{raw}': {e}")))?;
        }
        Ok(())
    }

    /// True iff `path` matches at least one include (or none are given)
    /// and no exclude.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        // `*` and `?` stop at separators; `**` crosses them.
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        let hit = |raw: &String| {
            Pattern::new(raw).is_ok_and(|p| p.matches_path_with(path, options))
        };
        let included = self.include.is_empty() || self.include.iter().any(hit);
        included && !self.exclude.iter().any(hit)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

/// Canonicalizes and classifies raw scanner paths.
pub struct Normalizer {
    project_root: PathBuf,
    build_dir: PathBuf,
    system_prefixes: Vec<String>,
    third_party: Vec<Pattern>,
}

impl Normalizer {
    /// Builds a normalizer rooted at the detected (or supplied) project root.
    ///
    /// # Errors
    ///
    /// Returns `invalid_input` if the build directory does not exist or a
    /// third-party glob is malformed.
    pub fn new(build_dir: &Path, config: &Config, explicit_root: Option<&Path>) -> Result<Self> {
        if !build_dir.is_dir() {
            return Err(Error::InvalidInput(format!(
                "build directory not found: {}",
                build_dir.display()
            )));
        }
        let build_dir = build_dir
            .canonicalize()
            .map_err(|_| Error::PathError(build_dir.to_path_buf()))?;
        let project_root = match explicit_root {
            Some(root) => root
                .canonicalize()
                .map_err(|_| Error::PathError(root.to_path_buf()))?,
            None => detect_project_root(&build_dir),
        };
        let third_party = config
            .third_party_globs
            .iter()
            .map(|g| {
                Pattern::new(g)
                    .map_err(|e| Error::InvalidInput(format!("bad third-party glob '{g}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            project_root,
            build_dir,
            system_prefixes: config.system_prefixes.clone(),
            third_party,
        })
    }

    #[must_use]
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    #[must_use]
    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    /// Canonicalizes `raw` and classifies it.
    ///
    /// Relative paths are resolved against the build directory (the working
    /// directory of every compile command). Paths under the project root are
    /// reduced to project-relative form; everything else stays absolute.
    ///
    /// # Errors
    ///
    /// Returns `path_error` for paths that are not valid UTF-8. Callers drop
    /// the path and bump the diagnostic counter.
    pub fn classify(&self, raw: &str) -> Result<(PathBuf, PathClass)> {
        if raw.is_empty() {
            return Err(Error::PathError(PathBuf::new()));
        }
        let joined = if Path::new(raw).is_absolute() {
            PathBuf::from(raw)
        } else {
            self.build_dir.join(raw)
        };
        let absolute = normalize_components(&joined);
        absolute
            .to_str()
            .ok_or_else(|| Error::PathError(absolute.clone()))?;

        let class = self.class_of(&absolute);
        let canonical = match absolute.strip_prefix(&self.project_root) {
            Ok(rel) if class != PathClass::System => rel.to_path_buf(),
            _ => absolute,
        };
        Ok((canonical, class))
    }

    fn class_of(&self, absolute: &Path) -> PathClass {
        let text = absolute.to_string_lossy();
        if self.system_prefixes.iter().any(|p| text.starts_with(p.as_str())) {
            return PathClass::System;
        }
        if self.third_party.iter().any(|p| p.matches(&text)) {
            return PathClass::ThirdParty;
        }
        if absolute.starts_with(&self.build_dir) {
            return PathClass::Generated;
        }
        PathClass::Project
    }
}

/// Lexically resolves `.` and `..` without touching the filesystem.
#[must_use]
pub fn normalize_components(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Nearest ancestor of the build directory carrying a root marker, falling
/// back to the build directory's parent.
fn detect_project_root(build_dir: &Path) -> PathBuf {
    let mut dir = build_dir;
    while let Some(parent) = dir.parent() {
        if ROOT_MARKERS.iter().any(|m| parent.join(m).exists()) {
            return parent.to_path_buf();
        }
        dir = parent;
    }
    build_dir.parent().unwrap_or(build_dir).to_path_buf()
}
