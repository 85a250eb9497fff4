// src/compiledb.rs
//! Compilation database loading and compile-command sanitization.
//!
//! The core only cares about the source path, the working directory, and the
//! include search roots of each entry. Everything else in the command line is
//! opaque, but launcher wrappers (ccache, distcc, sccache) and their
//! pseudo-arguments must be stripped before the command reaches the scanner,
//! which chokes on them.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

const LAUNCHER_WRAPPERS: &[&str] = &["ccache", "distcc", "sccache", "icecc"];

/// One translation unit as recorded in `compile_commands.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileDbEntry {
    pub file: PathBuf,
    pub directory: PathBuf,
    pub arguments: Vec<String>,
}

/// Raw entry shape: clang emits either `command` (one string) or
/// `arguments` (pre-tokenized).
#[derive(Deserialize)]
struct RawEntry {
    file: String,
    directory: String,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    arguments: Option<Vec<String>>,
}

/// Loads and sanitizes a compilation database.
///
/// # Errors
///
/// Returns `invalid_input` when the file is unreadable or not valid JSON.
pub fn load(path: &Path) -> Result<Vec<CompileDbEntry>> {
    let text = fs::read_to_string(path).map_err(|e| {
        Error::InvalidInput(format!("cannot read compile DB {}: {e}", path.display()))
    })?;
    parse(&text)
}

/// Parses compile DB text. Entries are returned sorted by source file so
/// downstream digests are stable.
///
/// # Errors
///
/// Returns `invalid_input` on malformed JSON.
pub fn parse(text: &str) -> Result<Vec<CompileDbEntry>> {
    let raw: Vec<RawEntry> = serde_json::from_str(text)
        .map_err(|e| Error::InvalidInput(format!("malformed compile DB: {e}")))?;
    let mut entries: Vec<CompileDbEntry> = raw
        .into_iter()
        .map(|r| {
            let tokens = match (r.arguments, r.command) {
                (Some(args), _) => args,
                (None, Some(cmd)) => tokenize(&cmd),
                (None, None) => Vec::new(),
            };
            CompileDbEntry {
                file: PathBuf::from(r.file),
                directory: PathBuf::from(r.directory),
                arguments: sanitize(&tokens),
            }
        })
        .collect();
    entries.sort_by(|a, b| a.file.cmp(&b.file));
    debug!(entries = entries.len(), "loaded compile database");
    Ok(entries)
}

/// Strips launcher wrappers and `sloppiness=`-style pseudo-arguments.
#[must_use]
pub fn sanitize(tokens: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tokens.len());
    for token in tokens {
        let program = Path::new(token)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(token);
        // Leading wrappers may stack (distcc ccache g++ ...).
        if out.is_empty() && LAUNCHER_WRAPPERS.contains(&program) {
            continue;
        }
        if token.contains("sloppiness=") {
            continue;
        }
        out.push(token.clone());
    }
    out
}

/// Extracts `-I`/`-isystem`/`-iquote` include search roots, resolved against
/// the entry's working directory. Returned sorted and deduplicated.
#[must_use]
pub fn include_roots(entry: &CompileDbEntry) -> Vec<PathBuf> {
    let mut roots: BTreeSet<PathBuf> = BTreeSet::new();
    let mut pending_flag = false;
    for token in &entry.arguments {
        if pending_flag {
            roots.insert(resolve(&entry.directory, token));
            pending_flag = false;
            continue;
        }
        if token == "-I" || token == "-isystem" || token == "-iquote" {
            pending_flag = true;
        } else if let Some(rest) = token.strip_prefix("-I") {
            roots.insert(resolve(&entry.directory, rest));
        } else if let Some(rest) = token.strip_prefix("-isystem") {
            if !rest.is_empty() {
                roots.insert(resolve(&entry.directory, rest));
            }
        }
    }
    roots.into_iter().collect()
}

fn resolve(dir: &Path, raw: &str) -> PathBuf {
    let p = Path::new(raw);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        crate::paths::normalize_components(&dir.join(p))
    }
}

/// Shell-style splitting, sufficient for compile commands: whitespace
/// separates tokens, single and double quotes group.
fn tokenize(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for ch in command.chars() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => quote = Some(ch),
            (None, c) if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            (None, c) => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}
