// src/error.rs
//! The closed error taxonomy for the analysis core.
//!
//! Every fallible core operation fails with exactly one kind plus a
//! human-readable detail string. Per-rule and per-path failures are *not*
//! errors at the operation level: they are tallied in the snapshot's
//! diagnostics and the analysis continues.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Build directory missing, compile DB unreadable, filter pattern malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The external include scanner exceeded its timeout.
    #[error("scanner timed out after {0} seconds")]
    ScannerTimeout(u64),

    /// The scanner returned nonzero and produced no usable output.
    #[error("scanner failed: {0}")]
    ScannerFailure(String),

    /// A single scanner rule failed to parse (surfaced only when a caller
    /// asks for strict ingestion; normally counted and skipped).
    #[error("parse error: {0}")]
    ParseError(String),

    /// A path could not be canonicalized or is not valid UTF-8.
    #[error("path error: {}", .0.display())]
    PathError(PathBuf),

    /// Snapshot format_version does not match the current format.
    #[error("baseline incompatible: found format v{found}, expected v{expected}")]
    BaselineIncompatible { found: u32, expected: u32 },

    /// Internal invariant violation. Must not occur in production.
    #[error("analysis error: {0}")]
    AnalysisError(String),

    /// Cache I/O failure. Callers bypass the cache and recompute.
    #[error("cache error: {0}")]
    CacheError(String),

    /// The graph exceeds a configured hard ceiling.
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(String),
}

impl Error {
    /// Stable machine-readable tag for the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::ScannerTimeout(_) => "scanner_timeout",
            Self::ScannerFailure(_) => "scanner_failure",
            Self::ParseError(_) => "parse_error",
            Self::PathError(_) => "path_error",
            Self::BaselineIncompatible { .. } => "baseline_incompatible",
            Self::AnalysisError(_) => "analysis_error",
            Self::CacheError(_) => "cache_error",
            Self::ResourceLimit(_) => "resource_limit",
        }
    }

    /// True for kinds that are recoverable by skipping the offending item.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::ParseError(_) | Self::PathError(_) | Self::CacheError(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(Error::InvalidInput(String::new()).kind(), "invalid_input");
        assert_eq!(Error::ScannerTimeout(300).kind(), "scanner_timeout");
        assert_eq!(
            Error::BaselineIncompatible { found: 2, expected: 1 }.kind(),
            "baseline_incompatible"
        );
        assert_eq!(Error::CacheError(String::new()).kind(), "cache_error");
    }

    #[test]
    fn local_errors_do_not_abort() {
        assert!(Error::ParseError("bad rule".into()).is_local());
        assert!(Error::PathError(PathBuf::from("x")).is_local());
        assert!(!Error::AnalysisError("cycle in DAG".into()).is_local());
    }
}
