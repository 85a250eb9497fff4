// src/scanner.rs
//! Invocation of the external include scanner (`clang-scan-deps`).
//!
//! This is the only shell I/O the core performs besides cache reads and
//! writes. The scanner is run once per analysis over the whole compile
//! database and its Makefile-style stdout is handed to the ingestor.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{Error, Result};

const SCANNER_NAMES: &[&str] = &[
    "clang-scan-deps",
    "clang-scan-deps-21",
    "clang-scan-deps-20",
    "clang-scan-deps-19",
    "clang-scan-deps-18",
];

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Locates a usable `clang-scan-deps` binary on PATH.
#[must_use]
pub fn find_scanner() -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        for name in SCANNER_NAMES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Runs the scanner over `compile_db` and returns its Makefile-format stdout.
///
/// # Errors
///
/// - `scanner_timeout` when the process outlives `timeout_secs`.
/// - `scanner_failure` when it exits nonzero without usable output, or
///   cannot be spawned at all.
pub fn run(scanner: &Path, build_dir: &Path, compile_db: &Path, timeout_secs: u64) -> Result<String> {
    let jobs = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
    info!(scanner = %scanner.display(), jobs, "running include scanner");

    let mut child = Command::new(scanner)
        .arg(format!("-compilation-database={}", compile_db.display()))
        .arg("-format=make")
        .arg("-j")
        .arg(jobs.to_string())
        .current_dir(build_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::ScannerFailure(format!("cannot spawn {}: {e}", scanner.display())))?;

    // Drain stdout on a helper thread so a chatty scanner cannot deadlock
    // against a full pipe while we poll for exit.
    let mut stdout_pipe = child.stdout.take();
    let reader = std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(pipe) = stdout_pipe.as_mut() {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    });

    let deadline = Instant::now() + Duration::from_secs(timeout_secs);
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::ScannerTimeout(timeout_secs));
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(Error::ScannerFailure(format!("wait failed: {e}"))),
        }
    };

    let stdout = reader.join().unwrap_or_default();
    if !status.success() && stdout.trim().is_empty() {
        let mut stderr = String::new();
        if let Some(pipe) = child.stderr.as_mut() {
            let _ = pipe.read_to_string(&mut stderr);
        }
        stderr.truncate(1000);
        return Err(Error::ScannerFailure(format!(
            "exit code {:?}: {stderr}",
            status.code()
        )));
    }
    debug!(bytes = stdout.len(), "scanner output captured");
    Ok(stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_scanner_failure() {
        let err = run(
            Path::new("/nonexistent/clang-scan-deps"),
            Path::new("/tmp"),
            Path::new("/tmp/compile_commands.json"),
            5,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "scanner_failure");
    }

    #[test]
    #[cfg(unix)]
    fn timeout_kills_the_child() {
        use std::os::unix::fs::PermissionsExt;

        // A stand-in scanner that ignores its arguments and wedges.
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("wedged-scanner");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = run(&script, dir.path(), Path::new("compile_commands.json"), 1).unwrap_err();
        assert_eq!(err.kind(), "scanner_timeout");
    }
}
