// src/progress.rs
//! Progress observation and cooperative cancellation.
//!
//! Observers receive an integer-tagged phase and a 0-100 percent value,
//! emitted only at phase boundaries, so implementing one is trivial.
//! Cancellation is observed at phase entry; a running phase always
//! completes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Ingest = 1,
    GraphBuild = 2,
    Metrics = 3,
    Snapshot = 4,
}

impl Phase {
    #[must_use]
    pub fn id(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::GraphBuild => "graph_build",
            Self::Metrics => "metrics",
            Self::Snapshot => "snapshot",
        }
    }
}

/// Callback shape for progress reporting.
pub type ProgressObserver<'a> = &'a (dyn Fn(Phase, u8) + Sync);

/// Shared cancellation flag; clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_have_stable_ids() {
        assert_eq!(Phase::Ingest.id(), 1);
        assert_eq!(Phase::Snapshot.id(), 4);
        assert_eq!(Phase::Metrics.name(), "metrics");
    }

    #[test]
    fn cancel_flag_is_shared_across_clones() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
