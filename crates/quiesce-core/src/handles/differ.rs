//! Baseline/current snapshot diffing.
//!
//! Absolute handle counts misclassify the handles the test framework itself
//! legitimately owns. The differ instead records a baseline at run start and
//! reports only handles created strictly after it.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::handles::sources::HandleSource;
use crate::handles::types::{HandleDescriptor, HandleSnapshot};

pub struct SnapshotDiffer {
    source: Arc<dyn HandleSource>,
    baseline: Option<HandleSnapshot>,
}

impl SnapshotDiffer {
    pub fn new(source: Arc<dyn HandleSource>) -> Self {
        Self {
            source,
            baseline: None,
        }
    }

    /// Record the current handle set as the reference point, overwriting
    /// any previous baseline.
    pub fn capture_baseline(&mut self) {
        let snapshot = self.current_snapshot();
        debug!(
            event = "handles.differ.baseline_captured",
            handle_count = snapshot.len(),
        );
        self.baseline = Some(snapshot);
    }

    /// A fresh snapshot; the stored baseline is untouched.
    pub fn current_snapshot(&self) -> HandleSnapshot {
        HandleSnapshot {
            taken_at: Utc::now(),
            handles: self.source.enumerate(),
        }
    }

    /// Handles present now that were absent at baseline. Without a captured
    /// baseline every current handle is a candidate.
    pub fn detect_leaks(&self) -> Vec<HandleDescriptor> {
        let current = self.current_snapshot();
        match &self.baseline {
            Some(baseline) => current.diff(baseline),
            None => current.handles,
        }
    }

    /// Early-warning signal: is any detected leak of a kind that keeps the
    /// test process alive (timers, sockets/listeners)?
    pub fn would_hang_test_runner(&self) -> bool {
        self.detect_leaks()
            .iter()
            .any(|handle| handle.kind.keeps_process_alive())
    }
}
