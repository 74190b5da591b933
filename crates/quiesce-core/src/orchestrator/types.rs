use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::handles::HandleDescriptor;

/// Outcome of one cleanup callback invocation.
pub type CleanupResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

pub type CleanupFuture = Pin<Box<dyn Future<Output = CleanupResult> + Send>>;

/// A registered cleanup callback. Invoked once per attempt; must settle
/// rather than hang — a never-settling callback is abandoned at the phase
/// deadline, not recovered from.
pub type CleanupFn = Arc<dyn Fn() -> CleanupFuture + Send + Sync>;

/// Class of the resource behind a registration. Drives which phases the
/// entry participates in under the configured per-class strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Database,
    Server,
    Timer,
    Other,
}

#[derive(Clone)]
pub(crate) struct Registration {
    pub name: String,
    pub priority: i32,
    /// Registration order, the stable tie-breaker for equal priorities.
    pub seq: u64,
    pub kind: ResourceKind,
    pub callback: CleanupFn,
    #[allow(dead_code)]
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupFailure {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResourceCounts {
    pub cleaned: usize,
    pub total: usize,
}

/// Handle-leak section of the report, present when handle detection was on.
#[derive(Debug, Clone, Serialize)]
pub struct LeakSummary {
    /// Outstanding handles when the run started.
    pub before: usize,
    /// Outstanding handles when the run finished.
    pub after: usize,
    pub leaks: Vec<HandleDescriptor>,
}

/// Structured result of one orchestrator run. Produced fresh per run and
/// never mutated after being returned.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub resources: ResourceCounts,
    pub errors: Vec<CleanupFailure>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handles: Option<LeakSummary>,
}

impl CleanupReport {
    /// Convenience for harnesses deciding on a non-zero exit.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
            && self
                .handles
                .as_ref()
                .is_none_or(|summary| summary.leaks.is_empty())
    }
}
