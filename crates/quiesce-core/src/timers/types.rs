use chrono::{DateTime, Utc};
use serde::Serialize;

/// Opaque handle id, monotonic within one registry.
pub type TimerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimerKind {
    OneShot,
    Repeating,
}

/// Diagnostic view of one live timer.
#[derive(Debug, Clone, Serialize)]
pub struct TimerInfo {
    pub id: TimerId,
    pub kind: TimerKind,
    pub delay_ms: u64,
    pub created_at: DateTime<Utc>,
    /// Creation call stack, captured only when the registry was built
    /// with diagnostics enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_stack: Option<String>,
}

/// Counts of currently tracked timers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimerStats {
    pub total: usize,
    pub one_shot: usize,
    pub repeating: usize,
}
