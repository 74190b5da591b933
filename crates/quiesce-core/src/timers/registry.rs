//! Tracked timer scheduling.
//!
//! Every timer created through a [`TimerRegistry`] is recorded in a shared
//! handle table until it fires (one-shot) or is cancelled. The table is the
//! single source of truth for [`stats`](TimerRegistry::stats) and for the
//! handle snapshots the differ takes before and after a cleanup run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use futures::future::{AbortHandle, Abortable};
use tracing::debug;

use crate::timers::types::{TimerId, TimerInfo, TimerKind, TimerStats};

struct Tracked {
    kind: TimerKind,
    delay_ms: u64,
    created_at: chrono::DateTime<chrono::Utc>,
    abort: AbortHandle,
    creation_stack: Option<String>,
}

struct Inner {
    table: Mutex<HashMap<TimerId, Tracked>>,
    next_id: AtomicU64,
    diagnostics: bool,
}

impl Inner {
    /// Both mutation sites (scheduling and cancellation) go through this
    /// single lock, so the tracked count never observes a half-applied
    /// update.
    fn table(&self) -> MutexGuard<'_, HashMap<TimerId, Tracked>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable handle over a shared timer table. Clones track the same timers.
#[derive(Clone)]
pub struct TimerRegistry {
    inner: Arc<Inner>,
}

impl Default for TimerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::with_diagnostics(false)
    }

    /// A registry that captures a creation backtrace per timer. Costly;
    /// intended for leak hunting, not for routine runs.
    pub fn with_diagnostics(diagnostics: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                table: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                diagnostics,
            }),
        }
    }

    /// Schedule a callback to run once after `delay`.
    ///
    /// The handle is removed from tracking *before* the callback runs, so a
    /// callback that reads `stats()` sees a count that excludes itself.
    pub fn schedule_one_shot<F>(&self, callback: F, delay: Duration) -> TimerId
    where
        F: FnOnce() + Send + 'static,
    {
        let (abort, registration) = AbortHandle::new_pair();
        let id = self.insert(TimerKind::OneShot, delay, abort);
        let weak = Arc::downgrade(&self.inner);

        tokio::spawn(Abortable::new(
            async move {
                tokio::time::sleep(delay).await;
                if !remove_for_firing(&weak, id) {
                    return;
                }
                callback();
            },
            registration,
        ));

        id
    }

    /// Schedule a callback to run every `delay` until cancelled.
    pub fn schedule_repeating<F>(&self, callback: F, delay: Duration) -> TimerId
    where
        F: FnMut() + Send + 'static,
    {
        let (abort, registration) = AbortHandle::new_pair();
        let id = self.insert(TimerKind::Repeating, delay, abort);
        let mut callback = callback;

        tokio::spawn(Abortable::new(
            async move {
                let mut interval = tokio::time::interval(delay);
                // First tick of a tokio interval completes immediately.
                interval.tick().await;
                loop {
                    interval.tick().await;
                    callback();
                }
            },
            registration,
        ));

        id
    }

    /// Cancel a tracked timer. Silent no-op on unknown ids, already-fired
    /// one-shots, and repeated cancels.
    pub fn cancel(&self, id: TimerId) {
        if let Some(tracked) = self.inner.table().remove(&id) {
            tracked.abort.abort();
            debug!(event = "timers.registry.cancelled", timer_id = id);
        }
    }

    /// Cancel every tracked timer. Used by the orchestrator's forced phase.
    pub fn cancel_all(&self) {
        let drained: Vec<(TimerId, Tracked)> = self.inner.table().drain().collect();
        let count = drained.len();
        for (_, tracked) in drained {
            tracked.abort.abort();
        }
        if count > 0 {
            debug!(event = "timers.registry.cancelled_all", count = count);
        }
    }

    pub fn stats(&self) -> TimerStats {
        let table = self.inner.table();
        let mut stats = TimerStats {
            total: table.len(),
            ..TimerStats::default()
        };
        for tracked in table.values() {
            match tracked.kind {
                TimerKind::OneShot => stats.one_shot += 1,
                TimerKind::Repeating => stats.repeating += 1,
            }
        }
        stats
    }

    /// Live timers ordered by id (creation order).
    pub fn details(&self) -> Vec<TimerInfo> {
        let table = self.inner.table();
        let mut infos: Vec<TimerInfo> = table
            .iter()
            .map(|(id, tracked)| TimerInfo {
                id: *id,
                kind: tracked.kind,
                delay_ms: tracked.delay_ms,
                created_at: tracked.created_at,
                creation_stack: tracked.creation_stack.clone(),
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// The entry lands in the table before the timer future is spawned, so
    /// a zero-delay firing can never observe a missing entry.
    fn insert(&self, kind: TimerKind, delay: Duration, abort: AbortHandle) -> TimerId {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let creation_stack = if self.inner.diagnostics {
            Some(std::backtrace::Backtrace::force_capture().to_string())
        } else {
            None
        };
        self.inner.table().insert(
            id,
            Tracked {
                kind,
                delay_ms: delay.as_millis() as u64,
                created_at: Utc::now(),
                abort,
                creation_stack,
            },
        );
        debug!(
            event = "timers.registry.scheduled",
            timer_id = id,
            kind = ?kind,
            delay_ms = delay.as_millis() as u64,
        );
        id
    }
}

/// Remove a one-shot entry as it fires. Returns false when a concurrent
/// cancel already claimed the entry, in which case the callback must not run.
fn remove_for_firing(weak: &Weak<Inner>, id: TimerId) -> bool {
    let Some(inner) = weak.upgrade() else {
        return false;
    };
    let removed = inner.table().remove(&id).is_some();
    if removed {
        debug!(event = "timers.registry.fired", timer_id = id);
    }
    removed
}
