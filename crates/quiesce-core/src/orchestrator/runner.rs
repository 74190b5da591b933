//! Two-phase cleanup runs.
//!
//! One orchestrator owns a prioritized table of named cleanup callbacks and
//! drives them through a graceful phase (shared time budget, failures
//! recorded but non-fatal), bounded retries, and a forced phase. The run
//! always produces a [`CleanupReport`]; the only caller-visible failure is
//! a concurrent second run.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use quiesce_config::{CleanupConfig, TeardownStrategy};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::handles::SnapshotDiffer;
use crate::orchestrator::errors::OrchestratorError;
use crate::orchestrator::types::{
    CleanupFailure, CleanupFn, CleanupFuture, CleanupReport, CleanupResult, LeakSummary,
    Registration, ResourceCounts, ResourceKind,
};
use crate::timers::TimerRegistry;

struct RegistrationTable {
    entries: HashMap<String, Registration>,
    next_seq: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum EntryState {
    Pending,
    Cleaned,
    Failed(String),
    /// Attempt timed out mid-flight; the callback may still be running.
    Abandoned,
    /// Never attempted: the phase budget was exhausted first.
    Deferred,
}

struct RunEntry {
    reg: Registration,
    state: EntryState,
}

pub struct Orchestrator {
    config: CleanupConfig,
    table: StdMutex<RegistrationTable>,
    /// Held for the duration of one run. `try_lock` failure is the
    /// re-entrancy signal.
    run_guard: tokio::sync::Mutex<()>,
    timer_registry: Option<TimerRegistry>,
    differ: Option<StdMutex<SnapshotDiffer>>,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: CleanupConfig) -> Self {
        Self {
            config,
            table: StdMutex::new(RegistrationTable {
                entries: HashMap::new(),
                next_seq: 0,
            }),
            run_guard: tokio::sync::Mutex::new(()),
            timer_registry: None,
            differ: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Attach the timer registry whose remaining timers the forced phase
    /// cancels en masse.
    pub fn with_timer_registry(mut self, registry: TimerRegistry) -> Self {
        self.timer_registry = Some(registry);
        self
    }

    /// Attach a differ for the before/after leak section of the report.
    /// Only consulted when `detect_handles` is configured on.
    pub fn with_differ(mut self, differ: SnapshotDiffer) -> Self {
        self.differ = Some(StdMutex::new(differ));
        self
    }

    /// Token cancelled once the graceful phase ends, whether or not any
    /// resource is left for the forced phase. Collaborators holding
    /// long-running work can observe it to stop voluntarily.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Add or replace a named cleanup entry with kind
    /// [`ResourceKind::Other`].
    pub fn register<F, Fut>(&self, name: &str, priority: i32, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CleanupResult> + Send + 'static,
    {
        self.register_with_kind(name, priority, ResourceKind::Other, callback);
    }

    /// Add or replace a named cleanup entry.
    ///
    /// Re-registering under an existing name replaces the prior entry and
    /// takes a fresh registration-order slot.
    pub fn register_with_kind<F, Fut>(
        &self,
        name: &str,
        priority: i32,
        kind: ResourceKind,
        callback: F,
    ) where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CleanupResult> + Send + 'static,
    {
        let callback: CleanupFn = Arc::new(move || Box::pin(callback()) as CleanupFuture);
        let mut table = self.table();
        let seq = table.next_seq;
        table.next_seq += 1;
        let replaced = table
            .entries
            .insert(
                name.to_string(),
                Registration {
                    name: name.to_string(),
                    priority,
                    seq,
                    kind,
                    callback,
                    registered_at: Utc::now(),
                },
            )
            .is_some();
        debug!(
            event = "orchestrator.registered",
            name = name,
            priority = priority,
            kind = ?kind,
            replaced = replaced,
        );
    }

    /// Remove an entry; no-op if absent.
    pub fn unregister(&self, name: &str) {
        if self.table().entries.remove(name).is_some() {
            debug!(event = "orchestrator.unregistered", name = name);
        }
    }

    pub fn registered_count(&self) -> usize {
        self.table().entries.len()
    }

    /// Run the full two-phase shutdown and return the report.
    ///
    /// Fails fast with [`OrchestratorError::CleanupInFlight`] if another
    /// run is in progress on this orchestrator.
    pub async fn cleanup(&self) -> Result<CleanupReport, OrchestratorError> {
        let _guard = self
            .run_guard
            .try_lock()
            .map_err(|_| OrchestratorError::CleanupInFlight)?;
        Ok(self.run(false).await)
    }

    /// Skip straight to the forced phase; for aborts where a grace period
    /// is known to be pointless. Strategy knobs are ignored — everything
    /// gets forced.
    pub async fn force_clean_all(&self) -> Result<CleanupReport, OrchestratorError> {
        let _guard = self
            .run_guard
            .try_lock()
            .map_err(|_| OrchestratorError::CleanupInFlight)?;
        Ok(self.run(true).await)
    }

    async fn run(&self, forced_only: bool) -> CleanupReport {
        let started_at = Utc::now();
        let mut entries = self.sorted_entries();
        info!(
            event = "orchestrator.cleanup_started",
            resources = entries.len(),
            forced_only = forced_only,
        );

        let before = if self.config.detect_handles {
            self.snapshot()
        } else {
            None
        };

        let mut errors: Vec<CleanupFailure> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        if !forced_only {
            self.graceful_phase(&mut entries, &mut warnings).await;
            // One error entry per resource still failed after retries;
            // individual attempts are not double-counted.
            for entry in &entries {
                if let EntryState::Failed(reason) = &entry.state {
                    errors.push(CleanupFailure {
                        name: entry.reg.name.clone(),
                        reason: reason.clone(),
                    });
                }
            }
        }

        self.shutdown.cancel();
        self.forced_phase(&mut entries, &mut warnings, forced_only)
            .await;

        let handles = before.map(|before| {
            let after = self
                .snapshot()
                .unwrap_or_else(|| before.clone());
            let leaks = after.diff(&before);
            if !leaks.is_empty() {
                warn!(
                    event = "orchestrator.leaks_detected",
                    count = leaks.len(),
                );
            }
            LeakSummary {
                before: before.len(),
                after: after.len(),
                leaks,
            }
        });

        let cleaned = entries
            .iter()
            .filter(|e| e.state == EntryState::Cleaned)
            .count();
        let finished_at = Utc::now();
        let report = CleanupReport {
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds(),
            resources: ResourceCounts {
                cleaned,
                total: entries.len(),
            },
            errors,
            warnings,
            handles,
        };
        info!(
            event = "orchestrator.cleanup_completed",
            cleaned = report.resources.cleaned,
            total = report.resources.total,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
        );
        report
    }

    /// Graceful attempts plus bounded retries, all under one shared
    /// `graceful_timeout_ms` budget. A slow early callback reduces the
    /// time available to the rest.
    async fn graceful_phase(&self, entries: &mut [RunEntry], warnings: &mut Vec<String>) {
        let deadline =
            Instant::now() + Duration::from_millis(self.config.graceful_timeout_ms);

        for entry in entries.iter_mut() {
            if !self.participates_graceful(entry.reg.kind) {
                continue;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warnings.push(format!(
                    "{}: graceful budget exhausted before attempt",
                    entry.reg.name
                ));
                entry.state = EntryState::Deferred;
                continue;
            }
            self.attempt_entry(entry, remaining, warnings, "graceful").await;
        }

        for retry in 1..=self.config.max_retries {
            if !entries
                .iter()
                .any(|e| matches!(e.state, EntryState::Failed(_)))
            {
                break;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            debug!(event = "orchestrator.retrying", attempt = retry);
            tokio::time::sleep(
                Duration::from_millis(self.config.retry_delay_ms).min(remaining),
            )
            .await;
            for entry in entries.iter_mut() {
                if !matches!(entry.state, EntryState::Failed(_)) {
                    continue;
                }
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                self.attempt_entry(entry, remaining, warnings, "retry").await;
            }
        }
    }

    /// Best-effort teardown for anything not confirmed cleaned. Failures
    /// here are warnings, not errors — the process is exiting regardless.
    async fn forced_phase(
        &self,
        entries: &mut [RunEntry],
        warnings: &mut Vec<String>,
        forced_only: bool,
    ) {
        let outstanding = entries
            .iter()
            .filter(|e| e.state != EntryState::Cleaned)
            .count();
        if outstanding == 0 {
            return;
        }
        let deadline = Instant::now() + Duration::from_millis(self.config.force_timeout_ms);
        debug!(event = "orchestrator.forced_phase_started", outstanding = outstanding);

        // Timers are swept registry-wide rather than through their callback.
        if let Some(registry) = &self.timer_registry {
            registry.cancel_all();
            for entry in entries.iter_mut() {
                if entry.reg.kind == ResourceKind::Timer
                    && entry.state != EntryState::Cleaned
                {
                    entry.state = EntryState::Cleaned;
                }
            }
        }

        // Entries whose graceful attempt timed out are known slow; they go
        // last so they cannot starve the rest of the force budget.
        let mut order: Vec<usize> = (0..entries.len())
            .filter(|&i| entries[i].state != EntryState::Abandoned)
            .collect();
        order.extend((0..entries.len()).filter(|&i| entries[i].state == EntryState::Abandoned));

        for index in order {
            let entry = &mut entries[index];
            if entry.state == EntryState::Cleaned {
                continue;
            }
            if !forced_only && !self.participates_forced(entry.reg.kind) {
                warnings.push(format!(
                    "{}: left outstanding (graceful-only strategy)",
                    entry.reg.name
                ));
                continue;
            }
            if !forced_only {
                warnings.push(format!("{}: fell back to forced phase", entry.reg.name));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warnings.push(format!(
                    "{}: force budget exhausted before attempt",
                    entry.reg.name
                ));
                continue;
            }
            match attempt(&entry.reg.callback, remaining).await {
                Attempt::Cleaned => {
                    debug!(event = "orchestrator.forced_cleaned", name = %entry.reg.name);
                    entry.state = EntryState::Cleaned;
                }
                Attempt::Failed(reason) => {
                    warnings.push(format!(
                        "{}: forced teardown failed: {}",
                        entry.reg.name, reason
                    ));
                }
                Attempt::TimedOut => {
                    warnings.push(format!(
                        "{}: abandoned after force timeout",
                        entry.reg.name
                    ));
                }
            }
        }
    }

    async fn attempt_entry(
        &self,
        entry: &mut RunEntry,
        budget: Duration,
        warnings: &mut Vec<String>,
        phase: &str,
    ) {
        match attempt(&entry.reg.callback, budget).await {
            Attempt::Cleaned => {
                debug!(event = "orchestrator.cleaned", name = %entry.reg.name, phase = phase);
                entry.state = EntryState::Cleaned;
            }
            Attempt::Failed(reason) => {
                warn!(
                    event = "orchestrator.callback_failed",
                    name = %entry.reg.name,
                    phase = phase,
                    reason = %reason,
                );
                entry.state = EntryState::Failed(reason);
            }
            Attempt::TimedOut => {
                warn!(
                    event = "orchestrator.callback_abandoned",
                    name = %entry.reg.name,
                    phase = phase,
                );
                warnings.push(format!(
                    "{}: abandoned after graceful timeout",
                    entry.reg.name
                ));
                entry.state = EntryState::Abandoned;
            }
        }
    }

    fn participates_graceful(&self, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Database => {
                self.config.database_strategy != TeardownStrategy::ForcedOnly
            }
            ResourceKind::Server => self.config.server_strategy != TeardownStrategy::ForcedOnly,
            ResourceKind::Timer | ResourceKind::Other => true,
        }
    }

    fn participates_forced(&self, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Database => {
                self.config.database_strategy != TeardownStrategy::GracefulOnly
            }
            ResourceKind::Server => {
                self.config.server_strategy != TeardownStrategy::GracefulOnly
            }
            ResourceKind::Timer | ResourceKind::Other => true,
        }
    }

    fn sorted_entries(&self) -> Vec<RunEntry> {
        let mut entries: Vec<RunEntry> = self
            .table()
            .entries
            .values()
            .cloned()
            .map(|reg| RunEntry {
                reg,
                state: EntryState::Pending,
            })
            .collect();
        entries.sort_by_key(|e| (e.reg.priority, e.reg.seq));
        entries
    }

    fn snapshot(&self) -> Option<crate::handles::HandleSnapshot> {
        self.differ.as_ref().map(|differ| {
            differ
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .current_snapshot()
        })
    }

    fn table(&self) -> MutexGuard<'_, RegistrationTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Attempt {
    Cleaned,
    Failed(String),
    TimedOut,
}

/// Run one callback attempt on its own task, bounded by `budget`.
///
/// The callback is invoked inside the spawned task, so a panic anywhere in
/// it surfaces as a `JoinError` instead of unwinding through the run. On
/// timeout the join handle is dropped and the task keeps running detached
/// — the callback is abandoned, not cancelled.
async fn attempt(callback: &CleanupFn, budget: Duration) -> Attempt {
    let callback = Arc::clone(callback);
    let handle = tokio::spawn(async move { callback().await });
    match tokio::time::timeout(budget, handle).await {
        Ok(Ok(Ok(()))) => Attempt::Cleaned,
        Ok(Ok(Err(error))) => Attempt::Failed(error.to_string()),
        Ok(Err(join_error)) => Attempt::Failed(format!("callback panicked: {join_error}")),
        Err(_) => Attempt::TimedOut,
    }
}
