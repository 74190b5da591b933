//! Process-level setup/teardown pair for a test-execution harness.
//!
//! One [`TestHarness`] value owns the whole lifecycle of a single test run:
//! `setup()` at suite start installs the timer interception scope and
//! captures the handle baseline; `teardown()` at suite end drives the
//! two-phase cleanup and hands back the report. The harness is the only
//! caller of [`install_global`]/[`uninstall_global`].

use std::sync::{Mutex as StdMutex, PoisonError};

use quiesce_config::CleanupConfig;
use tracing::info;

use crate::handles::{
    CompositeSource, HandleDescriptor, SnapshotDiffer, platform_source,
};
use crate::logging;
use crate::orchestrator::{CleanupReport, Orchestrator, OrchestratorError, ResourceKind};
use crate::timers::{TimerRegistry, install_global, uninstall_global};

/// Priority of the registry's own cleanup entry. High so collaborator
/// entries (servers, databases) run first.
pub const TIMER_CLEANUP_PRIORITY: i32 = 100;

pub struct TestHarness {
    registry: TimerRegistry,
    orchestrator: Orchestrator,
    differ: StdMutex<SnapshotDiffer>,
}

impl TestHarness {
    pub fn new(config: CleanupConfig) -> Self {
        logging::init(&config.log_level);

        let registry = TimerRegistry::new();
        let source = std::sync::Arc::new(CompositeSource::new(vec![
            Box::new(registry.clone()),
            platform_source(),
        ]));

        let orchestrator = Orchestrator::new(config)
            .with_timer_registry(registry.clone())
            .with_differ(SnapshotDiffer::new(source.clone()));

        let timers = registry.clone();
        orchestrator.register_with_kind(
            "timers",
            TIMER_CLEANUP_PRIORITY,
            ResourceKind::Timer,
            move || {
                timers.cancel_all();
                async { Ok(()) }
            },
        );

        Self {
            registry,
            orchestrator,
            differ: StdMutex::new(SnapshotDiffer::new(source)),
        }
    }

    /// The registry collaborators can schedule tracked timers on directly.
    pub fn registry(&self) -> &TimerRegistry {
        &self.registry
    }

    /// The orchestrator collaborators register their cleanup entries with.
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Suite-start hook: install the interception scope, capture the
    /// baseline.
    pub fn setup(&self) {
        install_global(&self.registry);
        self.differ
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .capture_baseline();
        info!(event = "harness.setup_completed");
    }

    /// Suite-end hook: run cleanup, restore timer pass-through, return the
    /// report for the harness to act on (e.g. non-zero exit on leaks).
    pub async fn teardown(&self) -> Result<CleanupReport, OrchestratorError> {
        let result = self.orchestrator.cleanup().await;
        uninstall_global();
        info!(event = "harness.teardown_completed", ok = result.is_ok());
        result
    }

    /// Handles created since the baseline.
    pub fn detect_leaks(&self) -> Vec<HandleDescriptor> {
        self.differ
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .detect_leaks()
    }

    /// Early warning, ahead of the final report: would the current leak set
    /// keep the test process alive?
    pub fn would_hang_test_runner(&self) -> bool {
        self.differ
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .would_hang_test_runner()
    }
}
