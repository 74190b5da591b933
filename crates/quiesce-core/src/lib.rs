//! quiesce-core: test-process resource lifecycle management.
//!
//! Tracks the long-lived handles a test run creates (timers, connections,
//! listeners), diffs process handle state against a run-start baseline, and
//! drives a bounded, prioritized two-phase teardown so the host process can
//! exit cleanly instead of hanging.

pub mod errors;
pub mod handles;
pub mod harness;
pub mod logging;
pub mod orchestrator;
pub mod timers;

pub use errors::QuiesceError;
pub use handles::{HandleDescriptor, HandleKind, HandleSnapshot, SnapshotDiffer};
pub use harness::TestHarness;
pub use orchestrator::{CleanupReport, Orchestrator, OrchestratorError, ResourceKind};
pub use quiesce_config::{CleanupConfig, TeardownStrategy};
pub use timers::{TimerRegistry, TimerStats};
