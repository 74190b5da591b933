pub mod errors;
pub mod runner;
pub mod types;

// Public API exports
pub use errors::OrchestratorError;
pub use runner::Orchestrator;
pub use types::{
    CleanupFailure, CleanupFn, CleanupFuture, CleanupReport, CleanupResult, LeakSummary,
    ResourceCounts, ResourceKind,
};
