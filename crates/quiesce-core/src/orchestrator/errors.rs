use crate::errors::QuiesceError;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Cleanup run already in flight; concurrent runs on one orchestrator are not allowed")]
    CleanupInFlight,
}

impl QuiesceError for OrchestratorError {
    fn error_code(&self) -> &'static str {
        match self {
            OrchestratorError::CleanupInFlight => "CLEANUP_IN_FLIGHT",
        }
    }

    fn is_user_error(&self) -> bool {
        // Concurrent invocation is a harness bug, not an environment fault.
        true
    }
}
