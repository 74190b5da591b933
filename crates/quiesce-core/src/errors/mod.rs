use std::error::Error;

// Re-export ConfigError from quiesce-config so callers need only one crate.
pub use quiesce_config::ConfigError;

/// Base trait for all application errors
pub trait QuiesceError: Error + Send + Sync + 'static {
    /// Error code for programmatic handling
    fn error_code(&self) -> &'static str;

    /// Whether this error should be logged as an error or warning
    fn is_user_error(&self) -> bool {
        false
    }
}

impl QuiesceError for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            ConfigError::InvalidStrategy { .. } => "CONFIG_INVALID_STRATEGY",
            ConfigError::InvalidInteger { .. } => "CONFIG_INVALID_INTEGER",
            ConfigError::InvalidBool { .. } => "CONFIG_INVALID_BOOL",
        }
    }

    fn is_user_error(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_codes() {
        let error = ConfigError::InvalidInteger {
            key: "QUIESCE_MAX_RETRIES".to_string(),
            value: "many".to_string(),
        };
        assert_eq!(error.error_code(), "CONFIG_INVALID_INTEGER");
        assert!(error.is_user_error());
    }
}
