//! Teardown configuration: defaults plus environment-variable overrides.
//!
//! Every field of [`CleanupConfig`] can be overridden with a `QUIESCE_*`
//! environment variable. Overrides are read once, at construction time;
//! later changes to the environment have no effect on an existing config.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ConfigError;

/// How a class of resources participates in the two shutdown phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TeardownStrategy {
    /// Graceful attempt only; never forced. Still-outstanding resources
    /// become warnings in the report.
    GracefulOnly,
    /// Skip the graceful phase; torn down in the forced phase.
    ForcedOnly,
    /// Graceful attempt first, forced fallback for anything left.
    Hybrid,
}

impl TeardownStrategy {
    pub const RECOGNIZED: &'static str = "graceful-only, forced-only, hybrid";

    pub fn as_str(&self) -> &'static str {
        match self {
            TeardownStrategy::GracefulOnly => "graceful-only",
            TeardownStrategy::ForcedOnly => "forced-only",
            TeardownStrategy::Hybrid => "hybrid",
        }
    }
}

impl FromStr for TeardownStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "graceful-only" => Ok(TeardownStrategy::GracefulOnly),
            "forced-only" => Ok(TeardownStrategy::ForcedOnly),
            "hybrid" => Ok(TeardownStrategy::Hybrid),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for TeardownStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for one cleanup run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Budget for the whole graceful phase (shared across callbacks).
    pub graceful_timeout_ms: u64,
    /// Budget for the whole forced phase.
    pub force_timeout_ms: u64,
    /// Retry attempts for resources not confirmed cleaned gracefully.
    pub max_retries: u32,
    /// Pause between retry attempts.
    pub retry_delay_ms: u64,
    /// Default log level for the harness-side subscriber.
    pub log_level: String,
    /// Capture before/after handle snapshots and report leaks.
    pub detect_handles: bool,
    /// Phase participation for database-class resources.
    pub database_strategy: TeardownStrategy,
    /// Phase participation for server-class resources.
    pub server_strategy: TeardownStrategy,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            graceful_timeout_ms: 5000,
            force_timeout_ms: 2000,
            max_retries: 2,
            retry_delay_ms: 100,
            log_level: "info".to_string(),
            detect_handles: true,
            database_strategy: TeardownStrategy::Hybrid,
            server_strategy: TeardownStrategy::Hybrid,
        }
    }
}

impl CleanupConfig {
    /// Defaults overlaid with any `QUIESCE_*` environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = read_env("QUIESCE_GRACEFUL_TIMEOUT_MS") {
            config.graceful_timeout_ms = parse_u64("QUIESCE_GRACEFUL_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = read_env("QUIESCE_FORCE_TIMEOUT_MS") {
            config.force_timeout_ms = parse_u64("QUIESCE_FORCE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = read_env("QUIESCE_MAX_RETRIES") {
            config.max_retries = parse_u32("QUIESCE_MAX_RETRIES", &v)?;
        }
        if let Some(v) = read_env("QUIESCE_RETRY_DELAY_MS") {
            config.retry_delay_ms = parse_u64("QUIESCE_RETRY_DELAY_MS", &v)?;
        }
        if let Some(v) = read_env("QUIESCE_LOG_LEVEL") {
            config.log_level = v;
        }
        if let Some(v) = read_env("QUIESCE_DETECT_HANDLES") {
            config.detect_handles = parse_bool("QUIESCE_DETECT_HANDLES", &v)?;
        }
        if let Some(v) = read_env("QUIESCE_DATABASE_STRATEGY") {
            config.database_strategy = parse_strategy("QUIESCE_DATABASE_STRATEGY", &v)?;
        }
        if let Some(v) = read_env("QUIESCE_SERVER_STRATEGY") {
            config.server_strategy = parse_strategy("QUIESCE_SERVER_STRATEGY", &v)?;
        }

        debug!(
            event = "config.loaded",
            graceful_timeout_ms = config.graceful_timeout_ms,
            force_timeout_ms = config.force_timeout_ms,
            max_retries = config.max_retries,
            detect_handles = config.detect_handles,
            database_strategy = %config.database_strategy,
            server_strategy = %config.server_strategy,
        );

        Ok(config)
    }
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidInteger {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidInteger {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_strategy(key: &str, value: &str) -> Result<TeardownStrategy, ConfigError> {
    TeardownStrategy::from_str(value).map_err(|_| ConfigError::InvalidStrategy {
        key: key.to_string(),
        value: value.to_string(),
        recognized: TeardownStrategy::RECOGNIZED.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CleanupConfig::default();
        assert_eq!(config.graceful_timeout_ms, 5000);
        assert_eq!(config.force_timeout_ms, 2000);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retry_delay_ms, 100);
        assert!(config.detect_handles);
        assert_eq!(config.database_strategy, TeardownStrategy::Hybrid);
        assert_eq!(config.server_strategy, TeardownStrategy::Hybrid);
    }

    #[test]
    fn test_from_env_overrides() {
        temp_env::with_vars(
            [
                ("QUIESCE_GRACEFUL_TIMEOUT_MS", Some("500")),
                ("QUIESCE_FORCE_TIMEOUT_MS", Some("250")),
                ("QUIESCE_MAX_RETRIES", Some("0")),
                ("QUIESCE_DETECT_HANDLES", Some("false")),
                ("QUIESCE_SERVER_STRATEGY", Some("forced-only")),
            ],
            || {
                let config = CleanupConfig::from_env().unwrap();
                assert_eq!(config.graceful_timeout_ms, 500);
                assert_eq!(config.force_timeout_ms, 250);
                assert_eq!(config.max_retries, 0);
                assert!(!config.detect_handles);
                assert_eq!(config.server_strategy, TeardownStrategy::ForcedOnly);
                // Untouched fields keep defaults
                assert_eq!(config.retry_delay_ms, 100);
                assert_eq!(config.database_strategy, TeardownStrategy::Hybrid);
            },
        );
    }

    #[test]
    fn test_from_env_empty_value_falls_back_to_default() {
        temp_env::with_var("QUIESCE_GRACEFUL_TIMEOUT_MS", Some(""), || {
            let config = CleanupConfig::from_env().unwrap();
            assert_eq!(config.graceful_timeout_ms, 5000);
        });
    }

    #[test]
    fn test_from_env_invalid_integer() {
        temp_env::with_var("QUIESCE_FORCE_TIMEOUT_MS", Some("soon"), || {
            let err = CleanupConfig::from_env().unwrap_err();
            let msg = err.to_string();
            assert!(msg.contains("QUIESCE_FORCE_TIMEOUT_MS"));
            assert!(msg.contains("soon"));
        });
    }

    #[test]
    fn test_from_env_max_retries_out_of_range() {
        // u32::MAX + 1 must be rejected, not wrapped or truncated
        temp_env::with_var("QUIESCE_MAX_RETRIES", Some("4294967296"), || {
            let err = CleanupConfig::from_env().unwrap_err();
            let msg = err.to_string();
            assert!(msg.contains("QUIESCE_MAX_RETRIES"));
            assert!(msg.contains("4294967296"));
        });
    }

    #[test]
    fn test_from_env_invalid_strategy_lists_recognized_values() {
        temp_env::with_var("QUIESCE_DATABASE_STRATEGY", Some("eventual"), || {
            let err = CleanupConfig::from_env().unwrap_err();
            let msg = err.to_string();
            assert!(msg.contains("graceful-only"));
            assert!(msg.contains("forced-only"));
            assert!(msg.contains("hybrid"));
        });
    }

    #[test]
    fn test_strategy_round_trip() {
        for s in [
            TeardownStrategy::GracefulOnly,
            TeardownStrategy::ForcedOnly,
            TeardownStrategy::Hybrid,
        ] {
            assert_eq!(TeardownStrategy::from_str(s.as_str()), Ok(s));
        }
        assert!(TeardownStrategy::from_str("Hybrid").is_err());
    }

    #[test]
    fn test_config_serializes() {
        let config = CleanupConfig::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["database_strategy"], "hybrid");
        assert_eq!(json["graceful_timeout_ms"], 5000);
    }
}
