use std::error::Error;

#[derive(Debug)]
pub enum ConfigError {
    InvalidStrategy {
        key: String,
        value: String,
        recognized: String,
    },
    InvalidInteger {
        key: String,
        value: String,
    },
    InvalidBool {
        key: String,
        value: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidStrategy {
                key,
                value,
                recognized,
            } => {
                write!(
                    f,
                    "Invalid strategy '{}' for {}. Recognized values: {}",
                    value, key, recognized
                )
            }
            ConfigError::InvalidInteger { key, value } => {
                write!(f, "Invalid integer '{}' for {}", value, key)
            }
            ConfigError::InvalidBool { key, value } => {
                write!(
                    f,
                    "Invalid boolean '{}' for {} (expected 'true' or 'false')",
                    value, key
                )
            }
        }
    }
}

impl Error for ConfigError {}
