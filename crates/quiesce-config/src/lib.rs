pub mod errors;
pub mod settings;

pub use errors::ConfigError;
pub use settings::{CleanupConfig, TeardownStrategy};
