pub mod global;
pub mod registry;
pub mod types;

// Public API exports
pub use global::{install_global, schedule_one_shot, schedule_repeating, uninstall_global};
pub use registry::TimerRegistry;
pub use types::{TimerId, TimerInfo, TimerKind, TimerStats};
