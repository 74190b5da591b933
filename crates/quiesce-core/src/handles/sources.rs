//! Handle enumeration capability.
//!
//! Snapshot capture is platform-specific; everything above it talks to the
//! [`HandleSource`] trait so the differ and the orchestrator stay
//! platform-agnostic. Sources only read process state, never mutate it.

use crate::handles::types::{HandleDescriptor, HandleKind};
use crate::timers::TimerRegistry;

/// Enumerates the process's outstanding handles of one class.
pub trait HandleSource: Send + Sync {
    fn enumerate(&self) -> Vec<HandleDescriptor>;
}

impl HandleSource for TimerRegistry {
    fn enumerate(&self) -> Vec<HandleDescriptor> {
        self.details()
            .into_iter()
            .map(|info| HandleDescriptor {
                id: format!("timer:{}", info.id),
                kind: HandleKind::Timer,
                creation_stack: info.creation_stack,
            })
            .collect()
    }
}

/// Concatenation of several sources into one snapshot view.
pub struct CompositeSource {
    sources: Vec<Box<dyn HandleSource>>,
}

impl CompositeSource {
    pub fn new(sources: Vec<Box<dyn HandleSource>>) -> Self {
        Self { sources }
    }
}

impl HandleSource for CompositeSource {
    fn enumerate(&self) -> Vec<HandleDescriptor> {
        self.sources
            .iter()
            .flat_map(|source| source.enumerate())
            .collect()
    }
}

/// File-descriptor scanner backed by `/proc/self/fd`.
///
/// Classifies sockets and timerfds as handle kinds that keep a process
/// alive; everything else degrades to `File`/`Other`. Scan failures yield
/// an empty list rather than an error, matching the read-only, best-effort
/// role of snapshots.
#[cfg(target_os = "linux")]
pub struct ProcFdSource;

#[cfg(target_os = "linux")]
impl HandleSource for ProcFdSource {
    fn enumerate(&self) -> Vec<HandleDescriptor> {
        let Ok(entries) = std::fs::read_dir("/proc/self/fd") else {
            return Vec::new();
        };
        let mut handles = Vec::new();
        for entry in entries.flatten() {
            let Ok(target) = std::fs::read_link(entry.path()) else {
                // fd closed between readdir and readlink
                continue;
            };
            let target = target.to_string_lossy();
            let kind = if target.starts_with("socket:") {
                HandleKind::Socket
            } else if target.contains("[timerfd]") {
                HandleKind::Timer
            } else if target.starts_with("anon_inode:") || target.starts_with("pipe:") {
                HandleKind::Other
            } else {
                HandleKind::File
            };
            handles.push(HandleDescriptor {
                id: format!("fd:{}:{}", entry.file_name().to_string_lossy(), target),
                kind,
                creation_stack: None,
            });
        }
        handles
    }
}

/// Default platform source: fd scanning where available, empty elsewhere.
pub fn platform_source() -> Box<dyn HandleSource> {
    #[cfg(target_os = "linux")]
    {
        Box::new(ProcFdSource)
    }
    #[cfg(not(target_os = "linux"))]
    {
        struct NullSource;
        impl HandleSource for NullSource {
            fn enumerate(&self) -> Vec<HandleDescriptor> {
                Vec::new()
            }
        }
        Box::new(NullSource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_timer_registry_enumerates_as_timer_handles() {
        let registry = TimerRegistry::new();
        let id = registry.schedule_one_shot(|| {}, Duration::from_secs(60));

        let handles = registry.enumerate();
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].kind, HandleKind::Timer);
        assert_eq!(handles[0].id, format!("timer:{}", id));

        registry.cancel_all();
        assert!(registry.enumerate().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_composite_source_concatenates() {
        let a = TimerRegistry::new();
        let b = TimerRegistry::new();
        a.schedule_one_shot(|| {}, Duration::from_secs(60));
        b.schedule_one_shot(|| {}, Duration::from_secs(60));
        b.schedule_repeating(|| {}, Duration::from_secs(60));

        let composite =
            CompositeSource::new(vec![Box::new(a.clone()), Box::new(b.clone())]);
        assert_eq!(composite.enumerate().len(), 3);

        a.cancel_all();
        b.cancel_all();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_proc_fd_source_sees_open_sockets() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let handles = ProcFdSource.enumerate();
        assert!(
            handles.iter().any(|h| h.kind == HandleKind::Socket),
            "expected at least the bound listener socket"
        );
        drop(listener);
    }
}
