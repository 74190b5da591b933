//! Process-global timer interception scope.
//!
//! Legacy call sites that cannot take a [`TimerRegistry`] by parameter call
//! the free functions in this module instead. While a registry is installed,
//! those functions route through it and the timers are tracked; otherwise
//! they fall through to a plain untracked spawn, which is the original
//! pass-through behavior.
//!
//! Only the harness's setup/teardown hooks install and uninstall the scope.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::timers::registry::TimerRegistry;
use crate::timers::types::TimerId;

static INSTALLED: Mutex<Option<TimerRegistry>> = Mutex::new(None);

/// Serializes tests that touch the process-global slot; parallel test
/// threads would otherwise race on installs.
#[cfg(test)]
pub(crate) static TEST_SLOT_LOCK: Mutex<()> = Mutex::new(());

/// Install `registry` as the interception target.
///
/// Idempotent: installing while a registry is already installed keeps the
/// existing one (installing twice has the effect of once).
pub fn install_global(registry: &TimerRegistry) {
    let mut slot = INSTALLED.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        warn!(event = "timers.global.already_installed");
        return;
    }
    *slot = Some(registry.clone());
    debug!(event = "timers.global.installed");
}

/// Restore pass-through behavior. Safe to call when nothing is installed.
pub fn uninstall_global() {
    let mut slot = INSTALLED.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.take().is_some() {
        debug!(event = "timers.global.uninstalled");
    }
}

fn installed() -> Option<TimerRegistry> {
    INSTALLED
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Schedule a one-shot callback through the installed registry, if any.
///
/// Returns the tracked id, or `None` when no registry is installed and the
/// timer ran untracked.
pub fn schedule_one_shot<F>(callback: F, delay: Duration) -> Option<TimerId>
where
    F: FnOnce() + Send + 'static,
{
    match installed() {
        Some(registry) => Some(registry.schedule_one_shot(callback, delay)),
        None => {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                callback();
            });
            None
        }
    }
}

/// Schedule a repeating callback through the installed registry, if any.
pub fn schedule_repeating<F>(callback: F, delay: Duration) -> Option<TimerId>
where
    F: FnMut() + Send + 'static,
{
    match installed() {
        Some(registry) => Some(registry.schedule_repeating(callback, delay)),
        None => {
            let mut callback = callback;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(delay);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    callback();
                }
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test for the whole install/uninstall lifecycle: the slot is
    // process-global, so spreading assertions across parallel test fns
    // would race.
    #[tokio::test(start_paused = true)]
    async fn test_install_route_uninstall_lifecycle() {
        let _slot = TEST_SLOT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

        let registry = TimerRegistry::new();
        install_global(&registry);

        let id = schedule_one_shot(|| {}, Duration::from_secs(60));
        assert!(id.is_some());
        assert_eq!(registry.stats().total, 1);

        // Second install keeps the first registry
        let other = TimerRegistry::new();
        install_global(&other);
        schedule_one_shot(|| {}, Duration::from_secs(60));
        assert_eq!(registry.stats().total, 2);
        assert_eq!(other.stats().total, 0);

        uninstall_global();
        assert!(schedule_one_shot(|| {}, Duration::from_secs(60)).is_none());
        assert_eq!(registry.stats().total, 2);

        // Uninstall when nothing is installed is a no-op
        uninstall_global();

        registry.cancel_all();
    }
}
