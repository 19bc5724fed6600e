//! Per-resource debounce timers.
//!
//! Re-arming a key aborts the pending timer for that key, so a burst of
//! viewport mutations collapses into one coordinator invocation after the
//! quiet period. Timers are hard-cancelable; fired tasks re-check the
//! lifecycle guard before running their action.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::lifecycle::LifecycleGuard;

/// Logical resources. Status, grid, and stations have debounce windows;
/// assessment appears only in loading/error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    Status,
    Grid,
    Stations,
    Assessment,
}

impl ResourceKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKey::Status => "status",
            ResourceKey::Grid => "grid",
            ResourceKey::Stations => "stations",
            ResourceKey::Assessment => "assessment",
        }
    }
}

#[derive(Debug)]
pub struct DebounceScheduler {
    guard: LifecycleGuard,
    timers: Mutex<HashMap<ResourceKey, JoinHandle<()>>>,
}

impl DebounceScheduler {
    pub fn new(guard: LifecycleGuard) -> Self {
        Self {
            guard,
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Arm (or re-arm) the timer for `key`. The previously scheduled,
    /// not-yet-fired action for the same key is canceled.
    pub fn schedule<F>(&self, key: ResourceKey, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.guard.is_disposed() {
            return;
        }

        let guard = self.guard.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if guard.is_disposed() {
                return;
            }
            action.await;
        });

        let mut timers = self.timers.lock().expect("debounce timer map poisoned");
        if let Some(previous) = timers.insert(key, handle) {
            previous.abort();
        }
    }

    /// Cancel every pending timer. Called exactly once, on disposal.
    pub fn cancel_all(&self) {
        let mut timers = self.timers.lock().expect("debounce timer map poisoned");
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }
}
