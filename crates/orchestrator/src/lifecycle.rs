//! One-shot disposal flag shared by everything the orchestrator spawns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Irreversible teardown marker.
///
/// Cloned into timers, retry loops, and fetch completions; once set, all
/// of them become no-ops. In-flight network calls are not force-aborted —
/// their completions check the guard and discard themselves.
#[derive(Debug, Clone, Default)]
pub struct LifecycleGuard {
    disposed: Arc<AtomicBool>,
}

impl LifecycleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark disposed. Returns true only for the first caller.
    pub fn dispose(&self) -> bool {
        !self.disposed.swap(true, Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}
