//! Single-flight, latest-wins fetch coordination.
//!
//! One `FetchCoordinator` per logical resource (status, grid, stations).
//! Two ways in:
//!
//! * `begin()` — same-parameters refresh (pull-to-refresh, periodic
//!   timer). Rejected while a flight is already up, so bursts collapse to
//!   one network call.
//! * `supersede()` — the request parameters changed (viewport, product,
//!   time selection). Always starts a fresh flight and advances the
//!   sequence, so the in-flight older answer is discarded at completion
//!   instead of overwriting the newer one.
//!
//! A ticket carries the sequence captured at entry; at completion the
//! caller asks it whether it is still current. The in-flight count is
//! released by the ticket's `Drop`, so every exit path — success, error,
//! panic, abort — clears it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Shared {
    seq: AtomicU64,
    in_flight: AtomicU64,
}

/// Per-resource coordinator enforcing single-flight and latest-wins.
#[derive(Debug, Clone, Default)]
pub struct FetchCoordinator {
    shared: Arc<Shared>,
}

impl FetchCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a same-parameters flight. `None` when one is already up.
    pub fn begin(&self) -> Option<FlightTicket> {
        loop {
            let count = self.shared.in_flight.load(Ordering::SeqCst);
            if count > 0 {
                return None;
            }
            if self
                .shared
                .in_flight
                .compare_exchange(count, count + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Some(self.ticket());
            }
        }
    }

    /// Start a flight for changed parameters, staling any in-flight one.
    pub fn supersede(&self) -> FlightTicket {
        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        self.ticket()
    }

    /// Advance the sequence without starting a flight — any in-flight
    /// completion becomes stale. Used when a state transition makes the
    /// pending answer meaningless (product switch, mode change).
    pub fn invalidate(&self) {
        self.shared.seq.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_busy(&self) -> bool {
        self.shared.in_flight.load(Ordering::SeqCst) > 0
    }

    fn ticket(&self) -> FlightTicket {
        let seq = self.shared.seq.fetch_add(1, Ordering::SeqCst) + 1;
        FlightTicket {
            shared: self.shared.clone(),
            seq,
        }
    }
}

/// Proof of an in-flight fetch. Dropping it releases the flight slot.
#[derive(Debug)]
pub struct FlightTicket {
    shared: Arc<Shared>,
    seq: u64,
}

impl FlightTicket {
    /// Whether this flight's result is still the freshest one requested.
    pub fn is_current(&self) -> bool {
        self.shared.seq.load(Ordering::SeqCst) == self.seq
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl Drop for FlightTicket {
    fn drop(&mut self) {
        self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_rejects_reentry_while_busy() {
        let coord = FetchCoordinator::new();
        let ticket = coord.begin().expect("first call starts a flight");
        assert!(coord.begin().is_none(), "second call must be a no-op");
        drop(ticket);
        assert!(coord.begin().is_some(), "slot clears on drop");
    }

    #[test]
    fn supersede_stales_the_older_flight() {
        let coord = FetchCoordinator::new();
        let old = coord.begin().unwrap();
        assert!(old.is_current());

        let newer = coord.supersede();
        assert!(!old.is_current(), "older flight must not apply");
        assert!(newer.is_current());
        assert!(coord.is_busy());

        drop(newer);
        // Old flight completing late still must not apply.
        assert!(!old.is_current());
    }

    #[test]
    fn invalidate_without_new_flight() {
        let coord = FetchCoordinator::new();
        let ticket = coord.begin().unwrap();
        coord.invalidate();
        assert!(!ticket.is_current());
    }

    #[test]
    fn sequence_only_increases() {
        let coord = FetchCoordinator::new();
        let a = coord.begin().unwrap().seq();
        let b = coord.supersede().seq();
        assert!(b > a);
    }
}
