//! A virtual clock for deterministically exercising the inhibit-window
//! behavior without sleeping in real time.
//!
//! Kept in the published crate, rather than behind `#[cfg(test)]`. Integration
//! tests under `tests/` only see this crate's public API, so they need it
//! there too, and downstream crates building on [`crate::BravoMutex`] get the
//! same tool available for their own tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::clock::{Clock, Instant};

/// A `Clock` whose `now()` is whatever was last set with [`set`](Self::set)
/// or [`advance`](Self::advance), controlled explicitly instead of tracking
/// wall-clock time.
///
/// Cheap to clone: clones share the same underlying counter, so a test can
/// hand one clone to a `BravoMutex` and keep another to drive time forward
/// from outside while the mutex is in use.
#[derive(Debug, Default, Clone)]
pub struct VirtualClock {
    nanos: Arc<AtomicU64>,
}

impl VirtualClock {
    /// Creates a clock starting at [`Instant::ZERO`].
    pub fn new() -> Self {
        VirtualClock { nanos: Arc::new(AtomicU64::new(0)) }
    }

    /// Sets the clock to an absolute instant.
    pub fn set(&self, instant: Instant) {
        self.nanos.store(instant.as_nanos(), Ordering::SeqCst);
    }

    /// Advances the clock by `duration`.
    pub fn advance(&self, duration: std::time::Duration) {
        self.nanos.fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Instant {
        Instant::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}
