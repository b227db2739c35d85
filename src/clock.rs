//! Monotonic time, abstracted behind a trait.
//!
//! The original implementation reads `std::chrono::system_clock`, which can
//! jump backwards under an NTP step and would let a slow-path reader
//! re-enable bias earlier than the slowdown guard intends. We build on
//! `std::time::Instant` instead, a true monotonic source, since nothing here
//! needs bit-for-bit parity with that behavior. The `Clock` trait exists so
//! tests can swap in a virtual clock and assert the inhibit-window property
//! without sleeping in real time.

use std::ops::{Add, Sub};
use std::time::Duration;

/// A monotonic point in time, opaque beyond ordering and duration arithmetic.
///
/// Represented as nanoseconds since a clock-specific epoch (usually "when the
/// clock was constructed"). Two `Instant`s are only comparable if they came
/// from the same `Clock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant(u64);

impl Instant {
    /// The epoch of whichever clock produced it.
    pub const ZERO: Instant = Instant(0);

    /// Builds an `Instant` directly from a nanosecond count.
    ///
    /// Mainly useful for test clocks; production code should obtain
    /// `Instant`s from `Clock::now`.
    pub const fn from_nanos(nanos: u64) -> Self {
        Instant(nanos)
    }

    /// The raw nanosecond count since the originating clock's epoch.
    pub const fn as_nanos(self) -> u64 {
        self.0
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        Instant(self.0.saturating_add(rhs.as_nanos() as u64))
    }
}

impl Sub for Instant {
    type Output = Duration;

    /// Saturates at zero rather than panicking if `rhs` is later than `self`;
    /// callers that care about monotonicity should not observe this on a
    /// genuinely monotonic clock, but a misbehaving test clock should not
    /// bring down the writer's revocation path.
    fn sub(self, rhs: Instant) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(rhs.0))
    }
}

/// Source of monotonic time for a [`crate::BravoMutex`].
///
/// Implementations must be safe to call concurrently from any thread; they
/// back both the writer's revocation timing and the reader's inhibit-window
/// check.
pub trait Clock: Send + Sync {
    /// Returns the current instant. Must be non-decreasing across calls from
    /// any thread (true monotonicity, not just per-thread monotonicity).
    fn now(&self) -> Instant;
}

/// The default `Clock`: wraps `std::time::Instant`, which is monotonic on
/// every platform the standard library supports.
#[derive(Debug)]
pub struct SystemClock {
    epoch: std::time::Instant,
}

impl SystemClock {
    /// Creates a clock anchored at the current moment.
    pub fn new() -> Self {
        SystemClock { epoch: std::time::Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant(self.epoch.elapsed().as_nanos() as u64)
    }
}
